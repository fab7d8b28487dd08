//! Marketplace blog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blog post, slug unique per marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: i64,
    pub marketplace_id: i64,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub posted_on: DateTime<Utc>,
}

/// Reader comment with the author's name and the post it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostComment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub post_slug: String,
    pub post_title: String,
    pub comment: String,
    pub commented_on: DateTime<Utc>,
}

/// Sidebar archive link: post title, slug and the month it was posted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub title: String,
    pub slug: String,
    pub month: String,
}

impl From<&BlogPost> for ArchiveEntry {
    fn from(post: &BlogPost) -> Self {
        Self {
            title: post.title.clone(),
            slug: post.slug.clone(),
            month: post.posted_on.format("%B").to_string(),
        }
    }
}
