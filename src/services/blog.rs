//! Marketplace blog

use super::forms::PostCommentForm;
use super::pagination::{paginate, Page, PagePolicy};
use crate::db::repositories::BlogRepository;
use crate::models::{ArchiveEntry, BlogPost, Marketplace, PostComment, User};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const BLOG_PAGE_SIZE: i64 = 2;
pub const LATEST_POSTS_LIMIT: usize = 5;
pub const LATEST_COMMENTS_LIMIT: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct BlogIndex {
    pub posts: Page<BlogPost>,
    pub latest_posts: Vec<BlogPost>,
    pub latest_comments: Vec<PostComment>,
    pub picks: Vec<BlogPost>,
    pub archive: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub post: BlogPost,
    pub comments: Vec<PostComment>,
}

/// Outcome of a comment submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOutcome {
    Saved(i64),
    /// The comment failed validation and was discarded
    Dropped,
}

pub struct BlogService {
    blog: Arc<dyn BlogRepository>,
}

impl BlogService {
    pub fn new(blog: Arc<dyn BlogRepository>) -> Self {
        Self { blog }
    }

    /// Blog index page; out-of-range pages show the last page
    pub async fn index(&self, marketplace: &Marketplace, page: i64) -> Result<BlogIndex> {
        let total = self.blog.count_posts(marketplace.id).await?;
        let all_posts = self.blog.list_posts(marketplace.id, 0, total).await?;

        let posts = paginate(total, BLOG_PAGE_SIZE, page, PagePolicy::Clamp, |offset, limit| {
            self.blog.list_posts(marketplace.id, offset, limit)
        })
        .await??;

        let latest_comments = self
            .blog
            .latest_comments(marketplace.id, LATEST_COMMENTS_LIMIT)
            .await?;
        let picks = self.blog.picks(marketplace.id).await?;

        Ok(BlogIndex {
            posts,
            latest_posts: all_posts.iter().take(LATEST_POSTS_LIMIT).cloned().collect(),
            latest_comments,
            picks,
            archive: all_posts.iter().map(ArchiveEntry::from).collect(),
        })
    }

    /// Post page by slug; `None` when the marketplace has no such post
    pub async fn post(&self, marketplace: &Marketplace, slug: &str) -> Result<Option<PostView>> {
        let Some(post) = self.blog.get_by_slug(marketplace.id, slug).await? else {
            return Ok(None);
        };
        let comments = self.blog.comments_for_post(post.id).await?;
        Ok(Some(PostView { post, comments }))
    }

    /// Store a reader comment.
    ///
    /// The post is looked up before the comment is validated; an unknown
    /// post is an error, an invalid comment is dropped.
    pub async fn add_comment(
        &self,
        marketplace: &Marketplace,
        user: &User,
        form: &PostCommentForm,
        now: DateTime<Utc>,
    ) -> Result<CommentOutcome> {
        let post_id: i64 = form
            .post
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid post id {:?} in comment form", form.post))?;
        let post = self
            .blog
            .get_by_id(marketplace.id, post_id)
            .await?
            .ok_or_else(|| anyhow!("blog post {} not found in marketplace {}", post_id, marketplace.slug))?;

        let errors = form.validate();
        if !errors.is_empty() {
            tracing::debug!(post = post.id, user = user.id, ?errors, "Dropping invalid blog comment");
            return Ok(CommentOutcome::Dropped);
        }

        let id = self
            .blog
            .add_comment(post.id, user.id, form.comment.trim(), now)
            .await?;
        tracing::info!(post = post.id, user = user.id, "Blog comment added");
        Ok(CommentOutcome::Saved(id))
    }
}
