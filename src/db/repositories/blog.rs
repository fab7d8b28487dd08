//! Blog repository
//!
//! Posts, picks and reader comments of a marketplace blog.

use crate::db::{insert_returning_id, on_pool, DynDatabasePool};
use crate::models::{BlogPost, PostComment};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait BlogRepository: Send + Sync {
    async fn count_posts(&self, marketplace_id: i64) -> Result<i64>;

    /// Posts newest first
    async fn list_posts(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<BlogPost>>;

    async fn get_by_slug(&self, marketplace_id: i64, slug: &str) -> Result<Option<BlogPost>>;

    async fn get_by_id(&self, marketplace_id: i64, id: i64) -> Result<Option<BlogPost>>;

    /// Editor-picked posts in pick order
    async fn picks(&self, marketplace_id: i64) -> Result<Vec<BlogPost>>;

    /// Newest comments across all posts of the marketplace
    async fn latest_comments(&self, marketplace_id: i64, limit: i64) -> Result<Vec<PostComment>>;

    /// Comments of one post, oldest first
    async fn comments_for_post(&self, post_id: i64) -> Result<Vec<PostComment>>;

    /// Store a comment and return its id
    async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        comment: &str,
        commented_on: DateTime<Utc>,
    ) -> Result<i64>;
}

pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

const POST_COLUMNS: &str = "bp.id, bp.marketplace_id, bp.slug, bp.title, bp.body, bp.posted_on";

const COMMENT_SELECT: &str = r#"
    SELECT pc.id, pc.post_id, pc.user_id, u.username, bp.slug AS post_slug,
           bp.title AS post_title, pc.comment, pc.commented_on
    FROM post_comments pc
    JOIN blog_posts bp ON bp.id = pc.post_id
    JOIN users u ON u.id = pc.user_id
"#;

macro_rules! post_from_row {
    ($r:expr) => {
        BlogPost {
            id: $r.try_get("id")?,
            marketplace_id: $r.try_get("marketplace_id")?,
            slug: $r.try_get("slug")?,
            title: $r.try_get("title")?,
            body: $r.try_get("body")?,
            posted_on: $r.try_get("posted_on")?,
        }
    };
}

macro_rules! comment_from_row {
    ($r:expr) => {
        PostComment {
            id: $r.try_get("id")?,
            post_id: $r.try_get("post_id")?,
            user_id: $r.try_get("user_id")?,
            username: $r.try_get("username")?,
            post_slug: $r.try_get("post_slug")?,
            post_title: $r.try_get("post_title")?,
            comment: $r.try_get("comment")?,
            commented_on: $r.try_get("commented_on")?,
        }
    };
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }

    async fn select_posts(&self, sql: &str, args: &[i64]) -> Result<Vec<BlogPost>> {
        on_pool!(self.pool, |conn| {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = query.bind(*arg);
            }
            let rows = query.fetch_all(conn).await.context("Failed to list blog posts")?;
            let mut posts = Vec::with_capacity(rows.len());
            for r in &rows {
                posts.push(post_from_row!(r));
            }
            Ok(posts)
        })
    }

    async fn select_comments(&self, sql: &str, args: &[i64]) -> Result<Vec<PostComment>> {
        on_pool!(self.pool, |conn| {
            let mut query = sqlx::query(sql);
            for arg in args {
                query = query.bind(*arg);
            }
            let rows = query.fetch_all(conn).await.context("Failed to list post comments")?;
            let mut comments = Vec::with_capacity(rows.len());
            for r in &rows {
                comments.push(comment_from_row!(r));
            }
            Ok(comments)
        })
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn count_posts(&self, marketplace_id: i64) -> Result<i64> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query("SELECT COUNT(*) AS total FROM blog_posts WHERE marketplace_id = ?")
                .bind(marketplace_id)
                .fetch_one(conn)
                .await
                .context("Failed to count blog posts")?;
            Ok(row.try_get("total")?)
        })
    }

    async fn list_posts(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM blog_posts bp WHERE bp.marketplace_id = ? \
             ORDER BY bp.posted_on DESC, bp.id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        );
        self.select_posts(&sql, &[marketplace_id, limit, offset]).await
    }

    async fn get_by_slug(&self, marketplace_id: i64, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM blog_posts bp WHERE bp.marketplace_id = ? AND bp.slug = ?",
            POST_COLUMNS
        );
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(&sql)
                .bind(marketplace_id)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get blog post by slug")?;
            match row {
                Some(r) => Ok(Some(post_from_row!(r))),
                None => Ok(None),
            }
        })
    }

    async fn get_by_id(&self, marketplace_id: i64, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM blog_posts bp WHERE bp.marketplace_id = ? AND bp.id = ?",
            POST_COLUMNS
        );
        let posts = self.select_posts(&sql, &[marketplace_id, id]).await?;
        Ok(posts.into_iter().next())
    }

    async fn picks(&self, marketplace_id: i64) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "SELECT {} FROM post_picks pp JOIN blog_posts bp ON bp.id = pp.post_id \
             WHERE pp.marketplace_id = ? ORDER BY pp.sort_order, pp.id",
            POST_COLUMNS
        );
        self.select_posts(&sql, &[marketplace_id]).await
    }

    async fn latest_comments(&self, marketplace_id: i64, limit: i64) -> Result<Vec<PostComment>> {
        let sql = format!(
            "{} WHERE bp.marketplace_id = ? ORDER BY pc.commented_on DESC, pc.id DESC LIMIT ?",
            COMMENT_SELECT
        );
        self.select_comments(&sql, &[marketplace_id, limit]).await
    }

    async fn comments_for_post(&self, post_id: i64) -> Result<Vec<PostComment>> {
        let sql = format!(
            "{} WHERE pc.post_id = ? ORDER BY pc.commented_on ASC, pc.id ASC",
            COMMENT_SELECT
        );
        self.select_comments(&sql, &[post_id]).await
    }

    async fn add_comment(
        &self,
        post_id: i64,
        user_id: i64,
        comment: &str,
        commented_on: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(insert_returning_id!(
            self.pool,
            sqlx::query(
                "INSERT INTO post_comments (post_id, user_id, comment, commented_on) VALUES (?, ?, ?, ?)",
            )
            .bind(post_id)
            .bind(user_id)
            .bind(comment)
            .bind(commented_on)
        ))
    }
}
