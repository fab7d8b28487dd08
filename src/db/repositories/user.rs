//! User repository
//!
//! Read access to accounts managed by the external authentication system.

use crate::db::{insert_returning_id, on_pool, DynDatabasePool};
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a user
    async fn create(&self, username: &str, email: &str) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, username: &str, email: &str) -> Result<User> {
        let id = insert_returning_id!(
            self.pool,
            sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
                .bind(username)
                .bind(email)
        );

        Ok(User {
            id,
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query("SELECT id, username, email FROM users WHERE id = ?")
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by ID")?;
            match row {
                Some(r) => Ok(Some(User {
                    id: r.try_get("id")?,
                    username: r.try_get("username")?,
                    email: r.try_get("email")?,
                })),
                None => Ok(None),
            }
        })
    }
}
