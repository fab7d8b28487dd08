//! Session repository
//!
//! Database operations for visitor sessions. Session data is stored as a
//! JSON document in a TEXT column.

use crate::db::{on_pool, DynDatabasePool};
use crate::models::{Session, SessionData};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Replace the session data and push back its expiry
    async fn save_data(&self, id: &str, data: &SessionData, expires_at: DateTime<Utc>) -> Result<()>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let data = serde_json::to_string(&session.data).context("Failed to encode session data")?;
        on_pool!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO sessions (id, user_id, data, expires_at, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(&data)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(conn)
            .await
            .context("Failed to create session")?;
        });

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row = on_pool!(self.pool, |conn| {
            let row = sqlx::query(
                r#"
                SELECT id, user_id, data, expires_at, created_at
                FROM sessions
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get session by ID")?;
            match row {
                Some(r) => Some((
                    r.try_get::<String, _>("id")?,
                    r.try_get::<Option<i64>, _>("user_id")?,
                    r.try_get::<String, _>("data")?,
                    r.try_get::<DateTime<Utc>, _>("expires_at")?,
                    r.try_get::<DateTime<Utc>, _>("created_at")?,
                )),
                None => None,
            }
        });

        let Some((id, user_id, data, expires_at, created_at)) = row else {
            return Ok(None);
        };

        // A corrupt payload only loses preferences, not the session
        let data = serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable data of session {}: {}", id, e);
            SessionData::default()
        });

        Ok(Some(Session {
            id,
            user_id,
            data,
            expires_at,
            created_at,
        }))
    }

    async fn save_data(&self, id: &str, data: &SessionData, expires_at: DateTime<Utc>) -> Result<()> {
        let data = serde_json::to_string(data).context("Failed to encode session data")?;
        on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE sessions SET data = ?, expires_at = ? WHERE id = ?")
                .bind(&data)
                .bind(expires_at)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to save session data")?;
        });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let now = Utc::now();
        on_pool!(self.pool, |conn| {
            let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to delete expired sessions")?;
            Ok(result.rows_affected() as i64)
        })
    }
}
