//! Visitor sessions
//!
//! Sessions are created lazily: a visitor gets a row (and a cookie) only
//! once something is stored for them.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, SessionData, User};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        ttl_days: i64,
    ) -> Self {
        Self {
            sessions,
            users,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Live session for the cookie token, if any
    pub async fn load(&self, token: &str) -> Result<Option<Session>> {
        match self.sessions.get_by_id(token).await? {
            Some(session) if !session.is_expired() => Ok(Some(session)),
            Some(session) => {
                tracing::debug!("Session {} expired", session.id);
                self.sessions.delete(&session.id).await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Fresh anonymous session, not yet stored
    pub fn start(&self, now: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4().to_string(),
            user_id: None,
            data: SessionData::default(),
            expires_at: now + self.ttl,
            created_at: now,
        }
    }

    /// Store the session's data, creating the row for a new session
    pub async fn save(&self, session: &Session, is_new: bool, now: DateTime<Utc>) -> Result<()> {
        let expires_at = now + self.ttl;
        if is_new {
            let mut stored = session.clone();
            stored.expires_at = expires_at;
            self.sessions.create(&stored).await?;
        } else {
            self.sessions.save_data(&session.id, &session.data, expires_at).await?;
        }
        Ok(())
    }

    /// Signed-in user of the session
    pub async fn user(&self, session: &Session) -> Result<Option<User>> {
        match session.user_id {
            Some(user_id) => self.users.get_by_id(user_id).await,
            None => Ok(None),
        }
    }

    pub async fn cleanup_expired(&self) -> Result<i64> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::info!("Removed {} expired sessions", removed);
        }
        Ok(removed)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
