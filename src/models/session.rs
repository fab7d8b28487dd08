//! Visitor session model
//!
//! Every visitor gets a session row identified by the `session` cookie.
//! Anonymous sessions carry only browsing preferences and the pending flash
//! message; `user_id` is set by the external login flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (token)
    pub id: String,
    pub user_id: Option<i64>,
    pub data: SessionData,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Values stored in the session's JSON column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Search ordering chosen through `/sort-mode`, stored verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_mode: Option<String>,
    /// Listing layout chosen through `/listing-mode`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_mode: Option<String>,
    /// One-shot message shown on the next rendered page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash: Option<Flash>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flash {
    pub message: String,
    pub severity: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: "success".to_string(),
        }
    }
}
