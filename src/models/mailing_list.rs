//! Newsletter subscriber model

use serde::{Deserialize, Serialize};

/// Newsletter subscription, unique per (marketplace, email)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailingListMember {
    pub id: i64,
    pub marketplace_id: i64,
    pub email: String,
}
