//! Contact form abuse record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per (marketplace, email, requester IP) that failed the contact
/// form captcha. `email` is empty when the submission carried none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactFormInfo {
    pub id: i64,
    pub marketplace_id: i64,
    pub email: String,
    pub ip: String,
    pub datetime: DateTime<Utc>,
}
