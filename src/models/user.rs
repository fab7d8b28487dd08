//! User model
//!
//! Accounts are created and authenticated elsewhere; the storefront only
//! reads them to attribute blog comments and greet logged-in visitors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
}
