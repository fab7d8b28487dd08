//! Marketplace (tenant) model

use serde::{Deserialize, Serialize};
use std::fmt;

/// A storefront tenant. Every catalog row, blog post and visitor record is
/// scoped to exactly one marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marketplace {
    pub id: i64,
    /// URL-friendly identifier, used for the default-tenant fallback
    pub slug: String,
    pub name: String,
    /// Host name requests are matched against
    pub domain: String,
    /// Address receiving contact form copies and abuse alerts
    pub contact_email: String,
    /// Theme directory holding this marketplace's templates
    pub template_prefix: String,
}

impl Marketplace {
    /// Fully qualified template name inside this marketplace's theme
    pub fn template(&self, name: &str) -> String {
        format!("{}/{}", self.template_prefix, name)
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
