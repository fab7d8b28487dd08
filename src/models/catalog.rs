//! Catalog taxonomy and shop models

use serde::{Deserialize, Serialize};

/// Top-level category of a marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCategory {
    pub id: i64,
    pub marketplace_id: i64,
    pub slug: String,
    pub name: String,
}

/// Second-level category; always belongs to the same marketplace as its parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSubCategory {
    pub id: i64,
    pub marketplace_id: i64,
    pub parent_id: i64,
    pub slug: String,
    pub name: String,
}

/// A seller's storefront inside a marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub marketplace_id: i64,
    pub name: String,
}
