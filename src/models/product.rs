//! Product model
//!
//! A product is either a fixed-price item or an auction lot. The database
//! keeps the specialization in separate `items` / `lots` tables; here it is
//! a single sum type so every consumer has to handle both kinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Catalog product listed by a shop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub shop_id: i64,
    pub category_id: i64,
    pub subcategory_id: Option<i64>,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub has_image: bool,
    /// Creation time, used for "recent" ordering
    pub date_time: DateTime<Utc>,
    pub kind: ProductKind,
}

impl Product {
    /// Current price in cents: the item price, or the lot's highest bid
    /// falling back to its starting bid
    pub fn price_cents(&self) -> i64 {
        match &self.kind {
            ProductKind::Item(item) => item.price_cents,
            ProductKind::Lot(lot) => lot.price_cents(),
        }
    }

    /// Whether the product can still be bought or bid on
    pub fn is_available(&self) -> bool {
        match &self.kind {
            ProductKind::Item(item) => item.qty >= 1,
            ProductKind::Lot(lot) => lot.state == LotState::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProductKind {
    Item(ItemDetails),
    Lot(LotDetails),
}

impl ProductKind {
    /// Build the kind from the optional specialization rows of one product.
    ///
    /// Exactly one of them must be present.
    pub fn from_parts(
        product_id: i64,
        item: Option<ItemDetails>,
        lot: Option<LotDetails>,
    ) -> Result<Self, ProductIntegrityError> {
        match (item, lot) {
            (Some(item), None) => Ok(ProductKind::Item(item)),
            (None, Some(lot)) => Ok(ProductKind::Lot(lot)),
            (Some(_), Some(_)) => Err(ProductIntegrityError::BothKinds(product_id)),
            (None, None) => Err(ProductIntegrityError::NoKind(product_id)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProductKind::Item(_) => "item",
            ProductKind::Lot(_) => "lot",
        }
    }
}

/// Fixed-price specialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub price_cents: i64,
    pub qty: i64,
}

/// Auction specialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotDetails {
    pub starting_bid_cents: i64,
    pub state: LotState,
    /// Highest bid placed so far
    pub high_bid_cents: Option<i64>,
}

impl LotDetails {
    pub fn price_cents(&self) -> i64 {
        self.high_bid_cents.unwrap_or(self.starting_bid_cents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotState {
    Active,
    Finished,
}

impl fmt::Display for LotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LotState::Active => write!(f, "active"),
            LotState::Finished => write!(f, "finished"),
        }
    }
}

impl FromStr for LotState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LotState::Active),
            "finished" => Ok(LotState::Finished),
            other => Err(format!("Invalid lot state: {}", other)),
        }
    }
}

/// Image attached to an item or a lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub id: i64,
    pub url: String,
    pub is_primary: bool,
}

/// Raised when a product row does not have exactly one specialization
#[derive(Debug, Error, PartialEq)]
pub enum ProductIntegrityError {
    #[error("product {0} is both an item and a lot")]
    BothKinds(i64),
    #[error("product {0} is neither an item nor a lot")]
    NoKind(i64),
}

/// Template-facing view of a product with the price already worked out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    pub id: i64,
    pub shop_id: i64,
    pub title: String,
    pub summary: String,
    pub has_image: bool,
    pub date_time: DateTime<Utc>,
    /// "item" or "lot"
    pub kind: String,
    pub price_cents: i64,
    /// Price formatted as dollars and cents, e.g. "12.50"
    pub price: String,
    pub available: bool,
}

impl From<&Product> for ProductCard {
    fn from(product: &Product) -> Self {
        let price_cents = product.price_cents();
        Self {
            id: product.id,
            shop_id: product.shop_id,
            title: product.title.clone(),
            summary: product.summary.clone(),
            has_image: product.has_image,
            date_time: product.date_time,
            kind: product.kind.name().to_string(),
            price_cents,
            price: format_price(price_cents),
            available: product.is_available(),
        }
    }
}

/// Format an amount in cents as "dollars.cents"
pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}
