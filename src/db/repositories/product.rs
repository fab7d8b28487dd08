//! Product repository
//!
//! Products are read together with their item or lot specialization in a
//! single query; the row mapping turns the two optional halves into a
//! [`ProductKind`] and fails when a product has both or neither.

use crate::db::{on_pool, DynDatabasePool};
use crate::models::{Product, ProductImage, ProductKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Columns and joins shared by every product query. The caller appends the
/// WHERE clause; `s` is the owning shop, `i` / `l` the specializations.
pub(crate) const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.shop_id, p.category_id, p.subcategory_id, p.title, p.summary,
           p.description, p.has_image, p.date_time,
           i.price_cents AS item_price_cents, i.qty AS item_qty,
           l.starting_bid_cents AS lot_starting_bid_cents, l.state AS lot_state,
           (SELECT MAX(b.amount_cents) FROM lot_bids b WHERE b.lot_id = p.id) AS lot_high_bid_cents
    FROM products p
    JOIN shops s ON s.id = p.shop_id
    LEFT JOIN items i ON i.product_id = p.id
    LEFT JOIN lots l ON l.product_id = p.id
"#;

/// Map a row selected with [`PRODUCT_SELECT`] into a [`Product`].
/// Expands to an expression using `?`; the enclosing function must return
/// `anyhow::Result`.
macro_rules! product_from_row {
    ($row:expr) => {{
        let r = $row;
        let id: i64 = r.try_get("id")?;
        let item = match (
            r.try_get::<Option<i64>, _>("item_price_cents")?,
            r.try_get::<Option<i64>, _>("item_qty")?,
        ) {
            (Some(price_cents), Some(qty)) => Some($crate::models::ItemDetails { price_cents, qty }),
            _ => None,
        };
        let lot = match (
            r.try_get::<Option<i64>, _>("lot_starting_bid_cents")?,
            r.try_get::<Option<String>, _>("lot_state")?,
        ) {
            (Some(starting_bid_cents), Some(state)) => Some($crate::models::LotDetails {
                starting_bid_cents,
                state: state.parse().map_err(::anyhow::Error::msg)?,
                high_bid_cents: r.try_get::<Option<i64>, _>("lot_high_bid_cents")?,
            }),
            _ => None,
        };
        $crate::models::Product {
            id,
            shop_id: r.try_get("shop_id")?,
            category_id: r.try_get("category_id")?,
            subcategory_id: r.try_get("subcategory_id")?,
            title: r.try_get("title")?,
            summary: r.try_get("summary")?,
            description: r.try_get("description")?,
            has_image: r.try_get("has_image")?,
            date_time: r.try_get("date_time")?,
            kind: $crate::models::ProductKind::from_parts(id, item, lot)?,
        }
    }};
}

pub(crate) use product_from_row;

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Product `product_id` if its shop belongs to the marketplace
    async fn get_in_marketplace(&self, marketplace_id: i64, product_id: i64) -> Result<Option<Product>>;

    /// Images of the product's item or lot, primary image first
    async fn images(&self, product: &Product) -> Result<Vec<ProductImage>>;

    /// Most recently added products that have an image
    async fn recent_with_images(&self, marketplace_id: i64, limit: i64) -> Result<Vec<Product>>;

    /// Marketplace picks whose product is still on sale
    async fn available_picks(&self, marketplace_id: i64) -> Result<Vec<Product>>;

    async fn count_lots(&self, marketplace_id: i64) -> Result<i64>;

    async fn list_lots(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<Product>>;

    /// Number of items with at least one unit in stock
    async fn count_items_in_stock(&self, marketplace_id: i64) -> Result<i64>;

    async fn list_items_in_stock(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<Product>>;

    /// Every product of the marketplace, for the product sitemap
    async fn list_all(&self, marketplace_id: i64) -> Result<Vec<Product>>;
}

pub struct SqlxProductRepository {
    pool: DynDatabasePool,
}

impl SqlxProductRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProductRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run `PRODUCT_SELECT` with `tail` appended, binding `marketplace_id`
    /// followed by `extra` integer arguments
    async fn select_products(&self, tail: &str, marketplace_id: i64, extra: &[i64]) -> Result<Vec<Product>> {
        let sql = format!("{} {}", PRODUCT_SELECT, tail);
        on_pool!(self.pool, |conn| {
            let mut query = sqlx::query(&sql).bind(marketplace_id);
            for value in extra {
                query = query.bind(*value);
            }
            let rows = query.fetch_all(conn).await.context("Failed to list products")?;
            let mut products = Vec::with_capacity(rows.len());
            for row in &rows {
                products.push(product_from_row!(row));
            }
            Ok(products)
        })
    }

    async fn count(&self, sql: &str, marketplace_id: i64) -> Result<i64> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(sql)
                .bind(marketplace_id)
                .fetch_one(conn)
                .await
                .context("Failed to count products")?;
            Ok(row.try_get("total")?)
        })
    }
}

#[async_trait]
impl ProductRepository for SqlxProductRepository {
    async fn get_in_marketplace(&self, marketplace_id: i64, product_id: i64) -> Result<Option<Product>> {
        let products = self
            .select_products("WHERE s.marketplace_id = ? AND p.id = ?", marketplace_id, &[product_id])
            .await?;
        Ok(products.into_iter().next())
    }

    async fn images(&self, product: &Product) -> Result<Vec<ProductImage>> {
        let sql = match product.kind {
            ProductKind::Item(_) => {
                "SELECT id, url, is_primary FROM item_images WHERE item_id = ? ORDER BY is_primary DESC, id"
            }
            ProductKind::Lot(_) => {
                "SELECT id, url, is_primary FROM lot_images WHERE lot_id = ? ORDER BY is_primary DESC, id"
            }
        };
        on_pool!(self.pool, |conn| {
            let rows = sqlx::query(sql)
                .bind(product.id)
                .fetch_all(conn)
                .await
                .context("Failed to list product images")?;
            let mut images = Vec::with_capacity(rows.len());
            for r in &rows {
                images.push(ProductImage {
                    id: r.try_get("id")?,
                    url: r.try_get("url")?,
                    is_primary: r.try_get("is_primary")?,
                });
            }
            Ok(images)
        })
    }

    async fn recent_with_images(&self, marketplace_id: i64, limit: i64) -> Result<Vec<Product>> {
        self.select_products(
            "WHERE s.marketplace_id = ? AND p.has_image = TRUE ORDER BY p.date_time DESC, p.id DESC LIMIT ?",
            marketplace_id,
            &[limit],
        )
        .await
    }

    async fn available_picks(&self, marketplace_id: i64) -> Result<Vec<Product>> {
        // Availability depends on the specialization, so it is checked after mapping
        let picks = self
            .select_products(
                "JOIN marketplace_picks mp ON mp.product_id = p.id \
                 WHERE mp.marketplace_id = ? AND s.marketplace_id = mp.marketplace_id \
                 ORDER BY mp.sort_order, mp.id",
                marketplace_id,
                &[],
            )
            .await?;
        Ok(picks.into_iter().filter(Product::is_available).collect())
    }

    async fn count_lots(&self, marketplace_id: i64) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) AS total FROM lots l \
             JOIN products p ON p.id = l.product_id \
             JOIN shops s ON s.id = p.shop_id \
             WHERE s.marketplace_id = ?",
            marketplace_id,
        )
        .await
    }

    async fn list_lots(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<Product>> {
        self.select_products(
            "WHERE s.marketplace_id = ? AND l.product_id IS NOT NULL \
             ORDER BY p.date_time DESC, p.id DESC LIMIT ? OFFSET ?",
            marketplace_id,
            &[limit, offset],
        )
        .await
    }

    async fn count_items_in_stock(&self, marketplace_id: i64) -> Result<i64> {
        self.count(
            "SELECT COUNT(*) AS total FROM items i \
             JOIN products p ON p.id = i.product_id \
             JOIN shops s ON s.id = p.shop_id \
             WHERE s.marketplace_id = ? AND i.qty >= 1",
            marketplace_id,
        )
        .await
    }

    async fn list_items_in_stock(&self, marketplace_id: i64, offset: i64, limit: i64) -> Result<Vec<Product>> {
        self.select_products(
            "WHERE s.marketplace_id = ? AND i.product_id IS NOT NULL AND i.qty >= 1 \
             ORDER BY p.date_time DESC, p.id DESC LIMIT ? OFFSET ?",
            marketplace_id,
            &[limit, offset],
        )
        .await
    }

    async fn list_all(&self, marketplace_id: i64) -> Result<Vec<Product>> {
        self.select_products("WHERE s.marketplace_id = ? ORDER BY p.id", marketplace_id, &[])
            .await
    }
}
