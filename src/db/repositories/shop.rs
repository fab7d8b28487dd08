//! Shop repository
//!
//! Shop lookups and the per-shop aggregates shown next to a product.

use crate::db::{on_pool, DynDatabasePool};
use crate::models::{MarketCategory, Shop};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ShopRepository: Send + Sync {
    async fn get(&self, marketplace_id: i64, shop_id: i64) -> Result<Option<Shop>>;

    /// Distinct categories of the shop's products
    async fn categories(&self, shop_id: i64) -> Result<Vec<MarketCategory>>;

    /// Number of completed sell transactions of the shop
    async fn total_transactions(&self, shop_id: i64) -> Result<i64>;

    /// Featured dealers of the marketplace in pick order
    async fn dealer_picks(&self, marketplace_id: i64, limit: i64) -> Result<Vec<Shop>>;
}

pub struct SqlxShopRepository {
    pool: DynDatabasePool,
}

impl SqlxShopRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ShopRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ShopRepository for SqlxShopRepository {
    async fn get(&self, marketplace_id: i64, shop_id: i64) -> Result<Option<Shop>> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(
                "SELECT id, marketplace_id, name FROM shops WHERE id = ? AND marketplace_id = ?",
            )
            .bind(shop_id)
            .bind(marketplace_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get shop")?;
            match row {
                Some(r) => Ok(Some(Shop {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    name: r.try_get("name")?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn categories(&self, shop_id: i64) -> Result<Vec<MarketCategory>> {
        on_pool!(self.pool, |conn| {
            let rows = sqlx::query(
                r#"
                SELECT c.id, c.marketplace_id, c.slug, c.name
                FROM market_categories c
                WHERE EXISTS (
                    SELECT 1 FROM products p
                    WHERE p.category_id = c.id AND p.shop_id = ?
                )
                ORDER BY c.name, c.id
                "#,
            )
            .bind(shop_id)
            .fetch_all(conn)
            .await
            .context("Failed to list shop categories")?;
            let mut categories = Vec::with_capacity(rows.len());
            for r in &rows {
                categories.push(MarketCategory {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    slug: r.try_get("slug")?,
                    name: r.try_get("name")?,
                });
            }
            Ok(categories)
        })
    }

    async fn total_transactions(&self, shop_id: i64) -> Result<i64> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query("SELECT COUNT(*) AS total FROM sell_transactions WHERE shop_id = ?")
                .bind(shop_id)
                .fetch_one(conn)
                .await
                .context("Failed to count shop transactions")?;
            Ok(row.try_get("total")?)
        })
    }

    async fn dealer_picks(&self, marketplace_id: i64, limit: i64) -> Result<Vec<Shop>> {
        on_pool!(self.pool, |conn| {
            let rows = sqlx::query(
                r#"
                SELECT s.id, s.marketplace_id, s.name
                FROM dealer_picks dp
                JOIN shops s ON s.id = dp.shop_id
                WHERE dp.marketplace_id = ?
                ORDER BY dp.sort_order, dp.id
                LIMIT ?
                "#,
            )
            .bind(marketplace_id)
            .bind(limit)
            .fetch_all(conn)
            .await
            .context("Failed to list dealer picks")?;
            let mut shops = Vec::with_capacity(rows.len());
            for r in &rows {
                shops.push(Shop {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    name: r.try_get("name")?,
                });
            }
            Ok(shops)
        })
    }
}
