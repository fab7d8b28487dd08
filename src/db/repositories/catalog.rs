//! Catalog repository
//!
//! Category and subcategory lookups, always scoped to one marketplace.

use crate::db::{on_pool, DynDatabasePool};
use crate::models::{MarketCategory, MarketSubCategory, Shop};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn category_by_slug(&self, marketplace_id: i64, slug: &str) -> Result<Option<MarketCategory>>;

    async fn category_by_name(&self, marketplace_id: i64, name: &str) -> Result<Option<MarketCategory>>;

    /// Subcategory with `slug` under `parent_id`, inside the marketplace
    async fn subcategory_by_slug(
        &self,
        marketplace_id: i64,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<MarketSubCategory>>;

    /// Shops of the marketplace listing at least one product in the category
    async fn related_shops(&self, marketplace_id: i64, category_id: i64) -> Result<Vec<Shop>>;
}

pub struct SqlxCatalogRepository {
    pool: DynDatabasePool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CatalogRepository> {
        Arc::new(Self::new(pool))
    }

    async fn category_where(
        &self,
        marketplace_id: i64,
        column: &str,
        value: &str,
    ) -> Result<Option<MarketCategory>> {
        let sql = format!(
            "SELECT id, marketplace_id, slug, name FROM market_categories \
             WHERE marketplace_id = ? AND {} = ? ORDER BY id LIMIT 1",
            column
        );
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(&sql)
                .bind(marketplace_id)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get category by {}", column))?;
            match row {
                Some(r) => Ok(Some(MarketCategory {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    slug: r.try_get("slug")?,
                    name: r.try_get("name")?,
                })),
                None => Ok(None),
            }
        })
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn category_by_slug(&self, marketplace_id: i64, slug: &str) -> Result<Option<MarketCategory>> {
        self.category_where(marketplace_id, "slug", slug).await
    }

    async fn category_by_name(&self, marketplace_id: i64, name: &str) -> Result<Option<MarketCategory>> {
        self.category_where(marketplace_id, "name", name).await
    }

    async fn subcategory_by_slug(
        &self,
        marketplace_id: i64,
        parent_id: i64,
        slug: &str,
    ) -> Result<Option<MarketSubCategory>> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(
                r#"
                SELECT sc.id, sc.marketplace_id, sc.parent_id, sc.slug, sc.name
                FROM market_subcategories sc
                JOIN market_categories c ON c.id = sc.parent_id
                WHERE sc.slug = ? AND sc.parent_id = ?
                  AND sc.marketplace_id = ? AND c.marketplace_id = ?
                "#,
            )
            .bind(slug)
            .bind(parent_id)
            .bind(marketplace_id)
            .bind(marketplace_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get subcategory by slug")?;
            match row {
                Some(r) => Ok(Some(MarketSubCategory {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    parent_id: r.try_get("parent_id")?,
                    slug: r.try_get("slug")?,
                    name: r.try_get("name")?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn related_shops(&self, marketplace_id: i64, category_id: i64) -> Result<Vec<Shop>> {
        on_pool!(self.pool, |conn| {
            let rows = sqlx::query(
                r#"
                SELECT s.id, s.marketplace_id, s.name
                FROM shops s
                WHERE s.marketplace_id = ?
                  AND EXISTS (
                      SELECT 1 FROM products p
                      WHERE p.shop_id = s.id AND p.category_id = ?
                  )
                ORDER BY s.name, s.id
                "#,
            )
            .bind(marketplace_id)
            .bind(category_id)
            .fetch_all(conn)
            .await
            .context("Failed to list related shops")?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    #[tokio::test]
    async fn test_category_lookup_is_tenant_scoped() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let stamps = fx.marketplace("stamps").await;
        let cents = fx.category(coins.id, "small-cents", "Small Cents").await;
        fx.category(stamps.id, "small-cents", "Small Cents").await;

        let repo = SqlxCatalogRepository::new(fx.pool.clone());
        let found = repo.category_by_slug(coins.id, "small-cents").await.unwrap().unwrap();
        assert_eq!(found.id, cents.id);

        let by_name = repo.category_by_name(coins.id, "Small Cents").await.unwrap().unwrap();
        assert_eq!(by_name.id, cents.id);

        assert!(repo.category_by_slug(coins.id, "bullion").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subcategory_requires_matching_parent() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cents = fx.category(coins.id, "small-cents", "Small Cents").await;
        let dollars = fx.category(coins.id, "dollars", "Dollars").await;
        let flying_eagle = fx.subcategory(coins.id, cents.id, "flying-eagle", "Flying Eagle").await;

        let repo = SqlxCatalogRepository::new(fx.pool.clone());
        let found = repo
            .subcategory_by_slug(coins.id, cents.id, "flying-eagle")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, flying_eagle.id);

        assert!(repo
            .subcategory_by_slug(coins.id, dollars.id, "flying-eagle")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_related_shops() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cents = fx.category(coins.id, "small-cents", "Small Cents").await;
        let dollars = fx.category(coins.id, "dollars", "Dollars").await;
        let alpha = fx.shop(coins.id, "Alpha Coins").await;
        let beta = fx.shop(coins.id, "Beta Coins").await;
        fx.item(alpha.id, cents.id, None, "Indian Head cent", 500, 1).await;
        fx.item(beta.id, dollars.id, None, "Morgan dollar", 4000, 1).await;

        let repo = SqlxCatalogRepository::new(fx.pool.clone());
        let shops = repo.related_shops(coins.id, cents.id).await.unwrap();
        assert_eq!(shops.len(), 1);
        assert_eq!(shops[0].id, alpha.id);
    }
}
