//! Marketplace repository
//!
//! Tenant lookup by request host or slug.

use crate::db::{insert_returning_id, on_pool, DynDatabasePool};
use crate::models::Marketplace;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait MarketplaceRepository: Send + Sync {
    /// Find the marketplace served on `domain`
    async fn get_by_domain(&self, domain: &str) -> Result<Option<Marketplace>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Marketplace>>;

    /// Create a marketplace; `marketplace.id` is ignored
    async fn create(&self, marketplace: &Marketplace) -> Result<Marketplace>;
}

pub struct SqlxMarketplaceRepository {
    pool: DynDatabasePool,
}

impl SqlxMarketplaceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MarketplaceRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> Result<Option<Marketplace>> {
        let sql = format!(
            "SELECT id, slug, name, domain, contact_email, template_prefix \
             FROM marketplaces WHERE {} = ?",
            column
        );
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get marketplace by {}", column))?;
            match row {
                Some(r) => Ok(Some(Marketplace {
                    id: r.try_get("id")?,
                    slug: r.try_get("slug")?,
                    name: r.try_get("name")?,
                    domain: r.try_get("domain")?,
                    contact_email: r.try_get("contact_email")?,
                    template_prefix: r.try_get("template_prefix")?,
                })),
                None => Ok(None),
            }
        })
    }
}

#[async_trait]
impl MarketplaceRepository for SqlxMarketplaceRepository {
    async fn get_by_domain(&self, domain: &str) -> Result<Option<Marketplace>> {
        self.fetch_one_where("domain", domain).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Marketplace>> {
        self.fetch_one_where("slug", slug).await
    }

    async fn create(&self, marketplace: &Marketplace) -> Result<Marketplace> {
        let id = insert_returning_id!(
            self.pool,
            sqlx::query(
                "INSERT INTO marketplaces (slug, name, domain, contact_email, template_prefix) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&marketplace.slug)
            .bind(&marketplace.name)
            .bind(&marketplace.domain)
            .bind(&marketplace.contact_email)
            .bind(&marketplace.template_prefix)
        );

        Ok(Marketplace {
            id,
            ..marketplace.clone()
        })
    }
}
