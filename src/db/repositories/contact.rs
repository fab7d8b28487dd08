//! Contact form abuse record repository
//!
//! Records are keyed by (marketplace, email, ip). Creation races between
//! concurrent submissions are settled by the unique index: the loser re-reads
//! the winner's row.

use crate::db::{on_pool, DynDatabasePool};
use crate::models::ContactFormInfo;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait ContactFormInfoRepository: Send + Sync {
    async fn get(&self, marketplace_id: i64, email: &str, ip: &str) -> Result<Option<ContactFormInfo>>;

    /// Fetch the record for the key, creating it stamped with `now` when
    /// missing. The flag is true when this call created the record; an
    /// existing record is returned unchanged.
    async fn get_or_create(
        &self,
        marketplace_id: i64,
        email: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(ContactFormInfo, bool)>;

    /// Overwrite the record's timestamp
    async fn touch(&self, id: i64, now: DateTime<Utc>) -> Result<()>;
}

pub struct SqlxContactFormInfoRepository {
    pool: DynDatabasePool,
}

impl SqlxContactFormInfoRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContactFormInfoRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ContactFormInfoRepository for SqlxContactFormInfoRepository {
    async fn get(&self, marketplace_id: i64, email: &str, ip: &str) -> Result<Option<ContactFormInfo>> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(
                r#"
                SELECT id, marketplace_id, email, ip, datetime
                FROM contact_form_infos
                WHERE marketplace_id = ? AND email = ? AND ip = ?
                "#,
            )
            .bind(marketplace_id)
            .bind(email)
            .bind(ip)
            .fetch_optional(conn)
            .await
            .context("Failed to get contact form info")?;
            match row {
                Some(r) => Ok(Some(ContactFormInfo {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    email: r.try_get("email")?,
                    ip: r.try_get("ip")?,
                    datetime: r.try_get("datetime")?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn get_or_create(
        &self,
        marketplace_id: i64,
        email: &str,
        ip: &str,
        now: DateTime<Utc>,
    ) -> Result<(ContactFormInfo, bool)> {
        if let Some(existing) = self.get(marketplace_id, email, ip).await? {
            return Ok((existing, false));
        }

        let created = on_pool!(self.pool, |conn| {
            let result = sqlx::query(
                "INSERT INTO contact_form_infos (marketplace_id, email, ip, datetime) VALUES (?, ?, ?, ?)",
            )
            .bind(marketplace_id)
            .bind(email)
            .bind(ip)
            .bind(now)
            .execute(conn)
            .await;
            match result {
                Ok(_) => true,
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => false,
                Err(e) => return Err(anyhow::Error::new(e).context("Failed to create contact form info")),
            }
        });

        let record = self
            .get(marketplace_id, email, ip)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Contact form info vanished after insert"))?;
        Ok((record, created))
    }

    async fn touch(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        on_pool!(self.pool, |conn| {
            sqlx::query("UPDATE contact_form_infos SET datetime = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update contact form info")?;
        });
        Ok(())
    }
}
