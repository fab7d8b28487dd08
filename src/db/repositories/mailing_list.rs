//! Mailing list repository

use crate::db::{insert_returning_id, on_pool, DynDatabasePool};
use crate::models::MailingListMember;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait MailingListRepository: Send + Sync {
    async fn exists(&self, marketplace_id: i64, email: &str) -> Result<bool>;

    async fn create(&self, marketplace_id: i64, email: &str) -> Result<MailingListMember>;

    async fn list(&self, marketplace_id: i64) -> Result<Vec<MailingListMember>>;
}

pub struct SqlxMailingListRepository {
    pool: DynDatabasePool,
}

impl SqlxMailingListRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MailingListRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl MailingListRepository for SqlxMailingListRepository {
    async fn exists(&self, marketplace_id: i64, email: &str) -> Result<bool> {
        on_pool!(self.pool, |conn| {
            let row = sqlx::query(
                "SELECT COUNT(*) AS total FROM mailing_list_members WHERE marketplace_id = ? AND email = ?",
            )
            .bind(marketplace_id)
            .bind(email)
            .fetch_one(conn)
            .await
            .context("Failed to check mailing list membership")?;
            let total: i64 = row.try_get("total")?;
            Ok(total > 0)
        })
    }

    async fn create(&self, marketplace_id: i64, email: &str) -> Result<MailingListMember> {
        let id = insert_returning_id!(
            self.pool,
            sqlx::query("INSERT INTO mailing_list_members (marketplace_id, email) VALUES (?, ?)")
                .bind(marketplace_id)
                .bind(email)
        );

        Ok(MailingListMember {
            id,
            marketplace_id,
            email: email.to_string(),
        })
    }

    async fn list(&self, marketplace_id: i64) -> Result<Vec<MailingListMember>> {
        on_pool!(self.pool, |conn| {
            let rows = sqlx::query(
                "SELECT id, marketplace_id, email FROM mailing_list_members WHERE marketplace_id = ? ORDER BY id",
            )
            .bind(marketplace_id)
            .fetch_all(conn)
            .await
            .context("Failed to list mailing list members")?;
            let mut members = Vec::with_capacity(rows.len());
            for r in &rows {
                members.push(MailingListMember {
                    id: r.try_get("id")?,
                    marketplace_id: r.try_get("marketplace_id")?,
                    email: r.try_get("email")?,
                });
            }
            Ok(members)
        })
    }
}
