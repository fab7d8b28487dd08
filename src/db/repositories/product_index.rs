//! Product search index
//!
//! Catalog search runs against a [`ProductIndex`]. The default implementation
//! queries the product tables directly; a dedicated full-text engine can be
//! plugged in behind the same trait.

use super::product::{product_from_row, PRODUCT_SELECT};
use crate::db::{on_pool, DynDatabasePool};
use crate::models::Product;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Result ordering understood by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    AddedDesc,
    AddedAsc,
    TitleAsc,
    TitleDesc,
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    fn order_by(self) -> &'static str {
        match self {
            SortKey::AddedDesc => "p.date_time DESC, p.id DESC",
            SortKey::AddedAsc => "p.date_time ASC, p.id ASC",
            SortKey::TitleAsc => "p.title ASC, p.id ASC",
            SortKey::TitleDesc => "p.title DESC, p.id DESC",
            SortKey::PriceAsc => "price_sort ASC, p.id ASC",
            SortKey::PriceDesc => "price_sort DESC, p.id DESC",
        }
    }
}

/// Narrowing criteria for one catalog search
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
    pub marketplace_id: i64,
    pub shop_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Category matched by display name (the search box's category menu)
    pub category_name: Option<String>,
    pub subcategory_id: Option<i64>,
    /// Every term must appear in the product summary
    pub terms: Vec<String>,
    pub sort: SortKey,
}

impl ProductQuery {
    pub fn new(marketplace_id: i64) -> Self {
        Self {
            marketplace_id,
            shop_id: None,
            category_id: None,
            category_name: None,
            subcategory_id: None,
            terms: Vec::new(),
            sort: SortKey::TitleAsc,
        }
    }
}

#[async_trait]
pub trait ProductIndex: Send + Sync {
    /// Number of products matching the query
    async fn count(&self, query: &ProductQuery) -> Result<i64>;

    /// One window of matching products in the query's order
    async fn search(&self, query: &ProductQuery, offset: i64, limit: i64) -> Result<Vec<Product>>;
}

enum SqlArg {
    Int(i64),
    Text(String),
}

/// Index backed by the relational product tables
pub struct SqlxProductIndex {
    pool: DynDatabasePool,
}

impl SqlxProductIndex {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProductIndex> {
        Arc::new(Self::new(pool))
    }
}

/// WHERE clause (with leading joins) and its arguments for `query`
fn build_filter(query: &ProductQuery) -> (String, Vec<SqlArg>) {
    let mut joins = String::new();
    let mut clauses = vec!["s.marketplace_id = ?".to_string()];
    let mut args = vec![SqlArg::Int(query.marketplace_id)];

    if let Some(shop_id) = query.shop_id {
        clauses.push("p.shop_id = ?".to_string());
        args.push(SqlArg::Int(shop_id));
    }
    if let Some(category_id) = query.category_id {
        clauses.push("p.category_id = ?".to_string());
        args.push(SqlArg::Int(category_id));
    }
    if let Some(name) = &query.category_name {
        joins.push_str(" JOIN market_categories c ON c.id = p.category_id");
        clauses.push("c.name = ?".to_string());
        args.push(SqlArg::Text(name.clone()));
    }
    if let Some(subcategory_id) = query.subcategory_id {
        clauses.push("p.subcategory_id = ?".to_string());
        args.push(SqlArg::Int(subcategory_id));
    }
    for term in &query.terms {
        clauses.push("LOWER(p.summary) LIKE ? ESCAPE '!'".to_string());
        args.push(SqlArg::Text(format!("%{}%", escape_like(&term.to_lowercase()))));
    }

    (format!("{} WHERE {}", joins, clauses.join(" AND ")), args)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl ProductIndex for SqlxProductIndex {
    async fn count(&self, query: &ProductQuery) -> Result<i64> {
        let (filter, args) = build_filter(query);
        let sql = format!(
            "SELECT COUNT(*) AS total FROM products p JOIN shops s ON s.id = p.shop_id{}",
            filter
        );
        on_pool!(self.pool, |conn| {
            let mut q = sqlx::query(&sql);
            for arg in &args {
                q = match arg {
                    SqlArg::Int(v) => q.bind(*v),
                    SqlArg::Text(v) => q.bind(v.as_str()),
                };
            }
            let row = q.fetch_one(conn).await.context("Failed to count search results")?;
            Ok(row.try_get("total")?)
        })
    }

    async fn search(&self, query: &ProductQuery, offset: i64, limit: i64) -> Result<Vec<Product>> {
        let (filter, args) = build_filter(query);
        // Derived table so the price expression can be ordered by alias on both backends
        let sql = format!(
            "SELECT * FROM (SELECT base.*, \
                 COALESCE(base.item_price_cents, base.lot_high_bid_cents, base.lot_starting_bid_cents) AS price_sort \
                 FROM ({}{}) base) p \
             ORDER BY {} LIMIT ? OFFSET ?",
            PRODUCT_SELECT,
            filter,
            query.sort.order_by()
        );
        on_pool!(self.pool, |conn| {
            let mut q = sqlx::query(&sql);
            for arg in &args {
                q = match arg {
                    SqlArg::Int(v) => q.bind(*v),
                    SqlArg::Text(v) => q.bind(v.as_str()),
                };
            }
            let rows = q
                .bind(limit)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to search products")?;
            let mut products = Vec::with_capacity(rows.len());
            for row in &rows {
                products.push(product_from_row!(row));
            }
            Ok(products)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LotState;
    use crate::test_support::Fixture;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%"), "50!%");
        assert_eq!(escape_like("a_b!"), "a!_b!!");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_build_filter_binds_in_clause_order() {
        let mut query = ProductQuery::new(3);
        query.shop_id = Some(9);
        query.terms = vec!["Cent".to_string()];
        let (filter, args) = build_filter(&query);

        assert!(filter.contains("s.marketplace_id = ? AND p.shop_id = ? AND LOWER(p.summary) LIKE ?"));
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0], SqlArg::Int(3)));
        assert!(matches!(args[1], SqlArg::Int(9)));
        assert!(matches!(args[2], SqlArg::Text(ref t) if t == "%cent%"));
    }

    #[tokio::test]
    async fn test_search_orders_by_computed_price() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        let cheap = fx.item(shop.id, cat.id, None, "Cheap", 100, 1).await;
        let lot = fx.lot(shop.id, cat.id, "Bid up", 50, LotState::Active).await;
        fx.bid(lot, 700).await;
        let mid = fx.item(shop.id, cat.id, None, "Mid", 500, 1).await;

        let index = SqlxProductIndex::new(fx.pool.clone());
        let mut query = ProductQuery::new(coins.id);
        query.sort = SortKey::PriceAsc;
        let ids: Vec<i64> = index.search(&query, 0, 10).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![cheap, mid, lot]);

        query.sort = SortKey::PriceDesc;
        let ids: Vec<i64> = index.search(&query, 0, 10).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![lot, mid, cheap]);
    }

    #[tokio::test]
    async fn test_terms_must_all_match_summary() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        let both = fx
            .item_with_summary(shop.id, cat.id, "A", "Indian Head cent, red")
            .await;
        fx.item_with_summary(shop.id, cat.id, "B", "Indian Head cent, brown").await;
        fx.item_with_summary(shop.id, cat.id, "C", "Lincoln cent, red").await;

        let index = SqlxProductIndex::new(fx.pool.clone());
        let mut query = ProductQuery::new(coins.id);
        query.terms = vec!["indian".to_string(), "RED".to_string()];

        assert_eq!(index.count(&query).await.unwrap(), 1);
        let found = index.search(&query, 0, 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, both);
    }

    #[tokio::test]
    async fn test_category_name_filter() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cents = fx.category(coins.id, "cents", "Cents").await;
        let dollars = fx.category(coins.id, "dollars", "Dollars").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        fx.item(shop.id, cents.id, None, "Cent", 100, 1).await;
        let dollar = fx.item(shop.id, dollars.id, None, "Dollar", 100, 1).await;

        let index = SqlxProductIndex::new(fx.pool.clone());
        let mut query = ProductQuery::new(coins.id);
        query.category_name = Some("Dollars".to_string());
        let found = index.search(&query, 0, 10).await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![dollar]);
    }

    #[tokio::test]
    async fn test_window_offsets() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        for title in ["A", "B", "C", "D", "E"] {
            fx.item(shop.id, cat.id, None, title, 100, 1).await;
        }

        let index = SqlxProductIndex::new(fx.pool.clone());
        let query = ProductQuery::new(coins.id);
        let titles: Vec<String> = index
            .search(&query, 2, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["C", "D"]);
        assert_eq!(index.count(&query).await.unwrap(), 5);
    }
}
