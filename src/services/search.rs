//! Catalog search
//!
//! Turns the search inputs of a request (category path, shop, free text,
//! category menu and the visitor's stored sort mode) into a [`ProductQuery`]
//! and runs it against the [`ProductIndex`] one page at a time.

use super::pagination::{paginate, PagePolicy, Page, PaginationError};
use crate::db::repositories::{CatalogRepository, ProductIndex, ProductQuery, SortKey};
use crate::models::{MarketCategory, MarketSubCategory, Marketplace, ProductCard, Shop};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const SEARCH_PAGE_SIZE: i64 = 16;

/// Category menu entry that means "no category filter"
pub const ALL_CATEGORIES: &str = "All Categories";

/// Sort mode used when the visitor never picked one
pub const DEFAULT_SORT_MODE: &str = "title";

/// Sort modes a visitor can pick, in evaluation order
pub const SORT_MODES: &[(&str, SortKey)] = &[
    ("recent", SortKey::AddedDesc),
    ("oldest", SortKey::AddedAsc),
    ("title", SortKey::TitleAsc),
    ("-title", SortKey::TitleDesc),
    ("price", SortKey::PriceAsc),
    ("-price", SortKey::PriceDesc),
];

/// Ordering for a stored sort mode.
///
/// Every entry is checked and a later match overrides an earlier one;
/// anything unrecognised keeps title ascending.
pub fn sort_key_for(mode: &str) -> SortKey {
    SORT_MODES
        .iter()
        .fold(SortKey::TitleAsc, |current, (name, key)| {
            if *name == mode {
                *key
            } else {
                current
            }
        })
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Subcategory not found: {0}")]
    SubcategoryNotFound(String),
    #[error(transparent)]
    Page(#[from] PaginationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Search inputs taken from the path, query string and session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub category_slug: Option<String>,
    pub subcategory_slug: Option<String>,
    pub shop_id: Option<i64>,
    /// Free text, `q`
    pub text: Option<String>,
    /// Category menu value, `category`
    pub category_name: Option<String>,
    /// Raw sort mode stored in the session
    pub sort_mode: Option<String>,
    pub page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub current_category: Option<MarketCategory>,
    pub current_subcategory: Option<MarketSubCategory>,
    pub page: Page<ProductCard>,
    /// Stored sort mode echoed back as-is
    pub sort_mode: String,
    /// Related shops shown on the promotional category
    pub promo_dealers: Vec<Shop>,
}

pub struct SearchService {
    catalog: Arc<dyn CatalogRepository>,
    index: Arc<dyn ProductIndex>,
    promo_category_slug: String,
}

/// Query plus the catalog entries it was narrowed to
struct ResolvedQuery {
    query: ProductQuery,
    category: Option<MarketCategory>,
    subcategory: Option<MarketSubCategory>,
}

impl SearchService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        index: Arc<dyn ProductIndex>,
        promo_category_slug: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            index,
            promo_category_slug: promo_category_slug.into(),
        }
    }

    pub async fn search(
        &self,
        marketplace: &Marketplace,
        request: &SearchRequest,
    ) -> Result<SearchResults, SearchError> {
        let resolved = self.resolve(marketplace, request).await?;
        let query = &resolved.query;

        let promo_dealers = match &resolved.category {
            Some(category) if category.slug == self.promo_category_slug => {
                self.catalog.related_shops(marketplace.id, category.id).await?
            }
            _ => Vec::new(),
        };

        let total = self.index.count(query).await?;
        let page = paginate(total, SEARCH_PAGE_SIZE, request.page, PagePolicy::Strict, |offset, limit| {
            self.index.search(query, offset, limit)
        })
        .await??;

        tracing::debug!(
            marketplace = %marketplace.slug,
            total,
            page = page.number,
            "Catalog search"
        );

        Ok(SearchResults {
            current_category: resolved.category,
            current_subcategory: resolved.subcategory,
            page: page.map(|p| ProductCard::from(&p)),
            sort_mode: request
                .sort_mode
                .clone()
                .unwrap_or_else(|| DEFAULT_SORT_MODE.to_string()),
            promo_dealers,
        })
    }

    async fn resolve(
        &self,
        marketplace: &Marketplace,
        request: &SearchRequest,
    ) -> Result<ResolvedQuery, SearchError> {
        let mut query = ProductQuery::new(marketplace.id);
        let mut category = None;
        let mut subcategory = None;

        if let Some(slug) = &request.category_slug {
            let found = self
                .catalog
                .category_by_slug(marketplace.id, slug)
                .await?
                .ok_or_else(|| SearchError::CategoryNotFound(slug.clone()))?;
            query.category_id = Some(found.id);

            if let Some(sub_slug) = &request.subcategory_slug {
                let sub = self
                    .catalog
                    .subcategory_by_slug(marketplace.id, found.id, sub_slug)
                    .await?
                    .ok_or_else(|| SearchError::SubcategoryNotFound(sub_slug.clone()))?;
                query.subcategory_id = Some(sub.id);
                subcategory = Some(sub);
            }
            category = Some(found);
        } else if let Some(name) = request
            .category_name
            .as_deref()
            .filter(|name| !name.is_empty() && *name != ALL_CATEGORIES)
        {
            query.category_name = Some(name.to_string());
            let found = self
                .catalog
                .category_by_name(marketplace.id, name)
                .await?
                .ok_or_else(|| SearchError::CategoryNotFound(name.to_string()))?;
            category = Some(found);
        }

        query.shop_id = request.shop_id;
        query.terms = request
            .text
            .as_deref()
            .map(|text| text.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        query.sort = sort_key_for(request.sort_mode.as_deref().unwrap_or(DEFAULT_SORT_MODE));

        Ok(ResolvedQuery {
            query,
            category,
            subcategory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCatalogRepository, SqlxProductIndex};
    use crate::models::LotState;
    use crate::test_support::Fixture;

    fn service(fx: &Fixture) -> SearchService {
        SearchService::new(
            SqlxCatalogRepository::boxed(fx.pool.clone()),
            SqlxProductIndex::boxed(fx.pool.clone()),
            "small-cents",
        )
    }

    fn request() -> SearchRequest {
        SearchRequest {
            page: 1,
            ..SearchRequest::default()
        }
    }

    fn ids(results: &SearchResults) -> Vec<i64> {
        results.page.items.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_sort_key_for_known_modes() {
        assert_eq!(sort_key_for("recent"), SortKey::AddedDesc);
        assert_eq!(sort_key_for("oldest"), SortKey::AddedAsc);
        assert_eq!(sort_key_for("title"), SortKey::TitleAsc);
        assert_eq!(sort_key_for("-title"), SortKey::TitleDesc);
        assert_eq!(sort_key_for("price"), SortKey::PriceAsc);
        assert_eq!(sort_key_for("-price"), SortKey::PriceDesc);
    }

    #[test]
    fn test_sort_key_for_unknown_mode_is_title() {
        assert_eq!(sort_key_for("cheapest"), SortKey::TitleAsc);
        assert_eq!(sort_key_for(""), SortKey::TitleAsc);
        assert_eq!(sort_key_for("PRICE"), SortKey::TitleAsc);
    }

    #[tokio::test]
    async fn test_category_and_subcategory_narrowing() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cents = fx.category(coins.id, "cents", "Cents").await;
        let dollars = fx.category(coins.id, "dollars", "Dollars").await;
        let wheat = fx.subcategory(coins.id, cents.id, "wheat", "Wheat").await;
        let indian = fx.subcategory(coins.id, cents.id, "indian", "Indian Head").await;
        fx.subcategory(coins.id, dollars.id, "morgan", "Morgan").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        let a = fx.item(shop.id, cents.id, Some(wheat.id), "Wheat 1909", 100, 1).await;
        fx.item(shop.id, cents.id, Some(indian.id), "Indian 1900", 100, 1).await;
        fx.item(shop.id, dollars.id, None, "Morgan 1881", 100, 1).await;

        let search = service(&fx);
        let mut req = request();
        req.category_slug = Some("cents".to_string());
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(results.page.total, 2);
        assert_eq!(results.current_category.as_ref().map(|c| c.id), Some(cents.id));

        req.subcategory_slug = Some("wheat".to_string());
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(ids(&results), vec![a]);
        assert_eq!(results.current_subcategory.map(|s| s.id), Some(wheat.id));

        // subcategory of another parent
        req.subcategory_slug = Some("morgan".to_string());
        assert!(matches!(
            search.search(&coins, &req).await,
            Err(SearchError::SubcategoryNotFound(_))
        ));

        req.category_slug = Some("nickels".to_string());
        req.subcategory_slug = None;
        assert!(matches!(
            search.search(&coins, &req).await,
            Err(SearchError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_category_of_other_marketplace_is_not_found() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let stamps = fx.marketplace("stamps").await;
        fx.category(stamps.id, "airmail", "Airmail").await;

        let mut req = request();
        req.category_slug = Some("airmail".to_string());
        assert!(matches!(
            service(&fx).search(&coins, &req).await,
            Err(SearchError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_category_name_parameter() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cents = fx.category(coins.id, "cents", "Cents").await;
        let dollars = fx.category(coins.id, "dollars", "Dollars").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        fx.item(shop.id, cents.id, None, "Cent", 100, 1).await;
        let dollar = fx.item(shop.id, dollars.id, None, "Dollar", 100, 1).await;

        let search = service(&fx);
        let mut req = request();
        for ignored in ["", ALL_CATEGORIES] {
            req.category_name = Some(ignored.to_string());
            let results = search.search(&coins, &req).await.unwrap();
            assert_eq!(results.page.total, 2);
            assert!(results.current_category.is_none());
        }

        req.category_name = Some("Dollars".to_string());
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(ids(&results), vec![dollar]);
        assert_eq!(results.current_category.map(|c| c.slug), Some("dollars".to_string()));

        req.category_name = Some("Nickels".to_string());
        assert!(matches!(
            search.search(&coins, &req).await,
            Err(SearchError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_promo_category_lists_related_shops() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let promo = fx.category(coins.id, "small-cents", "Small Cents").await;
        let other = fx.category(coins.id, "dollars", "Dollars").await;
        let alpha = fx.shop(coins.id, "Alpha").await;
        let beta = fx.shop(coins.id, "Beta").await;
        fx.item(alpha.id, promo.id, None, "Flying Eagle", 100, 1).await;
        fx.item(beta.id, other.id, None, "Morgan", 100, 1).await;

        let search = service(&fx);
        let mut req = request();
        req.category_slug = Some("small-cents".to_string());
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(
            results.promo_dealers.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![alpha.id]
        );

        req.category_slug = Some("dollars".to_string());
        assert!(search.search(&coins, &req).await.unwrap().promo_dealers.is_empty());
    }

    #[tokio::test]
    async fn test_shop_filter_and_text_terms() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let alpha = fx.shop(coins.id, "Alpha").await;
        let beta = fx.shop(coins.id, "Beta").await;
        let mine = fx.item_with_summary(alpha.id, cat.id, "A", "Indian Head cent").await;
        fx.item_with_summary(beta.id, cat.id, "B", "Indian Head cent").await;
        fx.item_with_summary(alpha.id, cat.id, "C", "Lincoln cent").await;

        let mut req = request();
        req.shop_id = Some(alpha.id);
        req.text = Some("  indian   head ".to_string());
        let results = service(&fx).search(&coins, &req).await.unwrap();
        assert_eq!(ids(&results), vec![mine]);

        req.text = Some("   ".to_string());
        let results = service(&fx).search(&coins, &req).await.unwrap();
        assert_eq!(results.page.total, 2);
    }

    #[tokio::test]
    async fn test_sort_modes_and_echo() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        let b = fx.item(shop.id, cat.id, None, "B", 300, 1).await;
        let a = fx.item(shop.id, cat.id, None, "A", 500, 1).await;
        let c = fx.lot(shop.id, cat.id, "C", 100, LotState::Active).await;

        let search = service(&fx);
        let mut req = request();

        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(ids(&results), vec![a, b, c]);
        assert_eq!(results.sort_mode, "title");

        req.sort_mode = Some("price".to_string());
        assert_eq!(ids(&search.search(&coins, &req).await.unwrap()), vec![c, b, a]);

        req.sort_mode = Some("-price".to_string());
        assert_eq!(ids(&search.search(&coins, &req).await.unwrap()), vec![a, b, c]);

        req.sort_mode = Some("recent".to_string());
        assert_eq!(ids(&search.search(&coins, &req).await.unwrap()), vec![c, a, b]);

        req.sort_mode = Some("bogus".to_string());
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(ids(&results), vec![a, b, c]);
        assert_eq!(results.sort_mode, "bogus");
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_an_error() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        for i in 0..(SEARCH_PAGE_SIZE + 1) {
            fx.item(shop.id, cat.id, None, &format!("Coin {:02}", i), 100, 1).await;
        }

        let search = service(&fx);
        let mut req = request();
        req.page = 2;
        let results = search.search(&coins, &req).await.unwrap();
        assert_eq!(results.page.items.len(), 1);
        assert!(results.page.paged);

        for page in [0, 3] {
            req.page = page;
            assert!(matches!(
                search.search(&coins, &req).await,
                Err(SearchError::Page(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_same_page_twice_is_stable() {
        let fx = Fixture::new().await;
        let coins = fx.marketplace("coins").await;
        let cat = fx.category(coins.id, "cents", "Cents").await;
        let shop = fx.shop(coins.id, "Alpha").await;
        for _ in 0..20 {
            fx.item(shop.id, cat.id, None, "Same title", 100, 1).await;
        }

        let search = service(&fx);
        let mut req = request();
        req.page = 2;
        let first = search.search(&coins, &req).await.unwrap();
        let second = search.search(&coins, &req).await.unwrap();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.page.total, second.page.total);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn unknown_modes_sort_by_title(mode in "\\PC*") {
                let known = SORT_MODES.iter().any(|(name, _)| *name == mode);
                prop_assume!(!known);
                prop_assert_eq!(sort_key_for(&mode), SortKey::TitleAsc);
            }

            #[test]
            fn known_modes_map_to_their_entry(index in 0usize..SORT_MODES.len()) {
                let (name, key) = SORT_MODES[index];
                prop_assert_eq!(sort_key_for(name), key);
            }
        }
    }
}
