//! Catalog search and item pages

use axum::{
    extract::{Path, Query, RawQuery, State},
    response::Html,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::common::{getvars, render, view_mode};
use crate::api::middleware::{AppState, RequestContext, ViewError};
use crate::services::{parse_page_param, SearchRequest};

/// Search query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    /// Category picked from the search box menu
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
}

struct Scope {
    category_slug: Option<String>,
    subcategory_slug: Option<String>,
    shop_id: Option<i64>,
}

async fn run_search(
    state: &AppState,
    ctx: &RequestContext,
    scope: Scope,
    query: SearchQuery,
    raw_query: Option<String>,
) -> Result<Html<String>, ViewError> {
    let request = SearchRequest {
        category_slug: scope.category_slug,
        subcategory_slug: scope.subcategory_slug,
        shop_id: scope.shop_id,
        text: query.q.clone(),
        category_name: query.category.clone(),
        sort_mode: ctx.session.sort_mode(),
        page: parse_page_param(query.page.as_deref()),
    };
    let results = state.search.search(&ctx.marketplace, &request).await?;

    let mut context = TeraContext::new();
    context.insert("current_category", &results.current_category);
    context.insert("current_subcategory", &results.current_subcategory);
    context.insert("products", &results.page);
    context.insert("paged", &results.page.paged);
    context.insert("sort_mode", &results.sort_mode);
    context.insert("promo_dealers", &results.promo_dealers);
    context.insert("shop_id", &request.shop_id);
    context.insert("q", &query.q.unwrap_or_default());
    context.insert("category", &query.category.unwrap_or_default());
    context.insert("getvars", &getvars(raw_query.as_deref()));
    context.insert("view_mode", &view_mode(ctx));
    render(state, ctx, "search.html", &context)
}

/// GET /search
pub async fn search(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<SearchQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let scope = Scope {
        category_slug: None,
        subcategory_slug: None,
        shop_id: None,
    };
    run_search(&state, &ctx, scope, query, raw).await
}

/// GET /category/{category_slug}
pub async fn search_category(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(category_slug): Path<String>,
    Query(query): Query<SearchQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let scope = Scope {
        category_slug: Some(category_slug),
        subcategory_slug: None,
        shop_id: None,
    };
    run_search(&state, &ctx, scope, query, raw).await
}

/// GET /category/{category_slug}/{subcategory_slug}
pub async fn search_subcategory(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path((category_slug, subcategory_slug)): Path<(String, String)>,
    Query(query): Query<SearchQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let scope = Scope {
        category_slug: Some(category_slug),
        subcategory_slug: Some(subcategory_slug),
        shop_id: None,
    };
    run_search(&state, &ctx, scope, query, raw).await
}

/// GET /shop/{shop_id}/search
pub async fn search_shop(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(shop_id): Path<String>,
    Query(query): Query<SearchQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let shop_id = parse_id(&shop_id)?;
    let scope = Scope {
        category_slug: None,
        subcategory_slug: None,
        shop_id: Some(shop_id),
    };
    run_search(&state, &ctx, scope, query, raw).await
}

/// GET /item/{product_id}
pub async fn view_item(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(product_id): Path<String>,
) -> Result<Html<String>, ViewError> {
    let product_id = parse_id(&product_id)?;
    let detail = state
        .products
        .detail(&ctx.marketplace, product_id)
        .await?
        .ok_or_else(|| ViewError::not_found(format!("product {}", product_id)))?;

    let mut context = TeraContext::new();
    context.insert("product", &detail.product);
    context.insert("kind", &detail.kind);
    context.insert("images", &detail.images);
    context.insert("price", &detail.price);
    context.insert("price_cents", &detail.price_cents);
    context.insert("available", &detail.available);
    context.insert("shop", &detail.shop);
    context.insert("shop_categories", &detail.shop_categories);
    context.insert("related_shops", &detail.related_shops);
    context.insert("shop_transactions", &detail.shop_transactions);
    render(&state, &ctx, "view_item.html", &context)
}

/// Numeric path segment; anything else is a missing page
fn parse_id(raw: &str) -> Result<i64, ViewError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ViewError::not_found(format!("id {:?}", raw)))
}
