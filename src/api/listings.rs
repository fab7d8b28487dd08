//! Auction and fixed-price listings
//!
//! Both pages clamp an out-of-range `?page=` to the last page instead of
//! failing.

use axum::{
    extract::{Query, RawQuery, State},
    response::Html,
};
use tera::Context as TeraContext;

use crate::api::common::{getvars, render, view_mode, PageQuery};
use crate::api::middleware::{AppState, RequestContext, ViewError};
use crate::models::ProductCard;
use crate::services::{parse_page_param, Page};

fn listing_context(ctx: &RequestContext, page: &Page<ProductCard>, raw_query: Option<&str>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("products", page);
    context.insert("paged", &page.paged);
    context.insert("getvars", &getvars(raw_query));
    context.insert("view_mode", &view_mode(ctx));
    context
}

/// GET /auctions
pub async fn auctions(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let page = state
        .products
        .auctions(&ctx.marketplace, parse_page_param(query.page.as_deref()))
        .await?;
    render(&state, &ctx, "auctions.html", &listing_context(&ctx, &page, raw.as_deref()))
}

/// GET /for-sale
pub async fn for_sale(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, ViewError> {
    let page = state
        .products
        .for_sale(&ctx.marketplace, parse_page_param(query.page.as_deref()))
        .await?;
    render(&state, &ctx, "for_sale.html", &listing_context(&ctx, &page, raw.as_deref()))
}
