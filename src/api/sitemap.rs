//! Sitemaps and robots.txt
//!
//! Rendered from the marketplace theme like any other page, with the
//! marketplace's absolute root URL in `base_url`.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tera::Context as TeraContext;

use crate::api::common::{base_url, public_host, render};
use crate::api::middleware::{AppState, RequestContext, ViewError};

const XML: &str = "application/xml; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

fn root_url(state: &AppState, ctx: &RequestContext) -> String {
    base_url(
        &state.config.server.public_scheme,
        public_host(&ctx.host, &ctx.marketplace.domain),
    )
}

fn base_context(state: &AppState, ctx: &RequestContext) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("base_url", &root_url(state, ctx));
    context
}

fn respond(
    state: &AppState,
    ctx: &RequestContext,
    template: &str,
    context: &TeraContext,
    content_type: &'static str,
) -> Result<Response, ViewError> {
    let body = render(state, ctx, template, context)?.0;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// GET /sitemap.xml
pub async fn sitemap(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, ViewError> {
    respond(&state, &ctx, "sitemap.xml", &base_context(&state, &ctx), XML)
}

/// GET /sitemaps/{sitemap_id} - Numbered sitemap shipped with the theme
pub async fn numbered_sitemap(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(sitemap_id): Path<String>,
) -> Result<Response, ViewError> {
    if sitemap_id.is_empty() || !sitemap_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ViewError::not_found(format!("sitemap {:?}", sitemap_id)));
    }

    let template = format!("sitemap{}.xml", sitemap_id);
    if state.theme.resolve(&ctx.marketplace, &template).is_err() {
        return Err(ViewError::not_found(template));
    }
    respond(&state, &ctx, &template, &base_context(&state, &ctx), XML)
}

/// GET /sitemap_index.xml
pub async fn sitemap_index(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, ViewError> {
    respond(&state, &ctx, "sitemap_index.xml", &base_context(&state, &ctx), XML)
}

/// GET /sitemap_products.xml - Every product of the marketplace
///
/// Product URLs are appended to `base_url`, which has no trailing slash here.
pub async fn sitemap_products(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Response, ViewError> {
    let products = state.products.sitemap_products(&ctx.marketplace).await?;

    let mut context = TeraContext::new();
    context.insert("base_url", root_url(&state, &ctx).trim_end_matches('/'));
    context.insert("products", &products);
    respond(&state, &ctx, "sitemap_products.xml", &context, XML)
}

/// GET /robots.txt
pub async fn robots(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, ViewError> {
    respond(&state, &ctx, "robots.txt", &base_context(&state, &ctx), TEXT)
}
