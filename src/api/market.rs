//! Home page, newsletter signup, session mode switches and the static
//! marketplace pages

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use std::time::Duration;
use tera::Context as TeraContext;

use crate::api::common::{render, safe_next, ModeQuery};
use crate::api::middleware::{cache_control_public, AppState, RequestContext, ViewError};
use crate::cache::CacheLayer;
use crate::models::Flash;
use crate::services::search::DEFAULT_SORT_MODE;
use crate::services::{FormErrors, NewsletterForm, SIGNUP_SUCCESS_MESSAGE};

/// How long a rendered home page is served from the process cache
pub const HOME_CACHE_SECS: u32 = 300;

/// Layout stored by `/listing-mode` when none is given
pub const DEFAULT_LISTING_MODE: &str = "gallery";

fn home_cache_key(marketplace_id: i64) -> String {
    format!("home:{}", marketplace_id)
}

async fn render_home(
    state: &AppState,
    ctx: &RequestContext,
    form: &NewsletterForm,
    errors: &FormErrors,
) -> Result<Html<String>, ViewError> {
    let selection = state.products.home(&ctx.marketplace).await?;

    let mut context = TeraContext::new();
    context.insert("marketplace_picks", &selection.marketplace_picks);
    context.insert("dealer_picks", &selection.dealer_picks);
    context.insert("recent_products", &selection.recent_products);
    context.insert("form", form);
    context.insert("errors", errors);
    render(state, ctx, "home.html", &context)
}

/// GET / - Home page
///
/// Anonymous visitors without a pending message all see the same page, so
/// it is cached per marketplace for a few minutes.
pub async fn home(State(state): State<AppState>, ctx: RequestContext) -> Result<Response, ViewError> {
    let cacheable = ctx.user.is_none() && !ctx.session.has_flash();
    let key = home_cache_key(ctx.marketplace.id);

    if cacheable {
        if let Some(html) = state.cache.get::<String>(&key).await? {
            tracing::debug!(marketplace = %ctx.marketplace.slug, "Home page served from cache");
            return Ok(public_page(html));
        }
    }

    let Html(html) = render_home(&state, &ctx, &NewsletterForm::default(), &FormErrors::new()).await?;

    if !cacheable {
        return Ok(Html(html).into_response());
    }

    if let Err(e) = state
        .cache
        .set(&key, &html, Duration::from_secs(HOME_CACHE_SECS as u64))
        .await
    {
        tracing::warn!("Failed to cache home page: {}", e);
    }
    Ok(public_page(html))
}

fn public_page(html: String) -> Response {
    (
        [(header::CACHE_CONTROL, cache_control_public(HOME_CACHE_SECS))],
        Html(html),
    )
        .into_response()
}

/// POST / - Newsletter signup
pub async fn subscribe(
    State(state): State<AppState>,
    ctx: RequestContext,
    Form(form): Form<NewsletterForm>,
) -> Result<Response, ViewError> {
    match state.newsletter.subscribe(&ctx.marketplace, &form).await? {
        Ok(_) => {
            ctx.session.set_flash(Flash::success(SIGNUP_SUCCESS_MESSAGE));
            Ok(Redirect::to("/").into_response())
        }
        Err(errors) => Ok(render_home(&state, &ctx, &form, &errors).await?.into_response()),
    }
}

/// GET /listing-mode - Remember the listing layout
pub async fn set_listing_mode(ctx: RequestContext, Query(query): Query<ModeQuery>) -> Redirect {
    let mode = query
        .mode
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| DEFAULT_LISTING_MODE.to_string());
    ctx.session.set_view_mode(mode);
    Redirect::to(&safe_next(query.next.as_deref()))
}

/// GET /sort-mode - Remember the search ordering
///
/// The value is stored as given; unknown modes sort by title.
pub async fn set_order_mode(ctx: RequestContext, Query(query): Query<ModeQuery>) -> Redirect {
    let sort = query
        .sort
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SORT_MODE.to_string());
    ctx.session.set_sort_mode(sort);
    Redirect::to(&safe_next(query.next.as_deref()))
}

/// GET /sell
pub async fn sell(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ViewError> {
    render(&state, &ctx, "sell.html", &TeraContext::new())
}

/// GET /buy - Most recent products with a picture
pub async fn buy(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ViewError> {
    let products = state.products.recent(&ctx.marketplace).await?;

    let mut context = TeraContext::new();
    context.insert("products", &products);
    render(&state, &ctx, "buy.html", &context)
}

/// GET /community
pub async fn community(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ViewError> {
    render(&state, &ctx, "community.html", &TeraContext::new())
}

/// GET /survey
pub async fn survey(State(state): State<AppState>, ctx: RequestContext) -> Result<Html<String>, ViewError> {
    render(&state, &ctx, "survey.html", &TeraContext::new())
}
