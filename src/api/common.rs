//! Common page utilities and shared types
//!
//! This module contains helpers used across several storefront pages.

use axum::response::Html;
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::middleware::{AppState, RequestContext, ViewError};
use crate::theme::StandardTemplateVars;

/// Layout used by listing pages until the visitor picks one
pub const DEFAULT_VIEW_MODE: &str = "list";

// ============================================================================
// Query Types
// ============================================================================

/// `?page=` on paginated pages; parsed leniently
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

/// `?next=` plus the value being stored, for the session mode switches
#[derive(Debug, Default, Deserialize)]
pub struct ModeQuery {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Query string without its `page` parameter, ready to be appended to a
/// pagination link as `?page=N{{ getvars }}`
pub fn getvars(raw_query: Option<&str>) -> String {
    let kept: Vec<&str> = raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .collect();

    if kept.is_empty() {
        String::new()
    } else {
        format!("&{}", kept.join("&"))
    }
}

/// Absolute root URL of the marketplace, with trailing slash
pub fn base_url(scheme: &str, host: &str) -> String {
    format!("{}://{}/", scheme, host)
}

/// Host for absolute URLs: the request's Host header when it looks like a
/// host name, the marketplace domain otherwise
pub fn public_host<'a>(request_host: &'a str, marketplace_domain: &'a str) -> &'a str {
    let plausible = !request_host.is_empty()
        && request_host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if plausible {
        request_host
    } else {
        marketplace_domain
    }
}

/// Redirect target from `?next=`; only local paths are honoured
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Render a page from the marketplace's theme.
///
/// Consumes the pending flash message, so it shows exactly once.
pub fn render(
    state: &AppState,
    ctx: &RequestContext,
    template: &str,
    context: &TeraContext,
) -> Result<Html<String>, ViewError> {
    let vars = StandardTemplateVars::new(ctx.path.clone())
        .with_user(ctx.user.clone())
        .with_flash(ctx.session.take_flash());

    let html = state.theme.render_page(&ctx.marketplace, template, context, &vars)?;
    Ok(Html(html))
}

/// Listing layout stored in the session
pub fn view_mode(ctx: &RequestContext) -> String {
    ctx.session
        .view_mode()
        .unwrap_or_else(|| DEFAULT_VIEW_MODE.to_string())
}
