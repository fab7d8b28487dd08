//! HTTP layer - page handlers and routing
//!
//! Every page is rendered server-side from the requesting marketplace's
//! theme. It includes:
//! - Home page and newsletter signup
//! - Catalog search, category and shop pages, item detail
//! - Auction and for-sale listings
//! - Blog with reader comments
//! - Contact form
//! - Sitemaps and robots.txt

pub mod blog;
pub mod common;
pub mod contact;
pub mod listings;
pub mod market;
pub mod middleware;
pub mod search;
pub mod sitemap;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

pub use middleware::{AppState, RequestContext, SessionHandle, ViewError};

/// Build the storefront routes
pub fn build_page_router(state: AppState) -> Router<AppState> {
    // Pages that need a signed-in reader
    let members_routes = Router::new()
        .route("/blog/comment", post(blog::add_post_comment))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_login,
        ));

    Router::new()
        .route("/", get(market::home).post(market::subscribe))
        .route("/search", get(search::search))
        .route("/category/{category_slug}", get(search::search_category))
        .route(
            "/category/{category_slug}/{subcategory_slug}",
            get(search::search_subcategory),
        )
        .route("/shop/{shop_id}/search", get(search::search_shop))
        .route("/item/{product_id}", get(search::view_item))
        .route("/listing-mode", get(market::set_listing_mode))
        .route("/sort-mode", get(market::set_order_mode))
        .route("/auctions", get(listings::auctions))
        .route("/for-sale", get(listings::for_sale))
        .route("/sell", get(market::sell))
        .route("/buy", get(market::buy))
        .route("/community", get(market::community))
        .route("/survey", get(market::survey))
        .route("/blog", get(blog::blog))
        .route("/blog/{post_slug}", get(blog::view_post))
        .route("/contact-us", get(contact::contact_us).post(contact::submit_contact))
        .route("/sitemap.xml", get(sitemap::sitemap))
        .route("/sitemaps/{sitemap_id}", get(sitemap::numbered_sitemap))
        .route("/sitemap_index.xml", get(sitemap::sitemap_index))
        .route("/sitemap_products.xml", get(sitemap::sitemap_products))
        .route("/robots.txt", get(sitemap::robots))
        .merge(members_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(build_page_router(state.clone()))
        // Session runs inside tenant resolution, so unknown hosts never get one
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_marketplace,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
