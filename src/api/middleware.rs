//! Storefront middleware
//!
//! Contains middleware for:
//! - Tenant resolution (Host header to marketplace)
//! - Visitor sessions (cookie to session row, saved after the handler)
//! - Login gate for pages that need a signed-in reader
//!
//! plus the shared application state and the error type every handler
//! returns.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use crate::cache::{create_cache, Cache};
use crate::config::Config;
use crate::db::repositories::{
    SqlxBlogRepository, SqlxCatalogRepository, SqlxContactFormInfoRepository,
    SqlxMailingListRepository, SqlxMarketplaceRepository, SqlxProductIndex, SqlxProductRepository,
    SqlxSessionRepository, SqlxShopRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Flash, Marketplace, Session, User};
use crate::services::{
    AbuseGuard, BlogService, CaptchaService, ContactService, Mailer, MarketplaceResolver,
    NewsletterService, ProductService, SearchError, SearchService, SessionService,
};
use crate::theme::ThemeEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub marketplaces: Arc<MarketplaceResolver>,
    pub sessions: Arc<SessionService>,
    pub search: Arc<SearchService>,
    pub products: Arc<ProductService>,
    pub blog: Arc<BlogService>,
    pub newsletter: Arc<NewsletterService>,
    pub contact: Arc<ContactService>,
    pub theme: Arc<ThemeEngine>,
    pub cache: Arc<Cache>,
}

impl AppState {
    /// Wire repositories and services over one database pool
    pub fn new(
        config: Config,
        pool: DynDatabasePool,
        mailer: Arc<dyn Mailer>,
        theme: ThemeEngine,
    ) -> anyhow::Result<Self> {
        let catalog = SqlxCatalogRepository::boxed(pool.clone());

        let captcha = Arc::new(CaptchaService::new(&config.captcha)?);
        let guard = AbuseGuard::new(
            SqlxContactFormInfoRepository::boxed(pool.clone()),
            mailer.clone(),
            &config.contact,
        );

        Ok(Self {
            marketplaces: Arc::new(MarketplaceResolver::new(
                SqlxMarketplaceRepository::boxed(pool.clone()),
                config.marketplace.default_slug.clone(),
            )),
            sessions: Arc::new(SessionService::new(
                SqlxSessionRepository::boxed(pool.clone()),
                SqlxUserRepository::boxed(pool.clone()),
                config.session.ttl_days,
            )),
            search: Arc::new(SearchService::new(
                catalog.clone(),
                SqlxProductIndex::boxed(pool.clone()),
                config.marketplace.promo_category_slug.clone(),
            )),
            products: Arc::new(ProductService::new(
                SqlxProductRepository::boxed(pool.clone()),
                SqlxShopRepository::boxed(pool.clone()),
                catalog,
            )),
            blog: Arc::new(BlogService::new(SqlxBlogRepository::boxed(pool.clone()))),
            newsletter: Arc::new(NewsletterService::new(SqlxMailingListRepository::boxed(pool))),
            contact: Arc::new(ContactService::new(
                captcha,
                guard,
                mailer,
                config.mail.staff.clone(),
            )),
            theme: Arc::new(theme),
            cache: create_cache(&config.cache),
            config: Arc::new(config),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by page handlers
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ViewError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<SearchError> for ViewError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Internal(e) => ViewError::Internal(e),
            other => ViewError::NotFound(other.to_string()),
        }
    }
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        match self {
            ViewError::NotFound(what) => {
                tracing::debug!("Not found: {}", what);
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            ViewError::Forbidden => (StatusCode::FORBIDDEN, "403").into_response(),
            ViewError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

// ============================================================================
// Tenant resolution
// ============================================================================

/// Resolve the marketplace the request is addressed to.
///
/// Requests for hosts without a marketplace get a 404.
pub async fn resolve_marketplace(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ViewError> {
    let host = request_host(request.headers());
    let marketplace = state
        .marketplaces
        .resolve(host.as_deref())
        .await?
        .ok_or_else(|| ViewError::not_found(format!("marketplace for host {:?}", host)))?;

    request.extensions_mut().insert(marketplace);
    Ok(next.run(request).await)
}

fn request_host(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|h| h.to_string())
}

// ============================================================================
// Sessions
// ============================================================================

struct SessionState {
    session: Session,
    is_new: bool,
    dirty: bool,
}

/// Request-scoped handle on the visitor's session.
///
/// Changes are written back once the handler has produced its response.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionHandle {
    fn new(session: Session, is_new: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                session,
                is_new,
                dirty: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> String {
        self.lock().session.id.clone()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.lock().session.user_id
    }

    pub fn sort_mode(&self) -> Option<String> {
        self.lock().session.data.sort_mode.clone()
    }

    pub fn set_sort_mode(&self, mode: impl Into<String>) {
        let mut state = self.lock();
        state.session.data.sort_mode = Some(mode.into());
        state.dirty = true;
    }

    pub fn view_mode(&self) -> Option<String> {
        self.lock().session.data.view_mode.clone()
    }

    pub fn set_view_mode(&self, mode: impl Into<String>) {
        let mut state = self.lock();
        state.session.data.view_mode = Some(mode.into());
        state.dirty = true;
    }

    pub fn has_flash(&self) -> bool {
        self.lock().session.data.flash.is_some()
    }

    pub fn set_flash(&self, flash: Flash) {
        let mut state = self.lock();
        state.session.data.flash = Some(flash);
        state.dirty = true;
    }

    /// Remove and return the pending flash message
    pub fn take_flash(&self) -> Option<Flash> {
        let mut state = self.lock();
        let flash = state.session.data.flash.take();
        if flash.is_some() {
            state.dirty = true;
        }
        flash
    }

    /// Session to store after the request, and whether it is new
    fn pending_save(&self) -> Option<(Session, bool)> {
        let state = self.lock();
        state.dirty.then(|| (state.session.clone(), state.is_new))
    }
}

/// Signed-in user attached to the request by the session middleware
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

/// Extract the session token from the `session` cookie
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_str
        .split(';')
        .filter_map(|cookie| cookie.trim().strip_prefix("session="))
        .find(|token| !token.is_empty())
        .map(|token| token.to_string())
}

/// Session middleware.
///
/// Loads the visitor's session (or starts an unsaved one), exposes it to the
/// handler and stores it afterwards when the handler changed anything. New
/// sessions get their cookie only once they are stored.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ViewError> {
    let now = Utc::now();
    let existing = match extract_session_token(request.headers()) {
        Some(token) => state.sessions.load(&token).await?,
        None => None,
    };
    let handle = match existing {
        Some(session) => SessionHandle::new(session, false),
        None => SessionHandle::new(state.sessions.start(now), true),
    };

    let user = {
        let session = handle.lock().session.clone();
        state.sessions.user(&session).await?
    };

    request.extensions_mut().insert(handle.clone());
    request.extensions_mut().insert(CurrentUser(user));

    let mut response = next.run(request).await;

    if let Some((session, is_new)) = handle.pending_save() {
        state.sessions.save(&session, is_new, now).await?;
        if is_new {
            let cookie = format!(
                "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
                session.id,
                state.sessions.ttl().num_seconds()
            );
            let value = HeaderValue::from_str(&cookie).map_err(anyhow::Error::from)?;
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

// ============================================================================
// Authentication gate
// ============================================================================

/// Redirect anonymous visitors to the login page, remembering where they were
pub async fn require_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let signed_in = request
        .extensions()
        .get::<CurrentUser>()
        .map_or(false, |user| user.0.is_some());

    if signed_in {
        return next.run(request).await;
    }

    let next_path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let location = format!(
        "{}?next={}",
        state.config.auth.login_url,
        urlencoding::encode(&next_path)
    );
    Redirect::to(&location).into_response()
}

// ============================================================================
// Request context
// ============================================================================

/// Everything a page handler needs to know about the current request
#[derive(Clone)]
pub struct RequestContext {
    pub marketplace: Marketplace,
    pub session: SessionHandle,
    pub user: Option<User>,
    pub remote_ip: String,
    /// Host header as sent, port included
    pub host: String,
    pub path: String,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ViewError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let marketplace = parts
            .extensions
            .get::<Marketplace>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("marketplace middleware not installed"))?;
        let session = parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("session middleware not installed"))?;
        let user = parts.extensions.get::<CurrentUser>().and_then(|u| u.0.clone());

        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        let remote_ip = client_ip(&parts.headers, peer, state.config.server.trust_proxy_headers);

        Ok(Self {
            marketplace,
            session,
            user,
            remote_ip,
            host: request_host(&parts.headers).unwrap_or_else(|| "localhost".to_string()),
            path: parts.uri.path().to_string(),
        })
    }
}

/// Address of the client: the socket peer, or the proxy headers when the
/// deployment trusts them. "unknown" when neither is available.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> String {
    trust_proxy_headers
        .then(|| extract_ip_address(headers))
        .flatten()
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Client IP from proxy headers: X-Forwarded-For, then X-Real-IP
fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| ip.to_string())
}

// ============================================================================
// HTTP Cache Headers
// ============================================================================

/// Build Cache-Control header for pages shared by every anonymous visitor
pub fn cache_control_public(max_age: u32) -> String {
    format!("public, max-age={}", max_age)
}

// ============================================================================
// Tests
// ============================================================================
