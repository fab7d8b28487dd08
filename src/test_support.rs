//! Shared test fixtures
//!
//! An in-memory SQLite database with migrations applied, helpers to seed
//! catalog rows, a mailer that records instead of sending, and the full
//! router wired over both.

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::db::repositories::{
    MarketplaceRepository, SessionRepository, SqlxMarketplaceRepository, SqlxSessionRepository,
    SqlxUserRepository, UserRepository,
};
use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{
    BlogPost, LotState, MarketCategory, MarketSubCategory, Marketplace, Session, SessionData, Shop, User,
};
use crate::services::{CaptchaChallenge, Mailer, OutboundEmail};
use crate::theme::ThemeEngine;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

pub struct Fixture {
    pub pool: DynDatabasePool,
    /// Minutes handed out so far; every product is newer than the last
    clock: AtomicI64,
}

impl Fixture {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Self {
            pool,
            clock: AtomicI64::new(0),
        }
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.as_sqlite().expect("fixtures run on SQLite")
    }

    fn tick(&self) -> DateTime<Utc> {
        let minutes = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    async fn insert<'q>(&self, query: Query<'q, Sqlite, SqliteArguments<'q>>) -> i64 {
        query
            .execute(self.sqlite())
            .await
            .expect("fixture insert failed")
            .last_insert_rowid()
    }

    /// Number of rows in `table`
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.sqlite())
            .await
            .expect("count rows")
    }

    pub async fn marketplace(&self, slug: &str) -> Marketplace {
        SqlxMarketplaceRepository::new(self.pool.clone())
            .create(&Marketplace {
                id: 0,
                slug: slug.to_string(),
                name: format!("{} market", slug),
                domain: format!("{}.test", slug),
                contact_email: format!("admin@{}.test", slug),
                template_prefix: "default".to_string(),
            })
            .await
            .expect("create marketplace")
    }

    pub async fn category(&self, marketplace_id: i64, slug: &str, name: &str) -> MarketCategory {
        let id = self
            .insert(
                sqlx::query("INSERT INTO market_categories (marketplace_id, slug, name) VALUES (?, ?, ?)")
                    .bind(marketplace_id)
                    .bind(slug)
                    .bind(name),
            )
            .await;
        MarketCategory {
            id,
            marketplace_id,
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }

    pub async fn subcategory(
        &self,
        marketplace_id: i64,
        parent_id: i64,
        slug: &str,
        name: &str,
    ) -> MarketSubCategory {
        let id = self
            .insert(
                sqlx::query(
                    "INSERT INTO market_subcategories (marketplace_id, parent_id, slug, name) VALUES (?, ?, ?, ?)",
                )
                .bind(marketplace_id)
                .bind(parent_id)
                .bind(slug)
                .bind(name),
            )
            .await;
        MarketSubCategory {
            id,
            marketplace_id,
            parent_id,
            slug: slug.to_string(),
            name: name.to_string(),
        }
    }

    pub async fn shop(&self, marketplace_id: i64, name: &str) -> Shop {
        let id = self
            .insert(
                sqlx::query("INSERT INTO shops (marketplace_id, name) VALUES (?, ?)")
                    .bind(marketplace_id)
                    .bind(name),
            )
            .await;
        Shop {
            id,
            marketplace_id,
            name: name.to_string(),
        }
    }

    async fn product(
        &self,
        shop_id: i64,
        category_id: i64,
        subcategory_id: Option<i64>,
        title: &str,
        summary: &str,
    ) -> i64 {
        let date_time = self.tick();
        self.insert(
            sqlx::query(
                "INSERT INTO products (shop_id, category_id, subcategory_id, title, summary, description, has_image, date_time) \
                 VALUES (?, ?, ?, ?, ?, '', FALSE, ?)",
            )
            .bind(shop_id)
            .bind(category_id)
            .bind(subcategory_id)
            .bind(title)
            .bind(summary)
            .bind(date_time),
        )
        .await
    }

    async fn make_item(&self, product_id: i64, price_cents: i64, qty: i64) {
        self.insert(
            sqlx::query("INSERT INTO items (product_id, price_cents, qty) VALUES (?, ?, ?)")
                .bind(product_id)
                .bind(price_cents)
                .bind(qty),
        )
        .await;
    }

    /// Fixed-price item whose summary is its title
    pub async fn item(
        &self,
        shop_id: i64,
        category_id: i64,
        subcategory_id: Option<i64>,
        title: &str,
        price_cents: i64,
        qty: i64,
    ) -> i64 {
        let id = self.product(shop_id, category_id, subcategory_id, title, title).await;
        self.make_item(id, price_cents, qty).await;
        id
    }

    pub async fn item_with_summary(&self, shop_id: i64, category_id: i64, title: &str, summary: &str) -> i64 {
        let id = self.product(shop_id, category_id, None, title, summary).await;
        self.make_item(id, 100, 1).await;
        id
    }

    pub async fn lot(
        &self,
        shop_id: i64,
        category_id: i64,
        title: &str,
        starting_bid_cents: i64,
        state: LotState,
    ) -> i64 {
        let id = self.product(shop_id, category_id, None, title, title).await;
        self.insert(
            sqlx::query("INSERT INTO lots (product_id, starting_bid_cents, state) VALUES (?, ?, ?)")
                .bind(id)
                .bind(starting_bid_cents)
                .bind(state.to_string()),
        )
        .await;
        id
    }

    /// Product row with neither an item nor a lot
    pub async fn bare_product(&self, shop_id: i64, category_id: i64, title: &str) -> i64 {
        self.product(shop_id, category_id, None, title, title).await
    }

    pub async fn bid(&self, lot_id: i64, amount_cents: i64) {
        self.insert(
            sqlx::query("INSERT INTO lot_bids (lot_id, amount_cents) VALUES (?, ?)")
                .bind(lot_id)
                .bind(amount_cents),
        )
        .await;
    }

    async fn image(&self, table: &str, owner_column: &str, product_id: i64, url: &str) {
        let sql = format!("INSERT INTO {} ({}, url, is_primary) VALUES (?, ?, FALSE)", table, owner_column);
        self.insert(sqlx::query(&sql).bind(product_id).bind(url)).await;
        self.insert(sqlx::query("UPDATE products SET has_image = TRUE WHERE id = ?").bind(product_id))
            .await;
    }

    pub async fn item_image(&self, product_id: i64, url: &str) {
        self.image("item_images", "item_id", product_id, url).await;
    }

    pub async fn lot_image(&self, product_id: i64, url: &str) {
        self.image("lot_images", "lot_id", product_id, url).await;
    }

    pub async fn transaction(&self, shop_id: i64, total_cents: i64) {
        self.insert(
            sqlx::query("INSERT INTO sell_transactions (shop_id, total_cents) VALUES (?, ?)")
                .bind(shop_id)
                .bind(total_cents),
        )
        .await;
    }

    pub async fn marketplace_pick(&self, marketplace_id: i64, product_id: i64, sort_order: i64) {
        self.insert(
            sqlx::query("INSERT INTO marketplace_picks (marketplace_id, product_id, sort_order) VALUES (?, ?, ?)")
                .bind(marketplace_id)
                .bind(product_id)
                .bind(sort_order),
        )
        .await;
    }

    pub async fn dealer_pick(&self, marketplace_id: i64, shop_id: i64, sort_order: i64) {
        self.insert(
            sqlx::query("INSERT INTO dealer_picks (marketplace_id, shop_id, sort_order) VALUES (?, ?, ?)")
                .bind(marketplace_id)
                .bind(shop_id)
                .bind(sort_order),
        )
        .await;
    }

    pub async fn user(&self, username: &str) -> User {
        SqlxUserRepository::new(self.pool.clone())
            .create(username, &format!("{}@example.com", username))
            .await
            .expect("create user")
    }

    pub async fn post(&self, marketplace_id: i64, slug: &str, title: &str, posted_on: DateTime<Utc>) -> BlogPost {
        let body = format!("Body of {}", title);
        let id = self
            .insert(
                sqlx::query(
                    "INSERT INTO blog_posts (marketplace_id, slug, title, body, posted_on) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(marketplace_id)
                .bind(slug)
                .bind(title)
                .bind(&body)
                .bind(posted_on),
            )
            .await;
        BlogPost {
            id,
            marketplace_id,
            slug: slug.to_string(),
            title: title.to_string(),
            body,
            posted_on,
        }
    }

    pub async fn post_pick(&self, marketplace_id: i64, post_id: i64, sort_order: i64) {
        self.insert(
            sqlx::query("INSERT INTO post_picks (marketplace_id, post_id, sort_order) VALUES (?, ?, ?)")
                .bind(marketplace_id)
                .bind(post_id)
                .bind(sort_order),
        )
        .await;
    }
}

/// Mailer keeping every message in memory
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailer whose every send fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("mailer lock").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        if self.fail {
            return Err(anyhow!("SMTP relay unavailable"));
        }
        self.sent.lock().expect("mailer lock").push(email.clone());
        Ok(())
    }
}

/// Answer to a captcha question
pub fn solve_captcha(challenge: &CaptchaChallenge) -> i64 {
    challenge
        .question
        .trim_end_matches('?')
        .split_whitespace()
        .filter_map(|word| word.parse::<i64>().ok())
        .sum()
}

/// Router over a fixture database, rendering the bundled default theme
pub struct TestApp {
    pub fx: Fixture,
    pub mailer: Arc<RecordingMailer>,
    pub state: AppState,
    router: Router,
}

/// Buffered response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION)
    }

    /// `session=<token>` from Set-Cookie, ready for a Cookie header
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| v.split(';').next().filter(|c| c.starts_with("session=")))
            .map(|c| c.to_string())
    }

    /// Byte offset of `needle` in the body; panics when absent
    pub fn position(&self, needle: &str) -> usize {
        self.body
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not found in body:\n{}", needle, self.body))
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        config.captcha.secret = Some("test-secret".to_string());
        config.theme.path = Path::new(env!("CARGO_MANIFEST_DIR")).join("themes");

        let fx = Fixture::new().await;
        let theme = ThemeEngine::from_config(&config.theme).expect("bundled themes load");
        let mailer = Arc::new(RecordingMailer::new());
        let state = AppState::new(config, fx.pool.clone(), mailer.clone(), theme).expect("app state");
        let router = build_router(state.clone());

        Self {
            fx,
            mailer,
            state,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");

        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    pub async fn get(&self, host: &str, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri).header(header::HOST, host);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(&self, host: &str, uri: &str, form: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, host)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", "203.0.113.9");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap()).await
    }

    /// Form POST from a client connected at `peer`, claiming `forwarded_for`
    pub async fn post_form_from(
        &self,
        host: &str,
        uri: &str,
        form: &str,
        peer: SocketAddr,
        forwarded_for: &str,
    ) -> TestResponse {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, host)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::from(form.to_string()))
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));
        self.send(request).await
    }

    /// Cookie of a stored session signed in as a new user
    pub async fn sign_in(&self, username: &str) -> (User, String) {
        let user = self.fx.user(username).await;
        let now = Utc::now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: Some(user.id),
            data: SessionData::default(),
            expires_at: now + Duration::days(1),
            created_at: now,
        };
        SqlxSessionRepository::new(self.fx.pool.clone())
            .create(&session)
            .await
            .expect("create session");
        (user, format!("session={}", session.id))
    }
}
