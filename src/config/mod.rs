//! Configuration management
//!
//! Configuration is loaded from `config.yml` and then overridden by
//! `MARKETFRONT_*` environment variables. Missing optional values are
//! filled with defaults, so an absent or empty file yields a runnable setup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub theme: ThemeConfig,
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub contact: ContactConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheme used when building absolute URLs (sitemaps)
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`. Only enable
    /// behind a reverse proxy that overwrites these headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_scheme: default_public_scheme(),
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_scheme() -> String {
    "http".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/marketfront.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Process cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default entry TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Theme configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Directory holding one sub-directory per template prefix
    #[serde(default = "default_theme_path")]
    pub path: PathBuf,
    /// Prefix used when a marketplace theme lacks a template
    #[serde(default = "default_prefix")]
    pub default_prefix: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            path: default_theme_path(),
            default_prefix: default_prefix(),
        }
    }
}

fn default_theme_path() -> PathBuf {
    PathBuf::from("themes")
}

fn default_prefix() -> String {
    "default".to_string()
}

/// Marketplace (tenant) resolution and catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceConfig {
    /// Marketplace used when the request host matches no marketplace domain
    #[serde(default)]
    pub default_slug: Option<String>,
    /// Category slug whose search page also lists the category's dealers
    #[serde(default = "default_promo_category_slug")]
    pub promo_category_slug: String,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            default_slug: None,
            promo_category_slug: default_promo_category_slug(),
        }
    }
}

fn default_promo_category_slug() -> String {
    "small-cents".to_string()
}

/// Staff member receiving contact form mail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffContact {
    pub name: String,
    pub email: String,
}

/// Outbound mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host; mail is only logged when unset
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    /// Sender address for every outgoing message
    #[serde(default = "default_mail_from")]
    pub from: String,
    /// Platform staff copied on every contact form message
    #[serde(default)]
    pub staff: Vec<StaffContact>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from: default_mail_from(),
            staff: Vec::new(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "no-reply@localhost".to_string()
}

/// How the abuse guard treats the stored timestamp of an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AbusePolicy {
    /// Existing records keep their first-offense timestamp
    #[default]
    Literal,
    /// Existing records are re-stamped after the cooldown comparison
    Refresh,
}

/// Contact form settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactConfig {
    /// Minimum age of an abuse record before another alert is sent
    #[serde(default = "default_abuse_cooldown_secs")]
    pub abuse_cooldown_secs: i64,
    #[serde(default)]
    pub abuse_policy: AbusePolicy,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            abuse_cooldown_secs: default_abuse_cooldown_secs(),
            abuse_policy: AbusePolicy::default(),
        }
    }
}

fn default_abuse_cooldown_secs() -> i64 {
    120
}

/// Captcha signing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// HMAC secret; a random one is generated per process when unset
    #[serde(default)]
    pub secret: Option<String>,
    /// Lifetime of an issued challenge
    #[serde(default = "default_captcha_ttl")]
    pub ttl_seconds: i64,
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            ttl_seconds: default_captcha_ttl(),
        }
    }
}

fn default_captcha_ttl() -> i64 {
    1800
}

/// External authentication gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Where anonymous visitors are sent for login-only pages
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
        }
    }
}

fn default_login_url() -> String {
    "/login".to_string()
}

/// Visitor session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_days")]
    pub ttl_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_session_ttl_days(),
        }
    }
}

fn default_session_ttl_days() -> i64 {
    14
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid value for {field}: {value} (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        expected: &'static str,
    },
}

/// Longest accepted captcha lifetime (one day)
pub const MAX_CAPTCHA_TTL_SECS: i64 = 86_400;
/// Longest accepted abuse alert cooldown (30 days)
pub const MAX_ABUSE_COOLDOWN_SECS: i64 = 30 * 86_400;
/// Longest accepted session lifetime (10 years)
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

fn check_range(
    field: &'static str,
    value: i64,
    range: std::ops::RangeInclusive<i64>,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value, expected })
    }
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults; invalid YAML is an error.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject durations the services cannot represent
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "captcha.ttl_seconds",
            self.captcha.ttl_seconds,
            1..=MAX_CAPTCHA_TTL_SECS,
            "1 to 86400",
        )?;
        check_range(
            "contact.abuse_cooldown_secs",
            self.contact.abuse_cooldown_secs,
            0..=MAX_ABUSE_COOLDOWN_SECS,
            "0 to 2592000",
        )?;
        check_range(
            "session.ttl_days",
            self.session.ttl_days,
            1..=MAX_SESSION_TTL_DAYS,
            "1 to 3650",
        )
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - MARKETFRONT_SERVER_HOST / MARKETFRONT_SERVER_PORT
    /// - MARKETFRONT_DATABASE_DRIVER / MARKETFRONT_DATABASE_URL
    /// - MARKETFRONT_THEME_PATH
    /// - MARKETFRONT_DEFAULT_MARKETPLACE
    /// - MARKETFRONT_SMTP_HOST / MARKETFRONT_SMTP_USERNAME / MARKETFRONT_SMTP_PASSWORD
    /// - MARKETFRONT_CAPTCHA_SECRET
    /// - MARKETFRONT_TRUST_PROXY_HEADERS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MARKETFRONT_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MARKETFRONT_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("MARKETFRONT_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("MARKETFRONT_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("MARKETFRONT_THEME_PATH") {
            self.theme.path = PathBuf::from(path);
        }
        if let Ok(slug) = std::env::var("MARKETFRONT_DEFAULT_MARKETPLACE") {
            self.marketplace.default_slug = Some(slug);
        }

        if let Ok(host) = std::env::var("MARKETFRONT_SMTP_HOST") {
            self.mail.smtp_host = Some(host);
        }
        if let Ok(username) = std::env::var("MARKETFRONT_SMTP_USERNAME") {
            self.mail.smtp_username = Some(username);
        }
        if let Ok(password) = std::env::var("MARKETFRONT_SMTP_PASSWORD") {
            self.mail.smtp_password = Some(password);
        }

        if let Ok(secret) = std::env::var("MARKETFRONT_CAPTCHA_SECRET") {
            self.captcha.secret = Some(secret);
        }
        if let Ok(trust) = std::env::var("MARKETFRONT_TRUST_PROXY_HEADERS") {
            self.server.trust_proxy_headers = matches!(trust.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
