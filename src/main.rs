//! Marketfront - storefront for multi-tenant online marketplaces

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketfront::{
    api::{self, AppState},
    config::Config,
    db,
    services::create_mailer,
    theme::ThemeEngine,
};

/// How often expired sessions are removed
const SESSION_CLEANUP_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketfront=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting marketfront...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Initialize theme engine
    let theme_engine = ThemeEngine::from_config(&config.theme)?;
    tracing::info!("Theme engine initialized: default prefix {}", config.theme.default_prefix);

    let mailer = create_mailer(&config.mail)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, pool, mailer, theme_engine)?;

    // Expired session cleanup
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(SESSION_CLEANUP_SECS));
            loop {
                interval.tick().await;
                if let Err(e) = sessions.cleanup_expired().await {
                    tracing::warn!("Session cleanup failed: {}", e);
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
