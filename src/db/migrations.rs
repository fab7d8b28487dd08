//! Database migrations
//!
//! Migrations are embedded as SQL strings (one flavour per backend) and tracked
//! in the `_migrations` table, so a fresh binary can bootstrap its own schema.
//!
//! ```ignore
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::Row;

use super::{on_pool, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, applied in ascending order)
    pub version: i64,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_marketplaces_users_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS marketplaces (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                domain VARCHAR(255) NOT NULL DEFAULT '',
                contact_email VARCHAR(255) NOT NULL,
                template_prefix VARCHAR(100) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_marketplaces_domain ON marketplaces(domain);
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(100) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NULL REFERENCES users(id) ON DELETE SET NULL,
                data TEXT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS marketplaces (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                domain VARCHAR(255) NOT NULL DEFAULT '',
                contact_email VARCHAR(255) NOT NULL,
                template_prefix VARCHAR(100) NOT NULL
            );
            CREATE INDEX idx_marketplaces_domain ON marketplaces(domain);
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(100) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NULL,
                data TEXT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 2,
        name: "create_catalog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS market_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                slug VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                UNIQUE (marketplace_id, slug)
            );
            CREATE TABLE IF NOT EXISTS market_subcategories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                parent_id INTEGER NOT NULL REFERENCES market_categories(id) ON DELETE CASCADE,
                slug VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                UNIQUE (parent_id, slug)
            );
            CREATE TABLE IF NOT EXISTS shops (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                name VARCHAR(255) NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_shops_marketplace ON shops(marketplace_id);
            CREATE TABLE IF NOT EXISTS sell_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
                total_cents INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_sell_transactions_shop ON sell_transactions(shop_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS market_categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                slug VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                UNIQUE KEY uq_category_slug (marketplace_id, slug),
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS market_subcategories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                parent_id BIGINT NOT NULL,
                slug VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                UNIQUE KEY uq_subcategory_slug (parent_id, slug),
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE,
                FOREIGN KEY (parent_id) REFERENCES market_categories(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS shops (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                name VARCHAR(255) NOT NULL,
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS sell_transactions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                shop_id BIGINT NOT NULL,
                total_cents BIGINT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (shop_id) REFERENCES shops(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_products",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES market_categories(id),
                subcategory_id INTEGER NULL REFERENCES market_subcategories(id),
                title VARCHAR(255) NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                has_image BOOLEAN NOT NULL DEFAULT 0,
                date_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_products_shop ON products(shop_id);
            CREATE INDEX IF NOT EXISTS idx_products_date_time ON products(date_time);
            CREATE TABLE IF NOT EXISTS items (
                product_id INTEGER PRIMARY KEY REFERENCES products(id) ON DELETE CASCADE,
                price_cents INTEGER NOT NULL,
                qty INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS item_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL REFERENCES items(product_id) ON DELETE CASCADE,
                url VARCHAR(500) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS lots (
                product_id INTEGER PRIMARY KEY REFERENCES products(id) ON DELETE CASCADE,
                starting_bid_cents INTEGER NOT NULL,
                state VARCHAR(20) NOT NULL DEFAULT 'active'
            );
            CREATE TABLE IF NOT EXISTS lot_bids (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lot_id INTEGER NOT NULL REFERENCES lots(product_id) ON DELETE CASCADE,
                amount_cents INTEGER NOT NULL,
                bid_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_lot_bids_lot ON lot_bids(lot_id);
            CREATE TABLE IF NOT EXISTS lot_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lot_id INTEGER NOT NULL REFERENCES lots(product_id) ON DELETE CASCADE,
                url VARCHAR(500) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT 0
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS products (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                shop_id BIGINT NOT NULL,
                category_id BIGINT NOT NULL,
                subcategory_id BIGINT NULL,
                title VARCHAR(255) NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                has_image BOOLEAN NOT NULL DEFAULT FALSE,
                date_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (shop_id) REFERENCES shops(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES market_categories(id),
                FOREIGN KEY (subcategory_id) REFERENCES market_subcategories(id)
            );
            CREATE INDEX idx_products_date_time ON products(date_time);
            CREATE TABLE IF NOT EXISTS items (
                product_id BIGINT PRIMARY KEY,
                price_cents BIGINT NOT NULL,
                qty BIGINT NOT NULL DEFAULT 0,
                FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS item_images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                item_id BIGINT NOT NULL,
                url VARCHAR(500) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY (item_id) REFERENCES items(product_id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS lots (
                product_id BIGINT PRIMARY KEY,
                starting_bid_cents BIGINT NOT NULL,
                state VARCHAR(20) NOT NULL DEFAULT 'active',
                FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS lot_bids (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                lot_id BIGINT NOT NULL,
                amount_cents BIGINT NOT NULL,
                bid_time TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (lot_id) REFERENCES lots(product_id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS lot_images (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                lot_id BIGINT NOT NULL,
                url VARCHAR(500) NOT NULL,
                is_primary BOOLEAN NOT NULL DEFAULT FALSE,
                FOREIGN KEY (lot_id) REFERENCES lots(product_id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_picks",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS marketplace_picks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS dealer_picks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                shop_id INTEGER NOT NULL REFERENCES shops(id) ON DELETE CASCADE,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS marketplace_picks (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                product_id BIGINT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE,
                FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS dealer_picks (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                shop_id BIGINT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE,
                FOREIGN KEY (shop_id) REFERENCES shops(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_blog",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                slug VARCHAR(200) NOT NULL,
                title VARCHAR(255) NOT NULL,
                body TEXT NOT NULL,
                posted_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (marketplace_id, slug)
            );
            CREATE TABLE IF NOT EXISTS post_comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                comment TEXT NOT NULL,
                commented_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_post_comments_post ON post_comments(post_id);
            CREATE TABLE IF NOT EXISTS post_picks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                post_id INTEGER NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
                sort_order INTEGER NOT NULL DEFAULT 0
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                slug VARCHAR(200) NOT NULL,
                title VARCHAR(255) NOT NULL,
                body TEXT NOT NULL,
                posted_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE KEY uq_blog_post_slug (marketplace_id, slug),
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS post_comments (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                post_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                comment TEXT NOT NULL,
                commented_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS post_picks (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                post_id BIGINT NOT NULL,
                sort_order INT NOT NULL DEFAULT 0,
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE,
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_mailing_list_and_contact_info",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS mailing_list_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                email VARCHAR(255) NOT NULL,
                UNIQUE (marketplace_id, email)
            );
            CREATE TABLE IF NOT EXISTS contact_form_infos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                marketplace_id INTEGER NOT NULL REFERENCES marketplaces(id) ON DELETE CASCADE,
                email VARCHAR(255) NOT NULL,
                ip VARCHAR(64) NOT NULL,
                datetime TIMESTAMP NOT NULL,
                UNIQUE (marketplace_id, email, ip)
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS mailing_list_members (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                email VARCHAR(255) NOT NULL,
                UNIQUE KEY uq_mailing_list_email (marketplace_id, email),
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS contact_form_infos (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                marketplace_id BIGINT NOT NULL,
                email VARCHAR(255) NOT NULL,
                ip VARCHAR(64) NOT NULL,
                datetime TIMESTAMP NOT NULL,
                UNIQUE KEY uq_contact_form_info (marketplace_id, email, ip),
                FOREIGN KEY (marketplace_id) REFERENCES marketplaces(id) ON DELETE CASCADE
            );
        "#,
    },
];

/// Run all pending migrations and return how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i64>> {
    on_pool!(pool, |conn| {
        let rows = sqlx::query("SELECT version FROM _migrations ORDER BY version")
            .fetch_all(conn)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("version").map_err(Into::into))
            .collect()
    })
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => migration.up_sqlite,
        DatabaseDriver::Mysql => migration.up_mysql,
    };

    for statement in split_sql_statements(sql) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    on_pool!(pool, |conn| {
        sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(conn)
            .await?;
    });

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Total number of embedded migrations
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}
