//! Database layer
//!
//! Supports SQLite (default, single-binary deployment) and MySQL. Repositories
//! write each query once and run it on whichever backend the pool wraps through
//! [`on_pool!`]; statements that differ per backend (inserts returning ids)
//! match on the driver explicitly.
//!
//! ```ignore
//! use marketfront::config::DatabaseConfig;
//! use marketfront::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Evaluate `$body` with `$conn` bound to the typed pool behind `$pool`.
///
/// The body is expanded once per backend, so it must only use sqlx APIs and
/// column types shared by SQLite and MySQL. Must be used inside a function
/// returning `anyhow::Result`.
macro_rules! on_pool {
    ($pool:expr, |$conn:ident| $body:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let $conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $body
            }
            $crate::config::DatabaseDriver::Mysql => {
                let $conn = $pool
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $body
            }
        }
    };
}

pub(crate) use on_pool;

/// Run an INSERT on either backend and return the generated row id.
///
/// `$query` is expanded once per backend, so pass the `sqlx::query(..)`
/// builder expression itself; a query bound to a variable is typed for
/// SQLite only.
macro_rules! insert_returning_id {
    ($pool:expr, $query:expr) => {
        match $pool.driver() {
            $crate::config::DatabaseDriver::Sqlite => {
                let conn = $pool
                    .as_sqlite()
                    .ok_or_else(|| ::anyhow::anyhow!("SQLite pool unavailable"))?;
                $query.execute(conn).await?.last_insert_rowid()
            }
            $crate::config::DatabaseDriver::Mysql => {
                let conn = $pool
                    .as_mysql()
                    .ok_or_else(|| ::anyhow::anyhow!("MySQL pool unavailable"))?;
                $query.execute(conn).await?.last_insert_id() as i64
            }
        }
    };
}

pub(crate) use insert_returning_id;
