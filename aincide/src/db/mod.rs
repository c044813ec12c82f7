//! Database layer for the usage snapshot store.
//!
//! The store is a SQLite database accessed through SQLx. The pool is opened by
//! [`crate::Application`] at startup, passed to handlers through [`crate::AppState`] and closed
//! on shutdown. Migrations live in `migrations/` and run via [`crate::migrator`].
//!
//! # Modules
//!
//! - [`handlers`]: repositories holding the queries
//! - [`models`]: row and domain types
//! - [`errors`]: database-specific error types

pub mod errors;
pub mod handlers;
pub mod models;

use crate::config::DatabaseConfig;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Open the snapshot store, creating the database file if it does not exist.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let settings = &config.pool;
    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));

    if settings.idle_timeout_secs > 0 {
        pool_options = pool_options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        pool_options = pool_options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }

    Ok(pool_options.connect_with(options).await?)
}
