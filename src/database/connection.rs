//! SQLite connection pool management.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{RelayError, Result};

/// Open (or create) the database at the given path and run migrations.
///
/// Enables WAL journal mode and foreign keys, with a 5-second busy timeout
/// so concurrent worker writes queue instead of failing.
pub async fn open_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_url}?mode=rwc"))
        .map_err(|e| RelayError::Configuration(e.to_string()))?
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

    run_migrations(&pool).await?;

    info!(database = %database_url, "database opened");

    Ok(pool)
}

/// Open an in-memory database (for testing).
pub async fn open_pool_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| RelayError::Configuration(e.to_string()))?
        .foreign_keys(true);

    // A single connection: each in-memory connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(|e| RelayError::Database(e.to_string()))?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RelayError::Database(format!("migration failed: {e}")))?;
    Ok(())
}
