use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::RelayConfig;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Arc<RelayConfig>) -> Self {
        Self { pool, config }
    }
}
