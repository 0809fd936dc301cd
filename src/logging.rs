//! Structured logging initialization.
//!
//! Console output with an environment-driven filter. Safe to call more than
//! once; only the first call installs the subscriber.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber.
///
/// The filter is taken from `RELAY_LOG`, falling back to `RUST_LOG`, falling
/// back to `info`.
pub fn init() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = std::env::var("RELAY_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let result = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_target(true)
            .try_init();

        if result.is_err() {
            tracing::debug!("global tracing subscriber already installed");
        }
    });
}
