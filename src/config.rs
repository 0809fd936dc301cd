//! Process-wide configuration.
//!
//! Read once at startup from the environment, with defaults suitable for
//! local development. Every instance of the process carries a stable
//! `node_id` which is written into leased activity rows for observability.

use std::time::Duration;

use crate::error::{RelayError, Result};

/// Configuration for a relay instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Stable identifier for this instance, recorded on leased rows.
    pub node_id: String,
    /// SQLite database path or URL.
    pub database_url: String,
    /// Port the HTTP listener binds to.
    pub listen_port: u16,
    /// Target/reply statuses treated as success.
    pub allowed_response_codes: Vec<u16>,
    /// Seconds a COMPLETED activity is retained before cleanup.
    pub retention_period_secs: i64,
    /// Timeout applied to every outbound HTTP call.
    pub request_timeout_secs: u64,
    /// Send worker tick period in milliseconds.
    pub send_tick_ms: u64,
    /// Requeue worker tick period in milliseconds.
    pub requeue_tick_ms: u64,
    /// Retry-reply worker tick period in milliseconds.
    pub retry_reply_tick_ms: u64,
    /// Cleanup worker tick period in milliseconds.
    pub cleanup_tick_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            node_id: format!("relay-{}", std::process::id()),
            database_url: "relay.db".to_string(),
            listen_port: 9090,
            allowed_response_codes: vec![200, 201, 202],
            retention_period_secs: 86400,
            request_timeout_secs: 30,
            send_tick_ms: 500,
            requeue_tick_ms: 5000,
            retry_reply_tick_ms: 5000,
            cleanup_tick_ms: 10000,
        }
    }
}

impl RelayConfig {
    /// Load configuration from the environment over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(node_id) = std::env::var("RELAY_NODE_ID") {
            config.node_id = node_id;
        }
        if let Ok(url) = std::env::var("RELAY_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(port) = std::env::var("RELAY_LISTEN_PORT") {
            config.listen_port = parse_var("RELAY_LISTEN_PORT", &port)?;
        }
        if let Ok(codes) = std::env::var("RELAY_ALLOWED_RESPONSE_CODES") {
            config.allowed_response_codes = codes
                .split(',')
                .map(|c| parse_var("RELAY_ALLOWED_RESPONSE_CODES", c.trim()))
                .collect::<Result<Vec<u16>>>()?;
        }
        if let Ok(secs) = std::env::var("RELAY_RETENTION_PERIOD_SECS") {
            config.retention_period_secs = parse_var("RELAY_RETENTION_PERIOD_SECS", &secs)?;
        }
        if let Ok(secs) = std::env::var("RELAY_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("RELAY_REQUEST_TIMEOUT_SECS", &secs)?;
        }
        if let Ok(ms) = std::env::var("RELAY_SEND_TICK_MS") {
            config.send_tick_ms = parse_var("RELAY_SEND_TICK_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("RELAY_REQUEUE_TICK_MS") {
            config.requeue_tick_ms = parse_var("RELAY_REQUEUE_TICK_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("RELAY_RETRY_REPLY_TICK_MS") {
            config.retry_reply_tick_ms = parse_var("RELAY_RETRY_REPLY_TICK_MS", &ms)?;
        }
        if let Ok(ms) = std::env::var("RELAY_CLEANUP_TICK_MS") {
            config.cleanup_tick_ms = parse_var("RELAY_CLEANUP_TICK_MS", &ms)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the workers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(RelayError::Configuration("node_id must not be empty".to_string()));
        }
        if self.allowed_response_codes.is_empty() {
            return Err(RelayError::Configuration(
                "allowed_response_codes must not be empty".to_string(),
            ));
        }
        if self.retention_period_secs < 0 {
            return Err(RelayError::Configuration(
                "retention_period_secs must not be negative".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RelayError::Configuration(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("send_tick_ms", self.send_tick_ms),
            ("requeue_tick_ms", self.requeue_tick_ms),
            ("retry_reply_tick_ms", self.retry_reply_tick_ms),
            ("cleanup_tick_ms", self.cleanup_tick_ms),
        ] {
            if value == 0 {
                return Err(RelayError::Configuration(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn is_allowed_status(&self, status: u16) -> bool {
        self.allowed_response_codes.contains(&status)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| RelayError::Configuration(format!("invalid value for {name}: '{value}'")))
}
