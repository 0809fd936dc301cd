pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod models;
pub mod state_machine;
pub mod web;
pub mod workers;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
