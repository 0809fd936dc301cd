use std::fmt;

/// Core error taxonomy for the relay.
///
/// Transport failures are expected outcomes of outbound calls and drive
/// state transitions rather than propagating; they only appear here so the
/// dispatch helpers can use `?` like everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayError {
    Database(String),
    Conflict(String),
    NotFound(String),
    Serialization(String),
    Transport(String),
    InvalidState(String),
    Configuration(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Database(msg) => write!(f, "Database error: {msg}"),
            RelayError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            RelayError::NotFound(msg) => write!(f, "Not found: {msg}"),
            RelayError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            RelayError::Transport(msg) => write!(f, "Transport error: {msg}"),
            RelayError::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            RelayError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<sqlx::Error> for RelayError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => RelayError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RelayError::Conflict(db.to_string())
            }
            _ => RelayError::Database(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        RelayError::Serialization(error.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        RelayError::Transport(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
