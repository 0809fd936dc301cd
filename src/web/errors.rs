//! Web API error types and their HTTP conversions.
//!
//! Every error response carries `{message, reference}`; the reference is a
//! fresh UUID that is also emitted to the log, so an operator can correlate
//! a caller's report with the server side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::error::RelayError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing required headers: {0}")]
    MissingHeaders(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("activity not found")]
    NotFound,

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let reference = Uuid::new_v4();

        let (status, message) = match &self {
            ApiError::MissingHeaders(missing) => (
                StatusCode::BAD_REQUEST,
                format!("missing required headers: {missing}"),
            ),
            ApiError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, format!("invalid request: {reason}"))
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "activity not found".to_string()),
            // Internal details go to the log, not the caller.
            ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        error!(reference = %reference, error = %self, "request failed");

        let body = json!({
            "message": message,
            "reference": reference.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
