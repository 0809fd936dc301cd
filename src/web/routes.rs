//! HTTP route definitions.

use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::web::handlers;
use crate::web::state::AppState;

/// Assemble the public router.
///
/// `/submit` accepts any method; the incoming method is part of the
/// submission and forwarded to the target verbatim.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submit", any(handlers::submit::submit))
        .route("/message", get(handlers::status::message_status))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
