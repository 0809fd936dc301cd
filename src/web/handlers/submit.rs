//! Submission handler: accepts a wrapped request and persists it.

use std::collections::BTreeMap;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::encode_header_map;
use crate::models::Activity;
use crate::state_machine::ActivityState;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::AppState;

/// Routing headers consumed by the proxy and stripped before forwarding.
pub const URL_HEADER: &str = "X-Url";
pub const REPLY_HEADER: &str = "X-Reply";
pub const REPLY_METHOD_HEADER: &str = "X-ReplyMethod";

/// Header on the 202 acknowledgement carrying the new activity id.
pub const ACTIVITY_HEADER: &str = "X-Activity";

/// Bodies are buffered whole and bounded by store row size.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Accept a wrapped request on any method.
///
/// The incoming method, non-routing headers, body, and content type are
/// persisted verbatim and later replayed against the target URL. The call
/// is acknowledged as soon as the row is durable.
pub async fn submit(State(state): State<AppState>, request: Request) -> ApiResult<Response> {
    let (parts, body) = request.into_parts();

    let url = header_string(&parts.headers, URL_HEADER);
    let reply_url = header_string(&parts.headers, REPLY_HEADER);
    let reply_method = header_string(&parts.headers, REPLY_METHOD_HEADER);

    let (url, reply_url, reply_method) = match (url, reply_url, reply_method) {
        (Some(url), Some(reply_url), Some(reply_method)) => (url, reply_url, reply_method),
        (url, reply_url, reply_method) => {
            let mut missing = Vec::new();
            if url.is_none() {
                missing.push(URL_HEADER);
            }
            if reply_url.is_none() {
                missing.push(REPLY_HEADER);
            }
            if reply_method.is_none() {
                missing.push(REPLY_METHOD_HEADER);
            }
            return Err(ApiError::MissingHeaders(missing.join(", ")));
        }
    };

    let payload = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {e}")))?;

    let content_type = header_string(&parts.headers, "content-type").unwrap_or_default();
    let headers = encode_header_map(&collect_forwarded_headers(&parts.headers))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let activity = Activity {
        id: Uuid::now_v7().to_string(),
        url,
        method: parts.method.as_str().to_string(),
        reply_url,
        reply_method,
        state: ActivityState::Created.to_string(),
        node_id: state.config.node_id.clone(),
        created_at: Utc::now().timestamp(),
        headers,
        payload: payload.to_vec(),
        content_type,
    };

    Activity::insert(&state.pool, &activity).await?;

    info!(
        activity_id = %activity.id,
        method = %activity.method,
        url = %activity.url,
        "activity accepted"
    );

    let mut response = StatusCode::ACCEPTED.into_response();
    response.headers_mut().insert(
        HeaderName::from_static("x-activity"),
        HeaderValue::from_str(&activity.id).map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    Ok(response)
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Everything except the routing headers, as the stored string map.
fn collect_forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let routing = [URL_HEADER, REPLY_HEADER, REPLY_METHOD_HEADER];

    let mut map = BTreeMap::new();
    for (name, value) in headers {
        if routing.iter().any(|r| r.eq_ignore_ascii_case(name.as_str())) {
            continue;
        }
        match value.to_str() {
            Ok(value) => {
                map.insert(name.as_str().to_string(), value.to_string());
            }
            Err(_) => {
                warn!(header = %name, "dropping header with non-UTF-8 value");
            }
        }
    }
    map
}
