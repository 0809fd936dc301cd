//! Outbound HTTP dispatch.
//!
//! Rebuilds real HTTP requests from persisted activity and response rows and
//! issues them with a bounded timeout. Header maps are stored as UTF-8 JSON
//! objects with string values; the codec here is the single place that
//! format is read or written.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::warn;

use crate::error::{RelayError, Result};
use crate::models::{Activity, ResponseRecord};

/// Header carrying the activity id on reply deliveries.
pub const TASK_ID_HEADER: &str = "X-TaskId";

/// Hop-by-hop and length headers are owned by the HTTP client on each hop
/// and must not be replayed from storage. Content type rides in its own
/// column and is set exactly once on each outbound call.
const SKIPPED_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "content-type",
    "transfer-encoding",
    "connection",
];

/// Serialize a header map to the stored JSON form.
///
/// A `BTreeMap` keeps the serialization byte-stable for identical maps.
pub fn encode_header_map(map: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(map)?)
}

/// Deserialize the stored JSON form back into a header map.
pub fn decode_header_map(bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    Ok(serde_json::from_slice(bytes)?)
}

fn build_header_map(stored: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in stored {
        if SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => {
                warn!(header = %name, "skipping unrepresentable stored header");
            }
        }
    }
    headers
}

/// The observable result of a completed outbound call.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub status: u16,
    /// Response headers in the stored JSON form.
    pub headers: Vec<u8>,
    pub payload: Vec<u8>,
    pub content_type: String,
}

impl Dispatched {
    async fn capture(response: reqwest::Response) -> Result<Dispatched> {
        let status = response.status().as_u16();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut map = BTreeMap::new();
        for (name, value) in response.headers() {
            if SKIPPED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let payload = response.bytes().await?.to_vec();

        Ok(Dispatched {
            status,
            headers: encode_header_map(&map)?,
            payload,
            content_type,
        })
    }
}

/// Shared outbound HTTP client for target and reply calls.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
}

impl HttpDispatcher {
    /// Build a client applying `timeout` to every call it makes.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Configuration(e.to_string()))?;

        Ok(Self { client })
    }

    /// Reconstitute the submitted request and call the target URL.
    pub async fn call_target(&self, activity: &Activity) -> Result<Dispatched> {
        let method = Method::from_bytes(activity.method.as_bytes())
            .map_err(|_| RelayError::Transport(format!("invalid method '{}'", activity.method)))?;
        let stored = decode_header_map(&activity.headers)?;

        let mut request = self
            .client
            .request(method, activity.url.as_str())
            .headers(build_header_map(&stored))
            .body(activity.payload.clone());
        if !activity.content_type.is_empty() {
            request = request.header(CONTENT_TYPE, activity.content_type.as_str());
        }

        let response = request.send().await?;
        Dispatched::capture(response).await
    }

    /// Replay the persisted response to the reply URL, tagged with the
    /// activity id so the receiver can correlate.
    pub async fn call_reply(
        &self,
        activity: &Activity,
        response: &ResponseRecord,
    ) -> Result<Dispatched> {
        let method = Method::from_bytes(activity.reply_method.as_bytes()).map_err(|_| {
            RelayError::Transport(format!("invalid reply method '{}'", activity.reply_method))
        })?;
        let stored = decode_header_map(&response.headers)?;

        let mut request = self
            .client
            .request(method, activity.reply_url.as_str())
            .headers(build_header_map(&stored))
            .header(TASK_ID_HEADER, activity.id.as_str())
            .body(response.payload.clone());
        if !response.content_type.is_empty() {
            request = request.header(CONTENT_TYPE, response.content_type.as_str());
        }

        let sent = request.send().await?;
        Dispatched::capture(sent).await
    }
}
