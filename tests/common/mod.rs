//! Shared harness for integration tests: an in-memory store, a worker
//! context, and scriptable stub HTTP endpoints standing in for target and
//! reply services.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use relay_core::database::open_pool_in_memory;
use relay_core::dispatch::{encode_header_map, HttpDispatcher};
use relay_core::models::Activity;
use relay_core::state_machine::ActivityState;
use relay_core::workers::WorkerContext;
use relay_core::RelayConfig;

pub fn test_config() -> RelayConfig {
    RelayConfig {
        node_id: "node-test".to_string(),
        database_url: ":memory:".to_string(),
        request_timeout_secs: 5,
        ..RelayConfig::default()
    }
}

pub async fn test_context() -> WorkerContext {
    let pool = open_pool_in_memory().await.unwrap();
    context_with_pool(pool)
}

pub fn context_with_pool(pool: SqlitePool) -> WorkerContext {
    WorkerContext {
        pool,
        config: Arc::new(test_config()),
        dispatcher: Arc::new(HttpDispatcher::new(Duration::from_secs(5)).unwrap()),
    }
}

/// An activity as the submit handler would persist it: POST with a JSON
/// body and one custom header.
pub fn make_activity(id: &str, url: &str, reply_url: &str, created_at: i64) -> Activity {
    let mut headers = BTreeMap::new();
    headers.insert("x-custom".to_string(), "hello".to_string());

    Activity {
        id: id.to_string(),
        url: url.to_string(),
        method: "POST".to_string(),
        reply_url: reply_url.to_string(),
        reply_method: "POST".to_string(),
        state: ActivityState::Created.to_string(),
        node_id: "node-test".to_string(),
        created_at,
        headers: encode_header_map(&headers).unwrap(),
        payload: br#"{"n":1}"#.to_vec(),
        content_type: "application/json".to_string(),
    }
}

/// One request observed by a stub endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct StubState {
    statuses: Arc<Mutex<Vec<u16>>>,
    body: &'static str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// A stub HTTP endpoint answering every path with a scripted status
/// sequence (the last status repeats) and a fixed JSON body.
pub struct StubServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

async fn record(State(state): State<StubState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let mut headers = HashMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default().to_vec();

    state.requests.lock().await.push(RecordedRequest {
        method: parts.method.to_string(),
        headers,
        body,
    });

    let status = {
        let mut statuses = state.statuses.lock().await;
        if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses.first().copied().unwrap_or(200)
        }
    };

    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
        [("content-type", "application/json")],
        state.body,
    )
        .into_response()
}

pub async fn spawn_stub(statuses: Vec<u16>, body: &'static str) -> StubServer {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = StubState {
        statuses: Arc::new(Mutex::new(statuses)),
        body,
        requests: requests.clone(),
    };

    let app = Router::new().fallback(record).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StubServer { addr, requests }
}
