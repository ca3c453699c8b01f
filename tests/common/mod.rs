//! In-process HTTP fixture server for integration tests.
//!
//! Every test starts its own server on an ephemeral port, so tests never
//! share counters or tokens.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::net::TcpListener as StdTcpListener;
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Json;
use serde_json::{Value, json};

use api_connector::ConnectionConfig;

/// Body returned by `/number/{status}`.
pub fn mock_body() -> Value {
    json!({ "a": { "b": [1, 2, 3] } })
}

/// Shared, inspectable server state.
#[derive(Default)]
pub struct FixtureState {
    pub hits: Mutex<HashMap<String, usize>>,
    pub refresh_calls: AtomicUsize,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub refresh_device_keys: Mutex<Vec<Option<String>>>,
    pub refresh_fails: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    pub current_token: Mutex<Option<String>>,
    pub stepup_calls: AtomicUsize,
    pub stepup_requests: Mutex<Vec<(Option<String>, Value)>>,
    pub verified_transactions: Mutex<HashSet<String>>,
    pub flaky_remaining: AtomicUsize,
}

/// A running fixture server.
pub struct TestServer {
    pub base_url: String,
    pub state: Arc<FixtureState>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(FixtureState::default());

        let app = Router::new()
            .route("/ok", get(ok))
            .route("/text", get(text))
            .route("/headers", any(echo_headers))
            .route("/number/{status}", any(number))
            .route("/sleep/{ms}", get(sleep_then_ok))
            .route("/post", post(echo_body))
            .route("/post/{status}", post(echo_body_with_status))
            .route("/protected", get(protected))
            .route("/payments", post(payments))
            .route("/flaky-gateway", get(flaky_gateway))
            .route("/expiring-gateway", get(expiring_gateway))
            .route("/oauth2/refresh", post(refresh))
            .route("/oauth2/stepup", post(stepup))
            .layer(middleware::from_fn_with_state(state.clone(), count_hits))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fixture server");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fixture server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Default client configuration pointed at this server.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig {
            base_url: self.base_url.clone(),
            ..Default::default()
        }
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn stepup_calls(&self) -> usize {
        self.state.stepup_calls.load(Ordering::SeqCst)
    }
}

/// Find an available port with nothing listening on it
pub fn find_available_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to ephemeral port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

type Shared = State<Arc<FixtureState>>;

async fn count_hits(State(state): Shared, request: Request, next: Next) -> Response {
    *state
        .hits
        .lock()
        .unwrap()
        .entry(request.uri().path().to_string())
        .or_default() += 1;
    next.run(request).await
}

fn decode(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn ok() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

async fn text() -> &'static str {
    "hello"
}

async fn echo_headers(headers: HeaderMap) -> Json<Value> {
    let map: serde_json::Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();
    Json(json!({ "headers": map }))
}

async fn number(Path(code): Path<u16>) -> impl IntoResponse {
    (status(code), Json(mock_body()))
}

async fn sleep_then_ok(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "slept": ms }))
}

async fn echo_body(body: Bytes) -> Json<Value> {
    Json(decode(&body))
}

async fn echo_body_with_status(Path(code): Path<u16>, body: Bytes) -> impl IntoResponse {
    (status(code), Json(decode(&body)))
}

async fn protected(State(state): Shared, headers: HeaderMap) -> impl IntoResponse {
    let presented = header(&headers, AUTHORIZATION.as_str());
    let expected = state
        .current_token
        .lock()
        .unwrap()
        .clone()
        .map(|token| format!("Bearer {token}"));

    if presented.is_some() && presented == expected {
        (StatusCode::OK, Json(json!({ "authorization": presented })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "token expired" })),
        )
    }
}

async fn payments(State(state): Shared, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let transaction_id = header(&headers, "x-transactionid");
    let verified = transaction_id
        .as_ref()
        .is_some_and(|t| state.verified_transactions.lock().unwrap().contains(t));

    if verified {
        (
            StatusCode::OK,
            Json(json!({
                "paid": true,
                "transactionId": transaction_id,
                "body": decode(&body),
            })),
        )
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!({
                "transactionId": "tx-42",
                "authenticationMethods": "PASSCODE,BIOMETRIC",
            })),
        )
    }
}

async fn flaky_gateway(State(state): Shared) -> impl IntoResponse {
    let failing = state
        .flaky_remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "upstream timeout" })),
        )
    } else {
        (StatusCode::OK, Json(json!({ "status": "OK" })))
    }
}

/// 401 on the first hit, 504 on every later one.
async fn expiring_gateway(State(state): Shared, request: Request) -> impl IntoResponse {
    let hits = state
        .hits
        .lock()
        .unwrap()
        .get(request.uri().path())
        .copied()
        .unwrap_or(0);
    if hits <= 1 {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "token expired" })),
        )
    } else {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "error": "upstream timeout" })),
        )
    }
}

async fn refresh(State(state): Shared, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let call = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.refresh_bodies.lock().unwrap().push(decode(&body));
    state
        .refresh_device_keys
        .lock()
        .unwrap()
        .push(header(&headers, "x-devicekey"));

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.refresh_fails.load(Ordering::SeqCst) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid_grant" })),
        );
    }

    let access = format!("access-{call}");
    *state.current_token.lock().unwrap() = Some(access.clone());
    (
        StatusCode::OK,
        Json(json!({ "accessToken": access, "refreshToken": format!("refresh-{call}") })),
    )
}

async fn stepup(State(state): Shared, headers: HeaderMap, body: Bytes) -> Json<Value> {
    state.stepup_calls.fetch_add(1, Ordering::SeqCst);
    let transaction_id = header(&headers, "x-transactionid");
    state
        .stepup_requests
        .lock()
        .unwrap()
        .push((transaction_id.clone(), decode(&body)));

    if let Some(id) = transaction_id {
        state.verified_transactions.lock().unwrap().insert(id);
    }
    Json(json!({ "verified": true }))
}
