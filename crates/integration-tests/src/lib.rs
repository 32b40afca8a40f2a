//! Integration test harness for Clementine.
//!
//! Spins up an in-process mock of the Clementine API: a GraphQL POST
//! route, the token refresh route, and the per-store realtime WebSocket
//! route. Tests script failures and push frames through [`MockState`] and
//! drive the real client against the mock's address.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p clementine-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde_json::{Value, json};
use url::Url;

use clementine_client::{ClientConfig, Environment, RealtimeConfig, RetryConfig};

/// A scripted failure for the next GraphQL request.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// Respond with HTTP 500.
    Server,
    /// Respond with a GraphQL error carrying this `extensions.code`.
    Code(&'static str),
}

/// Shared, test-visible state of the mock API.
pub struct MockState {
    /// Total POST /graphql requests received.
    pub graphql_hits: AtomicU32,
    /// Total POST /auth/refresh requests received.
    pub refresh_hits: AtomicU32,
    /// When set, the refresh route answers 401.
    pub refresh_fails: AtomicBool,
    /// Lifetime of issued access tokens, in seconds (may be negative to
    /// issue already-expired tokens).
    pub token_ttl_secs: AtomicI64,
    /// Failures consumed one per GraphQL request, front first.
    pub failures: Mutex<VecDeque<Failure>>,
    /// Payload for `storeOrders` queries.
    pub store_orders: Mutex<Vec<Value>>,
    /// Payload for customer `orders` queries.
    pub orders: Mutex<Vec<Value>>,
    /// Text frames pushed to every accepted realtime connection.
    pub ws_frames: Mutex<Vec<String>>,
}

impl MockState {
    fn new() -> Self {
        Self {
            graphql_hits: AtomicU32::new(0),
            refresh_hits: AtomicU32::new(0),
            refresh_fails: AtomicBool::new(false),
            token_ttl_secs: AtomicI64::new(3600),
            failures: Mutex::new(VecDeque::new()),
            store_orders: Mutex::new(Vec::new()),
            orders: Mutex::new(Vec::new()),
            ws_frames: Mutex::new(Vec::new()),
        }
    }

    /// Queue scripted failures for the next GraphQL requests.
    pub fn push_failures(&self, failures: &[Failure]) {
        self.failures
            .lock()
            .expect("failures lock")
            .extend(failures.iter().copied());
    }

    fn issue_token(&self) -> String {
        let ttl = self.token_ttl_secs.load(Ordering::Relaxed);
        jwt(ttl)
    }
}

/// The running mock API.
pub struct MockApi {
    pub state: Arc<MockState>,
    pub api_url: Url,
    pub ws_url: Url,
}

/// Install a tracing subscriber honoring `RUST_LOG`, once per process.
///
/// Silent by default; run with `RUST_LOG=clementine_client=debug` to watch
/// the transport and reconciliation at work.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockApi {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        init_tracing();
        let state = Arc::new(MockState::new());

        let app = Router::new()
            .route("/graphql", post(graphql))
            .route("/auth/refresh", post(refresh))
            .route("/ws/store/{store_id}", any(ws_upgrade))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock api");
        let addr = listener.local_addr().expect("mock api addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock api");
        });

        Self {
            state,
            api_url: Url::parse(&format!("http://{addr}/graphql")).expect("api url"),
            ws_url: Url::parse(&format!("ws://{addr}/ws")).expect("ws url"),
        }
    }

    /// Client configuration pointed at the mock, with fast retry and
    /// reconnect timings so tests stay quick.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(
            Environment::Test,
            self.api_url.clone(),
            self.ws_url.clone(),
            None,
        )
        .expect("client config");

        config.retry = RetryConfig {
            max_attempts: 3,
            initial_backoff: std::time::Duration::from_millis(20),
            max_backoff: std::time::Duration::from_millis(100),
        };
        config.realtime = RealtimeConfig {
            reconnect_interval: std::time::Duration::from_millis(50),
            max_reconnect_attempts: 5,
        };
        config
    }
}

/// Build an unsigned JWT expiring `ttl_secs` from now.
#[must_use]
pub fn jwt(ttl_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let exp = Utc::now().timestamp() + ttl_secs;
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "sub": "u1" }).to_string());
    format!("{header}.{payload}.sig")
}

/// A full order payload in the wire format.
#[must_use]
pub fn order_json(id: &str, status: &str, payment_status: &str) -> Value {
    json!({
        "_id": id,
        "orderNumber": format!("ORD-{id}"),
        "customerId": "c1",
        "customerName": "Ada Lovelace",
        "customerEmail": "ada@example.com",
        "items": [{
            "productId": "p1",
            "productName": "Walnut Desk Organizer",
            "quantity": 1,
            "price": "24.50"
        }],
        "total": "24.50",
        "status": status,
        "paymentStatus": payment_status,
        "createdAt": "2025-11-02T09:30:00Z",
        "updatedAt": "2025-11-02T09:30:00Z"
    })
}

/// A realtime frame in the wire format.
#[must_use]
pub fn event_frame(event_type: &str, order: Value) -> String {
    json!({ "type": event_type, "payload": order }).to_string()
}

fn graphql_error(code: &str, message: &str) -> Response {
    Json(json!({
        "errors": [{ "message": message, "extensions": { "code": code } }]
    }))
    .into_response()
}

fn bearer_token_valid(headers: &HeaderMap) -> bool {
    let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };

    let Some(payload) = token.split('.').nth(1) else {
        return false;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
        return false;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&bytes) else {
        return false;
    };

    claims
        .get("exp")
        .and_then(Value::as_i64)
        .is_some_and(|exp| exp > Utc::now().timestamp())
}

#[allow(clippy::significant_drop_tightening)]
async fn graphql(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.graphql_hits.fetch_add(1, Ordering::Relaxed);

    if let Some(failure) = state.failures.lock().expect("failures lock").pop_front() {
        return match failure {
            Failure::Server => {
                (StatusCode::INTERNAL_SERVER_ERROR, "scripted server failure").into_response()
            }
            Failure::Code(code) => graphql_error(code, "scripted failure"),
        };
    }

    let query = body["query"].as_str().unwrap_or_default();
    let variables = body.get("variables").cloned().unwrap_or_default();

    if query.contains("Login") {
        return Json(json!({
            "data": {
                "login": {
                    "token": state.issue_token(),
                    "refreshToken": "refresh-1",
                    "user": {
                        "id": "u1",
                        "email": variables.pointer("/input/email").and_then(Value::as_str).unwrap_or("ada@example.com"),
                        "firstName": "Ada",
                        "role": "store_owner"
                    }
                }
            }
        }))
        .into_response();
    }

    if !bearer_token_valid(&headers) {
        return graphql_error("UNAUTHENTICATED", "token expired");
    }

    if query.contains("GetStoreOrders") {
        let orders = state.store_orders.lock().expect("orders lock").clone();
        return Json(json!({ "data": { "storeOrders": orders } })).into_response();
    }

    if query.contains("GetOrders") {
        let orders = state.orders.lock().expect("orders lock").clone();
        return Json(json!({ "data": { "orders": orders } })).into_response();
    }

    if query.contains("UpdateOrderStatus") {
        let order_id = variables
            .get("orderId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = variables
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Json(json!({
            "data": {
                "updateOrderStatus": {
                    "_id": order_id,
                    "orderNumber": format!("ORD-{order_id}"),
                    "status": status,
                    "updatedAt": Utc::now().to_rfc3339()
                }
            }
        }))
        .into_response();
    }

    graphql_error("BAD_USER_INPUT", "unhandled operation in mock")
}

async fn refresh(State(state): State<Arc<MockState>>) -> Response {
    state.refresh_hits.fetch_add(1, Ordering::Relaxed);

    if state.refresh_fails.load(Ordering::Relaxed) {
        return (StatusCode::UNAUTHORIZED, "refresh rejected").into_response();
    }

    Json(json!({ "accessToken": state.issue_token() })).into_response()
}

async fn ws_upgrade(
    State(state): State<Arc<MockState>>,
    Path(_store_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

async fn ws_session(mut socket: WebSocket, state: Arc<MockState>) {
    let frames = state.ws_frames.lock().expect("frames lock").clone();
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    // Hold the connection open until the client goes away.
    while let Some(Ok(_)) = socket.recv().await {}
}
