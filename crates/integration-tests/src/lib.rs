//! Integration test support for the storefront sync crates.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p storefront-sync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cross_context` - several contexts sharing one origin
//! - `checkout_flow` - order submission against [`FakeBackend`]
//! - `session_reconcile` - token confirmation against [`FakeBackend`]
//! - `http_api` - the `reqwest` client's status and body handling
//!
//! [`FakeBackend`] is an in-process `axum` server on an ephemeral port that
//! speaks the three collaborator endpoints.

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use storefront_sync::api::HttpApi;
use storefront_sync::checkout::MirrorPolicy;
use storefront_sync::storage::Origin;
use storefront_sync::StorefrontContext;
use storefront_sync_core::{CartItemTemplate, ShippingInfo};

/// Bearer token the fake backend accepts by default.
pub const VALID_TOKEN: &str = "valid-token";

#[derive(Default)]
struct BackendState {
    valid_token: Mutex<Option<String>>,
    fail_orders_with: Mutex<Option<u16>>,
    fail_users_with: Mutex<Option<u16>>,
    orders: Mutex<Vec<Value>>,
    products: Mutex<HashMap<String, Value>>,
    product_hits: AtomicUsize,
    user_hits: AtomicUsize,
}

/// In-process stand-in for the storefront backend.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend that accepts [`VALID_TOKEN`].
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        *state.valid_token.lock().unwrap() = Some(VALID_TOKEN.to_string());

        let app = Router::new()
            .route("/api/users/me", get(current_user))
            .route("/api/orders", post(submit_order))
            .route("/api/products/{id}", get(product))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL clients should be configured with.
    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/api", self.addr)).unwrap()
    }

    pub fn api(&self) -> HttpApi {
        HttpApi::new(self.base_url(), Duration::from_secs(60))
    }

    /// Open a context on `origin` talking to this backend.
    pub fn context(&self, origin: &Origin, mirror: MirrorPolicy) -> StorefrontContext {
        StorefrontContext::open(origin, self.api(), mirror)
    }

    /// Reject every token from now on.
    pub fn revoke_tokens(&self) {
        *self.state.valid_token.lock().unwrap() = None;
    }

    /// Answer `POST orders` with `status` from now on.
    pub fn fail_orders_with(&self, status: u16) {
        *self.state.fail_orders_with.lock().unwrap() = Some(status);
    }

    /// Answer `GET users/me` with `status` from now on.
    pub fn fail_users_with(&self, status: u16) {
        *self.state.fail_users_with.lock().unwrap() = Some(status);
    }

    /// Publish a catalog product.
    pub fn add_product(&self, id: &str, name: &str, price: &str, label_price: Option<&str>) {
        let mut body = json!({
            "id": id,
            "name": name,
            "price": price,
            "imageRef": format!("/images/{id}.jpg"),
            "stock": 5,
        });
        if let Some(label) = label_price {
            body["labelPrice"] = json!(label);
        }
        self.state
            .products
            .lock()
            .unwrap()
            .insert(id.to_string(), body);
    }

    /// Order bodies received so far, as raw JSON.
    pub fn orders(&self) -> Vec<Value> {
        self.state.orders.lock().unwrap().clone()
    }

    pub fn product_hits(&self) -> usize {
        self.state.product_hits.load(Ordering::SeqCst)
    }

    /// Number of `GET users/me` requests served.
    pub fn user_hits(&self) -> usize {
        self.state.user_hits.load(Ordering::SeqCst)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// A base URL nothing is listening on.
pub async fn unreachable_base_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/api")).unwrap()
}

/// Complete shipping details.
pub fn shipping() -> ShippingInfo {
    ShippingInfo {
        full_name: "Ada Lovelace".to_string(),
        address: "12 Analytical Way".to_string(),
        city: "London".to_string(),
        postal_code: "N1 9GU".to_string(),
        country: "GB".to_string(),
        phone: "+44 20 7946 0000".to_string(),
    }
}

/// A cart template with the given unit and label prices.
pub fn template(name: &str, unit: i64, label: i64) -> CartItemTemplate {
    CartItemTemplate {
        name: name.to_string(),
        alt_names: vec![],
        unit_price: Decimal::from(unit),
        label_price: Decimal::from(label),
        image_ref: None,
        stock_hint: None,
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn authorized(state: &BackendState, headers: &HeaderMap) -> bool {
    let expected = state.valid_token.lock().unwrap().clone();
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    matches!((expected, presented), (Some(e), Some(p)) if e == p)
}

fn status_response(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "backend unavailable").into_response()
}

async fn current_user(State(state): State<Arc<BackendState>>, headers: HeaderMap) -> Response {
    state.user_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = *state.fail_users_with.lock().unwrap() {
        return status_response(status);
    }
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "id": "u_1",
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "role": "customer",
    }))
    .into_response()
}

async fn submit_order(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(status) = *state.fail_orders_with.lock().unwrap() {
        return status_response(status);
    }
    let mut orders = state.orders.lock().unwrap();
    orders.push(body);
    let id = format!("ord_{}", orders.len());
    (
        StatusCode::CREATED,
        Json(json!({ "id": id, "status": "pending" })),
    )
        .into_response()
}

async fn product(State(state): State<Arc<BackendState>>, Path(id): Path<String>) -> Response {
    state.product_hits.fetch_add(1, Ordering::SeqCst);
    match state.products.lock().unwrap().get(&id) {
        Some(body) => Json(body.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
