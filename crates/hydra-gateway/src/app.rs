//! Axum application: WebSocket upgrade surface and shared state.
//!
//! `GET /` upgrades limb-protocol adapters (`Authorization: Basic <secret>`
//! plus a `Vendor` header); `GET /onebot/{vendor}` upgrades OneBot
//! adapters (`Authorization: Bearer <secret>` plus `X-Self-Id`). Rejections
//! are 403 JSON error bodies.

use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::StreamExt;
use tracing::info;

use hydra_core::bus::EventSink;
use hydra_core::config::BridgeConfig;
use hydra_core::protocol::ErrorBody;
use hydra_core::types::Vendor;

use crate::client::{Client, ClientRegistry};
use crate::limb::LimbClient;
use crate::onebot::OnebotClient;

pub struct AppState {
    pub config: BridgeConfig,
    pub registry: ClientRegistry,
    /// Sink of the slave→master bus handed to each client.
    pub s2m: EventSink,
    /// Shared client for URL media downloads.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: BridgeConfig, s2m: EventSink) -> Self {
        Self {
            registry: ClientRegistry::new(s2m.clone()),
            config,
            s2m,
            http: reqwest::Client::new(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(limb_handler))
        .route("/onebot/{vendor}", get(onebot_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn forbidden(code: &str, message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(ErrorBody::new(code, message))).into_response()
}

fn check_secret(headers: &HeaderMap, scheme: &str, secret: &str) -> Option<Response> {
    let authorization = headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    let Some(token) = authorization.strip_prefix(scheme) else {
        return Some(forbidden("M_MISSING_TOKEN", "Missing authorization header"));
    };
    if token != secret {
        return Some(forbidden("M_UNKNOWN_TOKEN", "Unknown authorization token"));
    }
    None
}

async fn limb_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = check_secret(&headers, "Basic ", &state.config.service.secret) {
        return rejection;
    }
    let vendor = headers
        .get("Vendor")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    if vendor.is_empty() {
        return forbidden("M_MISSING_VENDOR", "Missing vendor header");
    }

    ws.on_upgrade(move |socket| limb_connection(socket, state, vendor))
}

async fn onebot_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(vendor_kind): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = check_secret(&headers, "Bearer ", &state.config.service.secret) {
        return rejection;
    }
    let self_id = headers
        .get("X-Self-Id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    if self_id.is_empty() {
        return forbidden("M_MISSING_VENDOR", "Missing vendor header");
    }
    let vendor = Vendor::new(vendor_kind, self_id);

    ws.on_upgrade(move |socket| onebot_connection(socket, state, vendor))
}

/// Per-connection task for a limb adapter; lives for the session lifetime.
async fn limb_connection(socket: WebSocket, state: Arc<AppState>, vendor: String) {
    info!(vendor, "limb client connected");

    let (writer, reader) = socket.split();
    let client = Arc::new(LimbClient::new(
        vendor.clone(),
        state.config.service.send_timeout_duration(),
        writer,
        state.s2m.clone(),
    ));
    state
        .registry
        .insert(vendor.clone(), Arc::clone(&client) as Arc<dyn Client>);
    state
        .registry
        .observe(format!("LimbClient({vendor}) connected"));

    client.run(reader).await;

    info!(vendor, "limb client disconnected");
    state.registry.remove(&vendor);
    state
        .registry
        .observe(format!("LimbClient({vendor}) disconnected"));
}

/// Per-connection task for a OneBot adapter.
async fn onebot_connection(socket: WebSocket, state: Arc<AppState>, vendor: Vendor) {
    let key = vendor.to_string();
    info!(vendor = %key, "onebot client connected");

    let (writer, reader) = socket.split();
    let client = Arc::new(OnebotClient::new(
        vendor,
        state.config.service.send_timeout_duration(),
        writer,
        state.s2m.clone(),
        state.http.clone(),
    ));
    state
        .registry
        .insert(key.clone(), Arc::clone(&client) as Arc<dyn Client>);
    state
        .registry
        .observe(format!("OnebotClient({key}) connected"));

    client.run(reader).await;

    info!(vendor = %key, "onebot client disconnected");
    state.registry.remove(&key);
    state
        .registry
        .observe(format!("OnebotClient({key}) disconnected"));
}
