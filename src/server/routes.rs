//! Axum route handlers for the gateway.
//!
//! # Routes
//!
//! - `POST /mcp`        — JSON-RPC request or batch
//! - `GET  /mcp`        — SSE heartbeat stream
//! - `GET  /mcp/health` — `{"status": "ok", "version": ..., "registry": {...}}`
//!
//! Admission runs in a fixed order on `POST /mcp`: authentication, the
//! enabled switch, payload size, JSON parsing, the rate limiter, then the
//! dispatcher under the request timeout.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::admission::{ConnectionTracker, RateLimiter};
use crate::capabilities::CapabilityRegistry;
use crate::config::{SettingsSource, MAX_PAYLOAD_BYTES};
use crate::errors::{McpError, RegistryError, INVALID_REQUEST, PARSE_ERROR};
use crate::host::HostData;
use crate::identity::{Identity, IdentityResolver};
use crate::jsonrpc::{Dispatcher, RpcResponse};
use crate::streaming::{ChannelSink, HeartbeatSession, SseWriter};

/// Frames buffered between the heartbeat task and the HTTP body.
const SSE_CHANNEL_CAPACITY: usize = 16;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub rate_limiter: Arc<RateLimiter>,
    pub tracker: Arc<ConnectionTracker>,
    pub settings: Arc<dyn SettingsSource>,
    pub resolver: Arc<dyn IdentityResolver>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        settings: Arc<dyn SettingsSource>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            dispatcher,
            rate_limiter: Arc::new(RateLimiter::new()),
            tracker: Arc::new(ConnectionTracker::default()),
            settings,
            resolver,
        }
    }

    /// State with the built-in tools and prompts registered and frozen.
    pub fn with_builtin_catalog(
        host: Arc<dyn HostData>,
        settings: Arc<dyn SettingsSource>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Result<Self, RegistryError> {
        let mut registry = CapabilityRegistry::new();
        let ctx = crate::tools::ToolContext::new(host.clone(), settings.clone());
        crate::tools::register_builtin(&mut registry, &ctx)?;
        crate::prompts::register_builtin(&mut registry, host.clone())?;
        let registry = registry.into_shared();

        let stats = registry.stats();
        tracing::info!(
            tools = stats.tools,
            prompts = stats.prompts,
            frozen = stats.frozen,
            "Capability registry ready"
        );

        let dispatcher = Dispatcher::new(registry, host, settings.clone());
        Ok(Self::new(Arc::new(dispatcher), settings, resolver))
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<ConnectionTracker>) -> Self {
        self.tracker = tracker;
        self
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/mcp", get(sse_handler).post(rpc_handler))
        .route("/mcp/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A JSON-RPC error envelope with `id: null` and the given HTTP status.
fn rpc_error(status: StatusCode, code: i32, message: impl Into<String>) -> Response {
    (status, Json(RpcResponse::error(None, code, message))).into_response()
}

fn admission_error(status: StatusCode, error: &McpError) -> Response {
    rpc_error(status, error.code(), error.client_message())
}

/// API key from `X-Api-Key`, or from `Authorization: Bearer <key>`.
fn api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim()).filter(|k| !k.is_empty());
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

/// Authentication and the enabled switch, shared by both MCP endpoints.
fn admit(state: &AppState, headers: &HeaderMap) -> Result<Identity, Response> {
    let identity = api_key(headers)
        .and_then(|key| state.resolver.resolve(key))
        .ok_or_else(|| {
            rpc_error(
                StatusCode::UNAUTHORIZED,
                INVALID_REQUEST,
                "Authentication required",
            )
        })?;
    if !state.settings.current().enabled {
        return Err(rpc_error(
            StatusCode::SERVICE_UNAVAILABLE,
            INVALID_REQUEST,
            "MCP plugin disabled",
        ));
    }
    Ok(identity)
}

fn payload_too_large() -> Response {
    rpc_error(
        StatusCode::PAYLOAD_TOO_LARGE,
        INVALID_REQUEST,
        "Payload too large (max 1MB)",
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /mcp/health — unauthenticated readiness probe.
async fn health_handler(State(state): State<AppState>) -> Response {
    if !state.settings.current().enabled {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "disabled" })),
        )
            .into_response();
    }
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "registry": state.dispatcher.registry().stats(),
    }))
    .into_response()
}

/// POST /mcp — JSON-RPC request or batch.
async fn rpc_handler(State(state): State<AppState>, headers: HeaderMap, body: Body) -> Response {
    let identity = match admit(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("mcp_request", %request_id, user_id = identity.id);
    handle_rpc(state, identity, headers, body)
        .instrument(span)
        .await
}

async fn handle_rpc(
    state: AppState,
    identity: Identity,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let settings = state.settings.current();

    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(len) = declared_len.filter(|len| *len > MAX_PAYLOAD_BYTES) {
        tracing::warn!(len, "Rejecting oversized payload");
        return payload_too_large();
    }
    let bytes = match axum::body::to_bytes(body, MAX_PAYLOAD_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Rejecting request body: {}", e);
            return payload_too_large();
        }
    };

    let message: Value = match serde_json::from_slice(&bytes) {
        Ok(message) => message,
        Err(e) => {
            return rpc_error(StatusCode::OK, PARSE_ERROR, format!("Parse error: {}", e));
        }
    };

    let count = match &message {
        Value::Array(entries) => entries.len().max(1) as u64,
        _ => 1,
    };
    if let Err(e) = state
        .rate_limiter
        .check(identity.id, count, settings.rate_limit())
    {
        tracing::warn!(count, "Rate limit exceeded");
        return admission_error(StatusCode::TOO_MANY_REQUESTS, &e);
    }

    let timeout = settings.request_timeout();
    match tokio::time::timeout(timeout, state.dispatcher.handle(message, &identity)).await {
        Ok(Some(reply)) => Json(reply).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(_) => {
            let error = McpError::Timeout {
                seconds: timeout.as_secs(),
            };
            tracing::error!("{}", error);
            admission_error(StatusCode::GATEWAY_TIMEOUT, &error)
        }
    }
}

/// GET /mcp — server-sent heartbeat stream.
async fn sse_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let identity = match admit(&state, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let Some(slot) = state.tracker.try_acquire(identity.id) else {
        let error = McpError::ConnectionLimitExceeded {
            max: state.tracker.max_per_identity(),
        };
        tracing::warn!(user_id = identity.id, "{}", error);
        return admission_error(StatusCode::TOO_MANY_REQUESTS, &error);
    };

    let session = HeartbeatSession::from_settings(&state.settings.current());
    let (sink, rx) = ChannelSink::new(SSE_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        session.run(SseWriter::new(sink), slot).await;
    });

    let frames = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
    });

    let mut response = Body::from_stream(frames).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
