//! HTTP surface of the gateway.
//!
//! # Endpoints
//!
//! - `POST /mcp`        — JSON-RPC 2.0 requests, notifications and batches
//! - `GET  /mcp`        — SSE heartbeat stream (at most 3 per identity)
//! - `GET  /mcp/health` — Readiness probe with registry statistics

pub mod routes;

pub use routes::{app_router, AppState};
