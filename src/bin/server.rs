//! mcp-gateway HTTP server binary.
//!
//! Serves the built-in tool, resource and prompt catalog over an in-memory
//! demo host.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8080)
//! - `MCP_SETTINGS` — Path to a YAML settings file (optional)
//! - `MCP_ENABLED`, `MCP_ENABLE_WRITES`, `MCP_RATE_LIMIT`, ... — per-key overrides
//! - `RUST_LOG` — Tracing filter (default: "info,mcp_gateway=debug")
//!
//! # Usage
//!
//! ```bash
//! MCP_SETTINGS=mcp.yml cargo run --bin server
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use mcp_gateway::config::{McpSettings, SharedSettings};
use mcp_gateway::host::InMemoryHost;
use mcp_gateway::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mcp_gateway=debug".into()),
        )
        .init();

    let settings = match std::env::var("MCP_SETTINGS") {
        Ok(path) => McpSettings::from_yaml_file(Path::new(&path))?,
        Err(_) => McpSettings::default(),
    }
    .with_env_overrides();
    tracing::info!(
        enabled = settings.enabled,
        writes = settings.enable_write_operations,
        rate_limit = settings.rate_limit(),
        "Settings loaded"
    );
    let settings = Arc::new(SharedSettings::new(settings));

    let host = Arc::new(InMemoryHost::demo());
    let state = AppState::with_builtin_catalog(host.clone(), settings, host)?;
    let app = app_router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    tracing::info!("mcp-gateway {} starting on {}", mcp_gateway::VERSION, bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  POST /mcp        — JSON-RPC requests");
    tracing::info!("  GET  /mcp        — SSE heartbeat stream");
    tracing::info!("  GET  /mcp/health — readiness probe");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}
