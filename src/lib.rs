//! # mcp-gateway
//!
//! A Model Context Protocol gateway that exposes a project tracker's data
//! to AI agents over JSON-RPC 2.0.
//!
//! Requests pass through admission control (authentication, payload size,
//! a per-identity rate limiter) before the [`jsonrpc::Dispatcher`] routes
//! them to the frozen [`capabilities::CapabilityRegistry`]. A companion SSE
//! endpoint keeps agents connected with periodic heartbeats, capped at three
//! streams per identity.

pub mod admission;
pub mod capabilities;
pub mod config;
pub mod errors;
pub mod host;
pub mod identity;
pub mod jsonrpc;
pub mod prompts;
pub mod server;
pub mod streaming;
pub mod tools;

pub use capabilities::{CapabilityRegistry, Prompt, Tool, ToolResult};
pub use config::{McpSettings, SettingsSource, SharedSettings};
pub use errors::{McpError, McpResult, RegistryError};
pub use identity::{Identity, IdentityResolver};
pub use jsonrpc::Dispatcher;

/// Gateway version reported by `initialize` and the health probe.
pub const VERSION: &str = "1.0.0";
