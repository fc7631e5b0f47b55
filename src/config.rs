//! Admission-control settings.
//!
//! The gateway does not own its configuration: the host supplies it and may
//! change it at any time (an administrator flipping the write switch, for
//! example). Handlers therefore read a fresh [`McpSettings`] snapshot per
//! request through a [`SettingsSource`].
//!
//! Raw values are stored as configured. Accessors apply floors so that a
//! zero or negative entry can never switch admission control off.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "mcp-gateway";
/// Maximum accepted JSON-RPC body size (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;
/// Concurrent SSE streams allowed per identity.
pub const MAX_CONNECTIONS_PER_USER: usize = 3;
/// Rate-limit window length in seconds.
pub const RATE_WINDOW_SECS: u64 = 60;

const MIN_RATE_LIMIT: i64 = 1;
const MIN_REQUEST_TIMEOUT: i64 = 5;
const MIN_SSE_TIMEOUT: i64 = 60;
const MIN_HEARTBEAT_INTERVAL: i64 = 1;
const MIN_PAGE_SIZE: i64 = 1;

// ---------------------------------------------------------------------------
// McpSettings
// ---------------------------------------------------------------------------

/// Host-supplied configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSettings {
    /// Master switch for both endpoints.
    pub enabled: bool,
    /// Whether mutating tools may run.
    pub enable_write_operations: bool,
    /// Maximum SSE session length in seconds.
    pub sse_timeout: i64,
    /// Seconds between heartbeat events.
    pub heartbeat_interval: i64,
    /// Whole-request processing bound in seconds.
    pub request_timeout: i64,
    /// Page size when a list tool gets no `limit`.
    pub default_limit: i64,
    /// Largest page size a list tool returns.
    pub max_limit: i64,
    /// Requests per identity per minute.
    pub rate_limit: i64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_write_operations: false,
            sse_timeout: 3600,
            heartbeat_interval: 30,
            request_timeout: 30,
            default_limit: 25,
            max_limit: 100,
            rate_limit: 60,
        }
    }
}

impl McpSettings {
    /// Requests per minute, at least 1.
    pub fn rate_limit(&self) -> u64 {
        self.rate_limit.max(MIN_RATE_LIMIT) as u64
    }

    /// Request processing bound, at least 5 seconds.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(MIN_REQUEST_TIMEOUT) as u64)
    }

    /// SSE session length, at least 60 seconds.
    pub fn sse_timeout(&self) -> Duration {
        Duration::from_secs(self.sse_timeout.max(MIN_SSE_TIMEOUT) as u64)
    }

    /// Heartbeat spacing, at least 1 second.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL) as u64)
    }

    /// Default page size, at least 1.
    pub fn default_limit(&self) -> u64 {
        self.default_limit.max(MIN_PAGE_SIZE) as u64
    }

    /// Maximum page size, at least 1.
    pub fn max_limit(&self) -> u64 {
        self.max_limit.max(MIN_PAGE_SIZE) as u64
    }

    /// Parse settings from a YAML document. Missing keys take defaults.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load settings from a YAML file.
    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Apply `MCP_*` environment overrides on top of `self`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_override::<bool>(&lookup, "MCP_ENABLED") {
            self.enabled = v;
        }
        if let Some(v) = parse_override::<bool>(&lookup, "MCP_ENABLE_WRITES") {
            self.enable_write_operations = v;
        }
        if let Some(v) = parse_override::<i64>(&lookup, "MCP_RATE_LIMIT") {
            self.rate_limit = v;
        }
        if let Some(v) = parse_override::<i64>(&lookup, "MCP_REQUEST_TIMEOUT") {
            self.request_timeout = v;
        }
        if let Some(v) = parse_override::<i64>(&lookup, "MCP_SSE_TIMEOUT") {
            self.sse_timeout = v;
        }
        if let Some(v) = parse_override::<i64>(&lookup, "MCP_HEARTBEAT_INTERVAL") {
            self.heartbeat_interval = v;
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparsable value for {}: '{}'", key, raw);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// SettingsSource
// ---------------------------------------------------------------------------

/// Where request handlers read the current settings from.
pub trait SettingsSource: Send + Sync {
    /// A snapshot of the settings as they are right now.
    fn current(&self) -> McpSettings;
}

/// In-process settings cell that the host may update at runtime.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<McpSettings>>,
}

impl SharedSettings {
    pub fn new(settings: McpSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Replace the settings wholesale.
    pub fn replace(&self, settings: McpSettings) {
        *self.inner.write() = settings;
    }

    /// Mutate the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut McpSettings)) {
        f(&mut self.inner.write());
    }
}

impl SettingsSource for SharedSettings {
    fn current(&self) -> McpSettings {
        self.inner.read().clone()
    }
}
