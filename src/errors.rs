//! Error taxonomy for the gateway.
//!
//! Every failure that can cross the dispatcher boundary is one of the
//! [`McpError`] variants, and each variant maps to exactly one JSON-RPC
//! error code. Registry misuse at boot is a separate [`RegistryError`]
//! because it is a programming error, never a request outcome.

use thiserror::Error;

// ---------------------------------------------------------------------------
// JSON-RPC error codes
// ---------------------------------------------------------------------------

/// Standard JSON-RPC error: invalid JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Standard JSON-RPC error: not a valid (or not an authorized) request.
pub const INVALID_REQUEST: i32 = -32600;
/// Standard JSON-RPC error: method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Standard JSON-RPC error: internal error.
pub const INTERNAL_ERROR: i32 = -32603;

/// Admission control rejected the request (rate limit or stream cap).
pub const ADMISSION_REJECTED: i32 = -32000;
/// Whole-request processing exceeded the configured bound.
pub const REQUEST_TIMEOUT: i32 = -32001;
/// Mutating tool invoked while writes are switched off.
pub const WRITE_DISABLED: i32 = -32002;
/// Identity lacks rights on the capability or record.
pub const PERMISSION_DENIED: i32 = -32003;
/// Capability, resource URI or record is absent or invisible.
pub const RESOURCE_NOT_FOUND: i32 = -32004;

/// Message surfaced to clients in place of any unexpected failure.
pub const SANITIZED_INTERNAL_MESSAGE: &str =
    "An internal error occurred while processing the request";

// ---------------------------------------------------------------------------
// McpError
// ---------------------------------------------------------------------------

/// Classified failure of a request, a capability or an admission check.
#[derive(Debug, Error)]
pub enum McpError {
    /// Per-identity request rate exceeded.
    #[error("Rate limit exceeded ({limit}/min)")]
    RateLimitExceeded { limit: u64 },

    /// Per-identity concurrent stream cap reached.
    #[error("Too many SSE connections (max {max} per user)")]
    ConnectionLimitExceeded { max: usize },

    /// Writes are disabled by the host administrator.
    #[error("{0}")]
    WriteOperationsDisabled(String),

    /// The identity may not perform the operation.
    #[error("{0}")]
    PermissionDenied(String),

    /// The named capability, URI or record does not exist for this identity.
    #[error("{0}")]
    ResourceNotFound(String),

    /// Required parameters are missing or malformed.
    #[error("{0}")]
    InvalidParams(String),

    /// Host-side validation rejected the input. The message is user-facing.
    #[error("{0}")]
    Validation(String),

    /// Request processing exceeded its time budget.
    #[error("Request timeout ({seconds}s limit)")]
    Timeout { seconds: u64 },

    /// Anything not classified above. Never shown to clients verbatim.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl McpError {
    /// Shorthand for a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        McpError::ResourceNotFound(message.into())
    }

    /// Shorthand for a permission error.
    pub fn denied(message: impl Into<String>) -> Self {
        McpError::PermissionDenied(message.into())
    }

    /// Shorthand for a parameter error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        McpError::InvalidParams(message.into())
    }

    /// The JSON-RPC error code this failure is reported with.
    pub fn code(&self) -> i32 {
        match self {
            McpError::RateLimitExceeded { .. } | McpError::ConnectionLimitExceeded { .. } => {
                ADMISSION_REJECTED
            }
            McpError::Timeout { .. } => REQUEST_TIMEOUT,
            McpError::WriteOperationsDisabled(_) => WRITE_DISABLED,
            McpError::PermissionDenied(_) => PERMISSION_DENIED,
            McpError::ResourceNotFound(_) => RESOURCE_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::Validation(_) | McpError::Internal(_) => {
                INTERNAL_ERROR
            }
        }
    }

    /// The message that is safe to send to the client.
    ///
    /// Classified variants carry messages written for the caller. Internal
    /// failures may hold SQL, paths or stack detail and are replaced.
    pub fn client_message(&self) -> String {
        match self {
            McpError::Internal(_) => SANITIZED_INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this is an unclassified failure that must be logged in full.
    pub fn is_internal(&self) -> bool {
        matches!(self, McpError::Internal(_))
    }
}

/// Result alias used by capabilities and collaborators.
pub type McpResult<T> = Result<T, McpError>;

// ---------------------------------------------------------------------------
// RegistryError
// ---------------------------------------------------------------------------

/// Capability kind, used in registry diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Prompt,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Tool => write!(f, "tool"),
            CapabilityKind::Prompt => write!(f, "prompt"),
        }
    }
}

/// Boot-time registry misuse. Fatal: the process must not start serving.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Registration attempted after the catalog was frozen.
    #[error("Registry is frozen - cannot register {kind} '{name}'")]
    Frozen { kind: CapabilityKind, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_taxonomy() {
        assert_eq!(McpError::RateLimitExceeded { limit: 60 }.code(), -32000);
        assert_eq!(McpError::ConnectionLimitExceeded { max: 3 }.code(), -32000);
        assert_eq!(McpError::Timeout { seconds: 30 }.code(), -32001);
        assert_eq!(McpError::WriteOperationsDisabled("off".into()).code(), -32002);
        assert_eq!(McpError::denied("no").code(), -32003);
        assert_eq!(McpError::not_found("gone").code(), -32004);
        assert_eq!(McpError::invalid_params("bad").code(), -32603);
    }

    #[test]
    fn test_internal_message_is_sanitized() {
        let err = McpError::from(anyhow::anyhow!("SELECT * FROM users failed at db.rs:42"));
        assert!(err.is_internal());
        assert_eq!(err.client_message(), SANITIZED_INTERNAL_MESSAGE);
        assert!(!err.client_message().contains("SELECT"));
    }

    #[test]
    fn test_classified_messages_pass_through() {
        let err = McpError::Validation("Subject cannot be blank".into());
        assert_eq!(err.client_message(), "Subject cannot be blank");

        let err = McpError::RateLimitExceeded { limit: 10 };
        assert_eq!(err.client_message(), "Rate limit exceeded (10/min)");
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::Frozen {
            kind: CapabilityKind::Tool,
            name: "get_issue".into(),
        };
        assert_eq!(
            err.to_string(),
            "Registry is frozen - cannot register tool 'get_issue'"
        );
    }
}
