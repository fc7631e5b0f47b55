//! JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// The only protocol version this gateway speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request or notification.
///
/// `jsonrpc` is tolerated when absent; many agent clients omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// A request without an id (or with `"id": null`) expects no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// `params`, or an empty object.
    pub fn params(&self) -> Value {
        self.params
            .clone()
            .filter(|p| !p.is_null())
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// JSON-RPC message identifier (number or string).
///
/// Numbers keep their exact JSON form, so fractional and `u64` ids echo
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Num(Number),
    Str(String),
}

impl From<i64> for RpcId {
    fn from(n: i64) -> Self {
        RpcId::Num(n.into())
    }
}

impl From<&str> for RpcId {
    fn from(s: &str) -> Self {
        RpcId::Str(s.to_string())
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// JSON-RPC response. `id` is serialized as `null` when unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<RpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Option<RpcId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RpcId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// What the dispatcher hands back for one HTTP body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Single(RpcResponse),
    /// One entry per non-notification envelope, in request order.
    Batch(Vec<RpcResponse>),
}
