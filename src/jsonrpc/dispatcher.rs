//! JSON-RPC method dispatch.
//!
//! [`Dispatcher::handle`] takes one decoded HTTP body and returns what the
//! transport should write back. Each envelope is handled in isolation: a
//! failure (or a panic) inside one capability becomes that envelope's error
//! object and never affects its neighbours in a batch.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{json, Value};

use super::protocol::{Reply, RpcId, RpcRequest, RpcResponse};
use super::resources;
use crate::capabilities::arguments::required_str;
use crate::capabilities::CapabilityRegistry;
use crate::config::{SettingsSource, PROTOCOL_VERSION, SERVER_NAME};
use crate::errors::{McpError, McpResult, INVALID_REQUEST, METHOD_NOT_FOUND};
use crate::host::HostData;
use crate::identity::Identity;

const WRITES_DISABLED_MESSAGE: &str =
    "Write operations disabled by admin. Contact your administrator.";

/// Lines of the debug representation logged for unexpected failures.
const STACK_EXCERPT_LINES: usize = 5;

/// Outcome of one method before it is wrapped into an envelope.
enum Handled {
    Reply(Value),
    NoReply,
    UnknownMethod,
}

/// Routes JSON-RPC envelopes to protocol handlers and registered
/// capabilities.
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    host: Arc<dyn HostData>,
    settings: Arc<dyn SettingsSource>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        host: Arc<dyn HostData>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            registry,
            host,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Handle a single envelope or a batch.
    ///
    /// Batches run one envelope at a time, in order, and always produce a
    /// [`Reply::Batch`] (empty when every entry was a notification). A single
    /// envelope produces `None` when no reply is owed.
    pub async fn handle(&self, body: Value, identity: &Identity) -> Option<Reply> {
        match body {
            Value::Array(entries) => {
                let mut responses = Vec::with_capacity(entries.len());
                for entry in entries {
                    if let Some(response) = self.handle_single(entry, identity).await {
                        responses.push(response);
                    }
                }
                Some(Reply::Batch(responses))
            }
            Value::Object(_) => self.handle_single(body, identity).await.map(Reply::Single),
            _ => Some(Reply::Single(RpcResponse::error(
                None,
                INVALID_REQUEST,
                "Invalid Request",
            ))),
        }
    }

    async fn handle_single(&self, envelope: Value, identity: &Identity) -> Option<RpcResponse> {
        if !envelope.is_object() {
            log::debug!("Skipping non-object batch entry");
            return None;
        }

        // An id that is present but neither a number nor a string cannot be
        // echoed back, so the error goes out with a null id.
        let id = match envelope.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => match serde_json::from_value::<RpcId>(raw.clone()) {
                Ok(id) => Some(id),
                Err(_) => {
                    log::debug!("Rejecting envelope with invalid id: {}", raw);
                    return Some(RpcResponse::error(None, INVALID_REQUEST, "Invalid Request"));
                }
            },
        };

        let request: RpcRequest = match serde_json::from_value(envelope) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("Malformed envelope: {}", e);
                return id.map(|id| RpcResponse::error(Some(id), INVALID_REQUEST, "Invalid Request"));
            }
        };

        let outcome = AssertUnwindSafe(self.call(&request, identity))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(McpError::Internal(anyhow::anyhow!(
                    "{} panicked: {}",
                    request.method,
                    panic_message(panic.as_ref())
                )))
            });

        let Some(id) = request.id.clone() else {
            match outcome {
                Err(e) => self.report(&request.method, identity, &e),
                Ok(Handled::UnknownMethod) => {
                    log::debug!("Dropping unknown notification: {}", request.method)
                }
                Ok(_) => {}
            }
            return None;
        };

        match outcome {
            Ok(Handled::Reply(result)) => Some(RpcResponse::success(Some(id), result)),
            Ok(Handled::NoReply) => None,
            Ok(Handled::UnknownMethod) => Some(RpcResponse::error(
                Some(id),
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
            Err(e) => {
                self.report(&request.method, identity, &e);
                Some(RpcResponse::error(Some(id), e.code(), e.client_message()))
            }
        }
    }

    async fn call(&self, request: &RpcRequest, identity: &Identity) -> McpResult<Handled> {
        let params = request.params();
        let result = match request.method.as_str() {
            "initialize" => initialize_result(),
            "ping" => json!({}),
            "notifications/initialized" | "notifications/cancelled" | "$/cancelRequest" => {
                return Ok(Handled::NoReply)
            }
            "tools/list" => json!({ "tools": self.registry.list_tools(identity) }),
            "tools/call" => self.call_tool(&params, identity).await?,
            "resources/list" => json!({ "resources": [] }),
            "resources/templates/list" => resources::templates_result(),
            "resources/read" => {
                let uri = required_str(&params, "uri")?;
                resources::read_resource(self.host.as_ref(), identity, uri).await?
            }
            "prompts/list" => json!({ "prompts": self.registry.list_prompts() }),
            "prompts/get" => self.get_prompt(&params, identity).await?,
            _ => return Ok(Handled::UnknownMethod),
        };
        Ok(Handled::Reply(result))
    }

    async fn call_tool(&self, params: &Value, identity: &Identity) -> McpResult<Value> {
        let name = required_str(params, "name")?;
        let tool = self.registry.find_tool(name)?;
        if !tool.is_available_to(identity) {
            return Err(McpError::not_found(format!("Tool not found: {}", name)));
        }
        if tool.mutating() && !self.settings.current().enable_write_operations {
            return Err(McpError::WriteOperationsDisabled(WRITES_DISABLED_MESSAGE.into()));
        }

        log::debug!("Calling tool {} for user {}", name, identity.id);
        let arguments = arguments_of(params);
        let result = tool.execute(&arguments, identity).await?;
        serde_json::to_value(result).map_err(|e| McpError::Internal(e.into()))
    }

    async fn get_prompt(&self, params: &Value, identity: &Identity) -> McpResult<Value> {
        let name = required_str(params, "name")?;
        let prompt = self.registry.find_prompt(name)?;
        let messages = prompt.execute(&arguments_of(params), identity).await?;
        Ok(json!({ "messages": messages }))
    }

    fn report(&self, method: &str, identity: &Identity, error: &McpError) {
        match error {
            McpError::Internal(inner) => {
                log::error!("{} failed for user {}: {:#}", method, identity.id, inner);
                let detail = format!("{:?}", inner);
                for line in detail.lines().take(STACK_EXCERPT_LINES) {
                    log::debug!("  {}", line);
                }
            }
            McpError::ResourceNotFound(_) | McpError::PermissionDenied(_) => {
                log::warn!("{} rejected for user {}: {}", method, identity.id, error)
            }
            _ => log::info!("{} failed for user {}: {}", method, identity.id, error),
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false },
            "prompts": { "listChanged": false },
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": crate::VERSION,
        }
    })
}

/// `params.arguments`, or an empty object.
fn arguments_of(params: &Value) -> Value {
    match params.get("arguments") {
        Some(args) if !args.is_null() => args.clone(),
        _ => json!({}),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
