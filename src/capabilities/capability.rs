//! Capability provider interface — what a tool or prompt must expose.
//!
//! A capability is either a [`Tool`] (an invocable operation returning a
//! content payload) or a [`Prompt`] (a template returning role-tagged
//! messages). Both are plain trait objects; the dispatcher never inspects
//! concrete types.
//!
//! The `to_mcp_*` functions render the public descriptors used by
//! `tools/list` and `prompts/list`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::McpResult;
use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Parameter specs
// ---------------------------------------------------------------------------

/// One entry of a tool's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Argument key.
    pub name: String,
    /// JSON Schema type (`string`, `integer`, `number`, `boolean`, `array`).
    #[serde(rename = "type")]
    pub param_type: String,
    /// Description shown to the model.
    pub description: String,
    /// Whether the argument must be present.
    #[serde(default)]
    pub required: bool,
    /// Closed set of accepted values, when the argument is an enumeration.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "enum")]
    pub allowed: Option<Vec<String>>,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required: true,
            allowed: None,
        }
    }

    /// An optional parameter.
    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Builder: restrict to an enumerated set of values.
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// One entry of a prompt's argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl PromptArgument {
    pub fn new(name: &str, description: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A block of content inside a tool result or prompt message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// The text of this block.
    pub fn as_text(&self) -> &str {
        match self {
            Content::Text { text } => text,
        }
    }
}

/// Outcome of a tool execution.
///
/// `is_error` marks a soft failure the model should read (e.g. a rejected
/// input). Hard failures are returned as [`crate::errors::McpError`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    /// Non-MCP extension, used for pagination metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ToolResult {
    /// Successful result carrying `text`.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
            meta: None,
        }
    }

    /// Successful result serialized from `value`.
    pub fn json(value: &Value) -> Self {
        Self::success(value.to_string())
    }

    /// Soft failure carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
            meta: None,
        }
    }

    /// Builder: attach `_meta`.
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Text of the first content block, if any.
    pub fn text(&self) -> Option<&str> {
        self.content.first().map(Content::as_text)
    }
}

/// Speaker of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A role-tagged message produced by a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Content,
}

impl PromptMessage {
    /// A user-role text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider traits
// ---------------------------------------------------------------------------

/// An operation agents can invoke with structured arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &str;

    /// Description for the model.
    fn description(&self) -> &str;

    /// Ordered parameter schema.
    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// Whether the tool changes host data. Mutating tools are refused while
    /// the write switch is off.
    fn mutating(&self) -> bool {
        false
    }

    /// Whether the tool appears in `tools/list` for `identity`.
    fn is_available_to(&self, _identity: &Identity) -> bool {
        true
    }

    /// Run the tool. Domain failures use the shared taxonomy.
    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult>;
}

/// A template that produces pre-filled messages.
#[async_trait]
pub trait Prompt: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn arguments(&self) -> Vec<PromptArgument> {
        Vec::new()
    }

    async fn execute(&self, arguments: &Value, identity: &Identity)
        -> McpResult<Vec<PromptMessage>>;
}

// ---------------------------------------------------------------------------
// Descriptor rendering
// ---------------------------------------------------------------------------

/// Public descriptor for `tools/list`.
pub fn to_mcp_tool(tool: &dyn Tool) -> Value {
    let params = tool.parameters();

    let mut properties = Map::new();
    for p in &params {
        let mut schema = json!({
            "type": p.param_type,
            "description": p.description,
        });
        if let Some(values) = &p.allowed {
            schema["enum"] = json!(values);
        }
        properties.insert(p.name.clone(), schema);
    }

    let required: Vec<&str> = params
        .iter()
        .filter(|p| p.required)
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "name": tool.name(),
        "description": tool.description(),
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// Public descriptor for `prompts/list`.
pub fn to_mcp_prompt(prompt: &dyn Prompt) -> Value {
    json!({
        "name": prompt.name(),
        "description": prompt.description(),
        "arguments": prompt.arguments(),
    })
}
