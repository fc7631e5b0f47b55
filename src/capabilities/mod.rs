//! # Capability Registry
//!
//! Tools and prompts are the two capability kinds a server publishes to an
//! agent client. Each implementation exposes a name, a description, an
//! ordered argument schema and an `execute` entry point through the
//! [`Tool`] or [`Prompt`] trait.
//!
//! ## Lifecycle
//!
//! 1. At boot, a fixed list of constructors registers every capability.
//! 2. The registry is frozen and moved behind an `Arc`.
//! 3. Request handlers look capabilities up by name without locking.

pub mod arguments;
pub mod capability;
pub mod registry;

pub use capability::{
    to_mcp_prompt, to_mcp_tool, Content, ParamSpec, Prompt, PromptArgument, PromptMessage, Role,
    Tool, ToolResult,
};
pub use registry::{CapabilityRegistry, RegistryStats};
