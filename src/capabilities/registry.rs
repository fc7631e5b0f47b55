//! Capability Registry — the tool and prompt catalog.
//!
//! Lifecycle:
//! 1. Boot code creates an empty registry and registers every capability.
//! 2. `freeze()` (or `into_shared()`) closes registration for good.
//! 3. The frozen registry is shared behind an `Arc` and only read.
//!
//! Once shared there is no `&mut` access left, so lookups on the request
//! path need no locking. Registration after freezing is a programming error
//! and returns [`RegistryError::Frozen`].
//!
//! Resources are not registered here. They are resolved by URI pattern in
//! the dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::capability::{to_mcp_prompt, to_mcp_tool, Prompt, Tool};
use crate::errors::{CapabilityKind, McpError, McpResult, RegistryError};
use crate::identity::Identity;

/// Counts reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub tools: usize,
    pub prompts: usize,
    pub frozen: bool,
}

/// Name-keyed catalog of tools and prompts.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    prompts: HashMap<String, Arc<dyn Prompt>>,
    frozen: bool,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<&String> = self.tools.keys().collect();
        tools.sort();
        let mut prompts: Vec<&String> = self.prompts.keys().collect();
        prompts.sort();
        f.debug_struct("CapabilityRegistry")
            .field("tools", &tools)
            .field("prompts", &prompts)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl CapabilityRegistry {
    /// Create a new, mutable, empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Registration ==========

    /// Register a tool under its name. The last registration for a name wins.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if self.frozen {
            return Err(RegistryError::Frozen {
                kind: CapabilityKind::Tool,
                name,
            });
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("Duplicate tool registration for '{}', keeping the latest", name);
        }
        Ok(())
    }

    /// Register a prompt under its name. The last registration for a name wins.
    pub fn register_prompt(&mut self, prompt: Arc<dyn Prompt>) -> Result<(), RegistryError> {
        let name = prompt.name().to_string();
        if self.frozen {
            return Err(RegistryError::Frozen {
                kind: CapabilityKind::Prompt,
                name,
            });
        }
        if self.prompts.insert(name.clone(), prompt).is_some() {
            log::warn!("Duplicate prompt registration for '{}', keeping the latest", name);
        }
        Ok(())
    }

    // ========== Lifecycle ==========

    /// Close registration. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Freeze and move into a shared read-only handle.
    pub fn into_shared(mut self) -> Arc<Self> {
        self.freeze();
        Arc::new(self)
    }

    /// Drop every capability and reopen registration.
    ///
    /// Only meant for test isolation; production code never holds `&mut`
    /// to a frozen registry.
    pub fn reset(&mut self) {
        self.tools.clear();
        self.prompts.clear();
        self.frozen = false;
    }

    // ========== Lookup ==========

    /// Find a tool by name.
    pub fn find_tool(&self, name: &str) -> McpResult<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::not_found(format!("Tool not found: {}", name)))
    }

    /// Find a prompt by name.
    pub fn find_prompt(&self, name: &str) -> McpResult<Arc<dyn Prompt>> {
        self.prompts
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::not_found(format!("Prompt not found: {}", name)))
    }

    /// Tools visible to `identity`, ordered by name.
    pub fn tools_for(&self, identity: &Identity) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<Arc<dyn Tool>> = self
            .tools
            .values()
            .filter(|t| t.is_available_to(identity))
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// All prompts, ordered by name. Prompts are never filtered by identity.
    pub fn prompts(&self) -> Vec<Arc<dyn Prompt>> {
        let mut prompts: Vec<Arc<dyn Prompt>> = self.prompts.values().cloned().collect();
        prompts.sort_by(|a, b| a.name().cmp(b.name()));
        prompts
    }

    /// Public tool descriptors for `identity`.
    pub fn list_tools(&self, identity: &Identity) -> Vec<Value> {
        self.tools_for(identity)
            .iter()
            .map(|t| to_mcp_tool(t.as_ref()))
            .collect()
    }

    /// Public prompt descriptors.
    pub fn list_prompts(&self) -> Vec<Value> {
        self.prompts()
            .iter()
            .map(|p| to_mcp_prompt(p.as_ref()))
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            tools: self.tools.len(),
            prompts: self.prompts.len(),
            frozen: self.frozen,
        }
    }
}
