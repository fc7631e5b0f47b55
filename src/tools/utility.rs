use async_trait::async_trait;
use serde_json::Value;

use super::ToolContext;
use crate::capabilities::{Tool, ToolResult};
use crate::errors::{McpError, McpResult};
use crate::identity::Identity;

pub struct ListStatuses {
    ctx: ToolContext,
}

impl ListStatuses {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListStatuses {
    fn name(&self) -> &str {
        "list_statuses"
    }

    fn description(&self) -> &str {
        "List all available issue statuses (New, In Progress, Resolved, etc.)"
    }

    async fn execute(&self, _arguments: &Value, _identity: &Identity) -> McpResult<ToolResult> {
        let statuses = self.ctx.host.issue_statuses().await?;
        let body = serde_json::to_value(statuses).map_err(|e| McpError::Internal(e.into()))?;
        Ok(ToolResult::json(&body))
    }
}
