use async_trait::async_trait;
use serde_json::Value;

use super::ToolContext;
use crate::capabilities::{Tool, ToolResult};
use crate::errors::McpResult;
use crate::identity::Identity;

pub struct GetCurrentUser {
    ctx: ToolContext,
}

impl GetCurrentUser {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetCurrentUser {
    fn name(&self) -> &str {
        "get_current_user"
    }

    fn description(&self) -> &str {
        "Get full profile of the currently authenticated user."
    }

    async fn execute(&self, _arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let user = self.ctx.host.current_user(identity).await?;
        Ok(ToolResult::json(&user.profile_json(identity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{body, context};
    use serde_json::json;

    #[tokio::test]
    async fn test_current_user_sees_full_profile() {
        let (ctx, _) = context();
        let tool = GetCurrentUser::new(ctx);
        let v = body(&tool.execute(&json!({}), &Identity::new(3, "bob")).await.unwrap());
        assert_eq!(v["login"], "bob");
        assert_eq!(v["mail"], "bob@example.net");
        assert_eq!(v["status"], "active");
    }
}
