use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::project_context;
use crate::capabilities::arguments::optional_str;
use crate::capabilities::{Prompt, PromptArgument, PromptMessage};
use crate::errors::McpResult;
use crate::host::HostData;
use crate::identity::Identity;

pub struct FeatureRequest {
    host: Arc<dyn HostData>,
}

impl FeatureRequest {
    pub fn new(host: Arc<dyn HostData>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Prompt for FeatureRequest {
    fn name(&self) -> &str {
        "feature_request"
    }

    fn description(&self) -> &str {
        "Generate a feature request template with acceptance criteria and user stories"
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        vec![
            PromptArgument::new("project_id", "Project identifier for context", false),
            PromptArgument::new("title", "Feature title or brief description", false),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<Vec<PromptMessage>> {
        let project = project_context(self.host.as_ref(), arguments, identity).await?;
        let title = optional_str(arguments, "title")
            .map(|t| format!("Feature: {}\n", t))
            .unwrap_or_default();

        Ok(vec![PromptMessage::user(format!(
            "Create a detailed feature request with the following structure:\n\
             \n\
             {project}{title}\n\
             Please include:\n\
             1. **Feature Title** - Clear, concise name for the feature\n\
             2. **Problem Statement** - What problem does this solve? Why is it needed?\n\
             3. **Proposed Solution** - High-level approach to solving the problem\n\
             4. **User Stories** - Format: \"As a [user type], I want [goal], so that [benefit]\"\n\
             5. **Acceptance Criteria** - Testable requirements (Given/When/Then format)\n\
             6. **Out of Scope** - What this feature explicitly does NOT include\n\
             7. **Dependencies** - Related features, systems, or requirements\n\
             8. **Additional Context** - Mockups, examples, or related research\n\
             \n\
             Format as a professional feature specification suitable for development.\n"
        ))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;
    use serde_json::json;

    #[tokio::test]
    async fn test_feature_request_title() {
        let prompt = FeatureRequest::new(Arc::new(InMemoryHost::demo()));
        let args = json!({"project_id": 2, "title": "Dark mode"});
        let messages = prompt.execute(&args, &Identity::new(4, "carol")).await.unwrap();
        let text = messages[0].content.as_text();
        assert!(text.contains("Project: Docs\nFeature: Dark mode\n"));
        assert!(text.contains("**User Stories**"));
    }
}
