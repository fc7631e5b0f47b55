use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::project_context;
use crate::capabilities::arguments::optional_str;
use crate::capabilities::{Prompt, PromptArgument, PromptMessage};
use crate::errors::McpResult;
use crate::host::HostData;
use crate::identity::Identity;

/// Structured bug report template with steps to reproduce.
pub struct BugReport {
    host: Arc<dyn HostData>,
}

impl BugReport {
    pub fn new(host: Arc<dyn HostData>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Prompt for BugReport {
    fn name(&self) -> &str {
        "bug_report"
    }

    fn description(&self) -> &str {
        "Generate a structured bug report template with steps to reproduce"
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        vec![
            PromptArgument::new("project_id", "Project identifier for context", false),
            PromptArgument::new("summary", "Brief summary of the bug", false),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<Vec<PromptMessage>> {
        let project = project_context(self.host.as_ref(), arguments, identity).await?;
        let summary = optional_str(arguments, "summary")
            .map(|s| format!("Summary: {}\n", s))
            .unwrap_or_default();

        Ok(vec![PromptMessage::user(format!(
            "Create a detailed bug report with the following structure:\n\
             \n\
             {project}{summary}\n\
             Please include:\n\
             1. **Summary** - One-line description of the issue\n\
             2. **Environment** - Browser, OS, version info\n\
             3. **Steps to Reproduce** - Numbered steps\n\
             4. **Expected Behavior** - What should happen\n\
             5. **Actual Behavior** - What actually happens\n\
             6. **Screenshots/Logs** - Placeholder for attachments\n\
             7. **Severity** - Critical/High/Medium/Low\n\
             8. **Additional Context** - Any other relevant info\n\
             \n\
             Format as a professional bug report suitable for a developer.\n"
        ))])
    }
}
