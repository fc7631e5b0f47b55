use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::Period;
use crate::capabilities::arguments::{optional_key, optional_str};
use crate::capabilities::{Prompt, PromptArgument, PromptMessage};
use crate::errors::{McpError, McpResult};
use crate::host::{HostData, IssueFilter, StatusFilter};
use crate::identity::Identity;

/// Status report seeded with live issue counts for a look-back period.
pub struct StatusReport {
    host: Arc<dyn HostData>,
}

impl StatusReport {
    pub fn new(host: Arc<dyn HostData>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl Prompt for StatusReport {
    fn name(&self) -> &str {
        "status_report"
    }

    fn description(&self) -> &str {
        "Generate a project status report from live data for a specified period"
    }

    fn arguments(&self) -> Vec<PromptArgument> {
        vec![
            PromptArgument::new("project_id", "Project identifier to report on", true),
            PromptArgument::new(
                "period",
                "Time period (e.g., \"2 weeks\", \"30 days\", \"1 month\")",
                false,
            ),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<Vec<PromptMessage>> {
        let key = optional_key(arguments, "project_id")
            .ok_or_else(|| McpError::invalid_params("Missing required argument: project_id"))?;
        let project = self.host.project(identity, &key).await?;

        let period_label = optional_str(arguments, "period").unwrap_or("2 weeks");
        let now = Utc::now();
        let since = Period::parse(Some(period_label))?.start_from(now);
        let in_window = |t: DateTime<Utc>| t >= since && t <= now;

        let filter = |status| IssueFilter {
            project_id: Some(project.id),
            status,
            ..IssueFilter::default()
        };
        let closed = self
            .host
            .issues(identity, &filter(StatusFilter::Closed))
            .await?
            .iter()
            .filter(|i| in_window(i.updated_on))
            .count();
        let opened = self
            .host
            .issues(identity, &filter(StatusFilter::All))
            .await?
            .iter()
            .filter(|i| in_window(i.created_on))
            .count();
        let active = self
            .host
            .issues(identity, &filter(StatusFilter::Open))
            .await?
            .len();

        Ok(vec![PromptMessage::user(format!(
            "Generate a status report for project '{}' covering the last {}.\n\
             \n\
             Data summary:\n\
             - Issues closed: {}\n\
             - Issues opened: {}\n\
             - Active issues: {}\n\
             \n\
             Please format as a professional status update including:\n\
             1. Executive summary\n\
             2. Key accomplishments\n\
             3. Current focus areas\n\
             4. Blockers or risks\n\
             5. Next steps\n",
            project.name, period_label, closed, opened, active
        ))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{INTERNAL_ERROR, RESOURCE_NOT_FOUND};
    use crate::host::InMemoryHost;
    use serde_json::json;

    fn prompt() -> StatusReport {
        StatusReport::new(Arc::new(InMemoryHost::demo()))
    }

    fn alice() -> Identity {
        Identity::new(2, "alice")
    }

    #[tokio::test]
    async fn test_status_report_counts() {
        let messages = prompt()
            .execute(&json!({"project_id": "webapp"}), &alice())
            .await
            .unwrap();
        let text = messages[0].content.as_text();
        assert!(text.starts_with(
            "Generate a status report for project 'Webapp' covering the last 2 weeks."
        ));
        assert!(text.contains("- Issues closed: 1\n"));
        assert!(text.contains("- Issues opened: 3\n"));
        assert!(text.contains("- Active issues: 2\n"));
    }

    #[tokio::test]
    async fn test_status_report_short_period_excludes_older_work() {
        let args = json!({"project_id": "webapp", "period": "3 days"});
        let messages = prompt().execute(&args, &alice()).await.unwrap();
        let text = messages[0].content.as_text();
        assert!(text.contains("covering the last 3 days."));
        assert!(text.contains("- Issues closed: 0\n"));
        assert!(text.contains("- Issues opened: 2\n"));
    }

    #[tokio::test]
    async fn test_status_report_argument_errors() {
        let err = prompt().execute(&json!({}), &alice()).await.unwrap_err();
        assert_eq!(err.code(), INTERNAL_ERROR);
        assert_eq!(err.to_string(), "Missing required argument: project_id");

        let args = json!({"project_id": "webapp", "period": "a while"});
        let err = prompt().execute(&args, &alice()).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid period format: 'a while'"));

        let args = json!({"project_id": "webapp"});
        let err = prompt()
            .execute(&args, &Identity::new(4, "carol"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
    }
}
