use async_trait::async_trait;
use serde_json::{json, Value};

use super::{soften, ToolContext};
use crate::capabilities::arguments::{
    optional_date, optional_key, optional_str, optional_u64, required_f64,
};
use crate::capabilities::{ParamSpec, Tool, ToolResult};
use crate::errors::McpResult;
use crate::host::NewTimeEntry;
use crate::identity::Identity;

pub struct LogTime {
    ctx: ToolContext,
}

impl LogTime {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for LogTime {
    fn name(&self) -> &str {
        "log_time"
    }

    fn description(&self) -> &str {
        "Log time to an issue or project. Requires either issue_id OR project_id (not both). \
         Respects write protection settings."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("hours", "number", "Hours to log (e.g., 1.5 for 1 hour 30 minutes)"),
            ParamSpec::optional("activity_id", "integer", "Activity ID (uses the default if omitted)"),
            ParamSpec::optional(
                "issue_id",
                "integer",
                "Issue ID to log time against (required if project_id not provided)",
            ),
            ParamSpec::optional(
                "project_id",
                "string",
                "Project identifier or ID to log time against (required if issue_id not provided)",
            ),
            ParamSpec::optional("comments", "string", "Description of work done"),
            ParamSpec::optional(
                "spent_on",
                "string",
                "Date when time was spent (YYYY-MM-DD, default: today)",
            ),
        ]
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let hours = required_f64(arguments, "hours")?;
        let issue_id = optional_u64(arguments, "issue_id")?;
        let project_key = optional_key(arguments, "project_id");

        let project_id = match (issue_id, project_key) {
            (None, None) => {
                return Ok(ToolResult::error("Either issue_id or project_id is required"))
            }
            (Some(_), Some(_)) => {
                return Ok(ToolResult::error("Cannot specify both issue_id and project_id"))
            }
            (Some(_), None) => None,
            (None, Some(key)) => Some(self.ctx.host.project(identity, &key).await?.id),
        };

        let entry = NewTimeEntry {
            issue_id,
            project_id,
            hours,
            activity_id: optional_u64(arguments, "activity_id")?,
            comments: optional_str(arguments, "comments").unwrap_or_default().to_string(),
            spent_on: optional_date(arguments, "spent_on")?,
        };

        let entry = match soften(self.ctx.host.log_time(identity, entry).await, "log time")? {
            Ok(entry) => entry,
            Err(soft) => return Ok(soft),
        };
        log::info!(
            "Logged {}h on project {} for user {}",
            entry.hours,
            entry.project.id,
            identity.id
        );
        Ok(ToolResult::json(&json!({
            "id": entry.id,
            "message": "Time entry logged successfully",
            "hours": entry.hours,
            "project": entry.project,
            "issue_id": entry.issue.as_ref().map(|i| i.id),
            "activity": entry.activity,
            "spent_on": entry.spent_on,
        })))
    }
}
