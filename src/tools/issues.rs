//! Issue tools: list, get, create, update, delete.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{parse_sort, soften, Direction, Page, ToolContext};
use crate::capabilities::arguments::{
    optional_bool, optional_date, optional_f64, optional_key, optional_str, optional_u64,
    required_key, required_str, required_u64,
};
use crate::capabilities::{ParamSpec, Tool, ToolResult};
use crate::errors::{McpError, McpResult};
use crate::host::{Issue, IssueChanges, IssueFilter, NewIssue, StatusFilter};
use crate::identity::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortField {
    Id,
    Project,
    Tracker,
    Status,
    Priority,
    Author,
    AssignedTo,
    UpdatedOn,
    CreatedOn,
    StartDate,
    DueDate,
    EstimatedHours,
    DoneRatio,
}

const SORT_FIELDS: &[(&str, SortField)] = &[
    ("id", SortField::Id),
    ("project", SortField::Project),
    ("tracker", SortField::Tracker),
    ("status", SortField::Status),
    ("priority", SortField::Priority),
    ("author", SortField::Author),
    ("assigned_to", SortField::AssignedTo),
    ("updated_on", SortField::UpdatedOn),
    ("created_on", SortField::CreatedOn),
    ("start_date", SortField::StartDate),
    ("due_date", SortField::DueDate),
    ("estimated_hours", SortField::EstimatedHours),
    ("done_ratio", SortField::DoneRatio),
];

fn compare(field: SortField, a: &Issue, b: &Issue) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Project => a.project.id.cmp(&b.project.id),
        SortField::Tracker => a.tracker.id.cmp(&b.tracker.id),
        SortField::Status => a.status.id.cmp(&b.status.id),
        SortField::Priority => a.priority.id.cmp(&b.priority.id),
        SortField::Author => a.author.id.cmp(&b.author.id),
        SortField::AssignedTo => {
            let key = |i: &Issue| i.assigned_to.as_ref().map(|r| r.id);
            key(a).cmp(&key(b))
        }
        SortField::UpdatedOn => a.updated_on.cmp(&b.updated_on),
        SortField::CreatedOn => a.created_on.cmp(&b.created_on),
        SortField::StartDate => a.start_date.cmp(&b.start_date),
        SortField::DueDate => a.due_date.cmp(&b.due_date),
        SortField::EstimatedHours => a
            .estimated_hours
            .partial_cmp(&b.estimated_hours)
            .unwrap_or(Ordering::Equal),
        SortField::DoneRatio => a.done_ratio.cmp(&b.done_ratio),
    }
}

/// Listing row for create/update results.
fn write_result(issue: &Issue) -> Value {
    json!({
        "id": issue.id,
        "project": issue.project,
        "tracker": issue.tracker,
        "status": issue.status,
        "priority": issue.priority,
        "subject": issue.subject,
        "author": issue.author,
        "assigned_to": issue.assigned_to,
        "created_on": issue.created_on,
        "updated_on": issue.updated_on,
    })
}

fn done_ratio(arguments: &Value) -> McpResult<Option<u8>> {
    optional_u64(arguments, "done_ratio")?
        .map(|r| {
            u8::try_from(r).map_err(|_| {
                McpError::invalid_params("Parameter 'done_ratio' must be between 0 and 100")
            })
        })
        .transpose()
}

// ---------------------------------------------------------------------------
// list_issues
// ---------------------------------------------------------------------------

pub struct ListIssues {
    ctx: ToolContext,
}

impl ListIssues {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListIssues {
    fn name(&self) -> &str {
        "list_issues"
    }

    fn description(&self) -> &str {
        "List issues with optional filters for project, status, assignee, tracker, and priority. \
         Returns paginated results with issue details including project, tracker, status, \
         priority, subject, assignee, and timestamps."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("project_id", "string", "Filter by project identifier or numeric ID"),
            ParamSpec::optional(
                "status",
                "string",
                "Filter by status: open, closed, or all (default: open)",
            )
            .one_of(&["open", "closed", "all"]),
            ParamSpec::optional("assigned_to_id", "integer", "Filter by assignee user ID"),
            ParamSpec::optional("tracker_id", "integer", "Filter by tracker ID"),
            ParamSpec::optional("priority_id", "integer", "Filter by priority ID"),
            ParamSpec::optional(
                "limit",
                "integer",
                "Maximum number of results per page (respects server max_limit setting)",
            ),
            ParamSpec::optional("offset", "integer", "Number of results to skip for pagination"),
            ParamSpec::optional(
                "sort",
                "string",
                "Sort field with optional :desc suffix (e.g., \"created_on:desc\", \"priority\")",
            ),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let page = Page::from_args(arguments, &self.ctx.settings.current());

        let project_id = match optional_key(arguments, "project_id") {
            Some(key) => Some(self.ctx.host.project(identity, &key).await?.id),
            None => None,
        };
        let filter = IssueFilter {
            project_id,
            status: StatusFilter::parse(optional_str(arguments, "status")),
            assigned_to_id: optional_u64(arguments, "assigned_to_id")?,
            tracker_id: optional_u64(arguments, "tracker_id")?,
            priority_id: optional_u64(arguments, "priority_id")?,
        };

        let mut issues = self.ctx.host.issues(identity, &filter).await?;
        let (field, direction) = parse_sort(arguments, SORT_FIELDS, (SortField::Id, Direction::Desc));
        issues.sort_by(|a, b| match direction {
            Direction::Asc => compare(field, a, b),
            Direction::Desc => compare(field, b, a),
        });

        let (issues, meta) = page.apply(issues);
        let list: Vec<Value> = issues.iter().map(Issue::summary_json).collect();
        Ok(ToolResult::json(&Value::Array(list)).with_meta(meta))
    }
}

// ---------------------------------------------------------------------------
// get_issue
// ---------------------------------------------------------------------------

pub struct GetIssue {
    ctx: ToolContext,
}

impl GetIssue {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetIssue {
    fn name(&self) -> &str {
        "get_issue"
    }

    fn description(&self) -> &str {
        "Retrieve a single issue by ID with full details. Optionally include journals \
         (comments/history) the current user is allowed to read."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("issue_id", "integer", "Issue ID"),
            ParamSpec::optional(
                "include_journals",
                "boolean",
                "Include journal entries (default: true)",
            ),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let id = required_u64(arguments, "issue_id")?;
        let issue = self.ctx.host.issue(identity, id).await?;
        let mut body = serde_json::to_value(&issue).map_err(|e| McpError::Internal(e.into()))?;
        if !optional_bool(arguments, "include_journals")?.unwrap_or(true) {
            if let Value::Object(map) = &mut body {
                map.remove("journals");
            }
        }
        Ok(ToolResult::json(&body))
    }
}

// ---------------------------------------------------------------------------
// create_issue
// ---------------------------------------------------------------------------

pub struct CreateIssue {
    ctx: ToolContext,
}

impl CreateIssue {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CreateIssue {
    fn name(&self) -> &str {
        "create_issue"
    }

    fn description(&self) -> &str {
        "Create a new issue in a project. Requires at minimum a project and subject. \
         Supports setting tracker, priority, assignee, dates, and progress. Returns the \
         created issue on success or validation errors on failure."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required(
                "project_id",
                "string",
                "Project identifier or numeric ID where issue will be created",
            ),
            ParamSpec::required("subject", "string", "Issue subject/title"),
            ParamSpec::optional("description", "string", "Issue description/details"),
            ParamSpec::optional("tracker_id", "integer", "Tracker ID (uses the first tracker if omitted)"),
            ParamSpec::optional("priority_id", "integer", "Priority ID (uses the default if omitted)"),
            ParamSpec::optional("assigned_to_id", "integer", "Assignee user ID"),
            ParamSpec::optional("start_date", "string", "Start date in YYYY-MM-DD format"),
            ParamSpec::optional("due_date", "string", "Due date in YYYY-MM-DD format"),
            ParamSpec::optional("estimated_hours", "number", "Estimated hours (decimal)"),
            ParamSpec::optional("done_ratio", "integer", "Percent complete (0-100)"),
        ]
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let key = required_key(arguments, "project_id")?;
        let subject = required_str(arguments, "subject")?;
        let project = self.ctx.host.project(identity, &key).await?;

        let new = NewIssue {
            project_id: project.id,
            subject: subject.to_string(),
            description: optional_str(arguments, "description").map(str::to_string),
            tracker_id: optional_u64(arguments, "tracker_id")?,
            priority_id: optional_u64(arguments, "priority_id")?,
            assigned_to_id: optional_u64(arguments, "assigned_to_id")?,
            start_date: optional_date(arguments, "start_date")?,
            due_date: optional_date(arguments, "due_date")?,
            estimated_hours: optional_f64(arguments, "estimated_hours")?,
            done_ratio: done_ratio(arguments)?,
        };

        match soften(self.ctx.host.create_issue(identity, new).await, "create issue")? {
            Ok(issue) => Ok(ToolResult::json(&write_result(&issue))),
            Err(soft) => Ok(soft),
        }
    }
}

// ---------------------------------------------------------------------------
// update_issue
// ---------------------------------------------------------------------------

pub struct UpdateIssue {
    ctx: ToolContext,
}

impl UpdateIssue {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for UpdateIssue {
    fn name(&self) -> &str {
        "update_issue"
    }

    fn description(&self) -> &str {
        "Update an existing issue. Can modify status, assignee, dates, and other fields. \
         Optionally add a journal note to document the changes."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("issue_id", "integer", "Issue ID to update"),
            ParamSpec::optional("subject", "string", "New subject/title"),
            ParamSpec::optional("description", "string", "New description"),
            ParamSpec::optional("status_id", "integer", "New status ID"),
            ParamSpec::optional("priority_id", "integer", "New priority ID"),
            ParamSpec::optional(
                "assigned_to_id",
                "integer",
                "New assignee user ID (null to unassign)",
            ),
            ParamSpec::optional("start_date", "string", "New start date (YYYY-MM-DD)"),
            ParamSpec::optional("due_date", "string", "New due date (YYYY-MM-DD)"),
            ParamSpec::optional("estimated_hours", "number", "New estimated hours"),
            ParamSpec::optional("done_ratio", "integer", "New percent complete (0-100)"),
            ParamSpec::optional("notes", "string", "Journal note to document this change"),
        ]
    }

    fn mutating(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let id = required_u64(arguments, "issue_id")?;

        // Present-but-null unassigns; absent leaves the assignee alone.
        let assigned_to_id = match arguments.get("assigned_to_id") {
            None => None,
            Some(Value::Null) => Some(None),
            Some(_) => Some(optional_u64(arguments, "assigned_to_id")?),
        };

        let changes = IssueChanges {
            subject: arguments
                .get("subject")
                .and_then(Value::as_str)
                .map(str::to_string),
            description: arguments
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            status_id: optional_u64(arguments, "status_id")?,
            priority_id: optional_u64(arguments, "priority_id")?,
            assigned_to_id,
            start_date: optional_date(arguments, "start_date")?,
            due_date: optional_date(arguments, "due_date")?,
            estimated_hours: optional_f64(arguments, "estimated_hours")?,
            done_ratio: done_ratio(arguments)?,
            notes: optional_str(arguments, "notes").map(str::to_string),
        };

        match soften(self.ctx.host.update_issue(identity, id, changes).await, "update issue")? {
            Ok(issue) => Ok(ToolResult::json(&write_result(&issue))),
            Err(soft) => Ok(soft),
        }
    }
}

// ---------------------------------------------------------------------------
// delete_issue
// ---------------------------------------------------------------------------

pub struct DeleteIssue {
    ctx: ToolContext,
}

impl DeleteIssue {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for DeleteIssue {
    fn name(&self) -> &str {
        "delete_issue"
    }

    fn description(&self) -> &str {
        "Delete an issue. This action is irreversible and also deletes the issue's \
         journals and time entries. Use with caution."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("issue_id", "integer", "Issue ID to delete")]
    }

    fn mutating(&self) -> bool {
        true
    }

    fn is_available_to(&self, identity: &Identity) -> bool {
        identity.admin
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let id = required_u64(arguments, "issue_id")?;
        let issue = self.ctx.host.delete_issue(identity, id).await?;
        log::info!("Issue #{} deleted by user {}", issue.id, identity.id);
        Ok(ToolResult::json(&json!({
            "message": "Issue deleted successfully",
            "deleted_issue": {
                "id": issue.id,
                "project": issue.project,
                "tracker": issue.tracker,
                "subject": issue.subject,
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PERMISSION_DENIED, RESOURCE_NOT_FOUND};
    use crate::tools::test_support::{body, context};

    fn alice() -> Identity {
        Identity::new(2, "alice")
    }

    fn carol() -> Identity {
        Identity::new(4, "carol")
    }

    fn admin() -> Identity {
        Identity::new(1, "admin").with_admin(true)
    }

    fn ids(v: &Value) -> Vec<u64> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_list_issues_default_open_newest_first() {
        let (ctx, _) = context();
        let tool = ListIssues::new(ctx);
        let result = tool.execute(&json!({}), &alice()).await.unwrap();
        assert_eq!(ids(&body(&result)), vec![4, 2, 1]);
        assert_eq!(result.meta.unwrap()["total"], 3);
    }

    #[tokio::test]
    async fn test_list_issues_filters() {
        let (ctx, _) = context();
        let tool = ListIssues::new(ctx);

        let args = json!({"project_id": "webapp", "status": "closed"});
        let v = body(&tool.execute(&args, &alice()).await.unwrap());
        assert_eq!(ids(&v), vec![3]);

        let args = json!({"project_id": "webapp", "status": "all", "sort": "id"});
        let v = body(&tool.execute(&args, &alice()).await.unwrap());
        assert_eq!(ids(&v), vec![1, 2, 3]);

        let args = json!({"status": "bogus", "sort": "id:asc", "limit": 2, "offset": 1});
        let result = tool.execute(&args, &alice()).await.unwrap();
        assert_eq!(ids(&body(&result)), vec![2, 3]);
        assert_eq!(result.meta.unwrap()["has_more"], true);

        let v = body(&tool.execute(&json!({}), &carol()).await.unwrap());
        assert_eq!(ids(&v), vec![4]);
    }

    #[tokio::test]
    async fn test_list_issues_unknown_project() {
        let (ctx, _) = context();
        let tool = ListIssues::new(ctx);
        let err = tool
            .execute(&json!({"project_id": "webapp"}), &carol())
            .await
            .unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_issue_journals() {
        let (ctx, _) = context();
        let tool = GetIssue::new(ctx);
        let v = body(&tool.execute(&json!({"issue_id": 1}), &alice()).await.unwrap());
        assert_eq!(v["journals"].as_array().unwrap().len(), 2);

        let args = json!({"issue_id": "1", "include_journals": false});
        let v = body(&tool.execute(&args, &alice()).await.unwrap());
        assert!(v.get("journals").is_none());

        let err = tool.execute(&json!({}), &alice()).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: issue_id");
    }

    #[tokio::test]
    async fn test_create_issue() {
        let (ctx, _) = context();
        let tool = CreateIssue::new(ctx.clone());
        let args = json!({
            "project_id": "webapp",
            "subject": "Export fails for large projects",
            "priority_id": 3,
            "due_date": "2030-01-31"
        });
        let result = tool.execute(&args, &alice()).await.unwrap();
        assert!(!result.is_error);
        let v = body(&result);
        assert_eq!(v["id"], 5);
        assert_eq!(v["priority"]["name"], "High");
        assert_eq!(v["status"]["name"], "New");

        let stored = ctx.host.issue(&alice(), 5).await.unwrap();
        assert_eq!(stored.subject, "Export fails for large projects");
    }

    #[tokio::test]
    async fn test_create_issue_validation_is_soft() {
        let (ctx, _) = context();
        let tool = CreateIssue::new(ctx);
        let args = json!({"project_id": "webapp", "subject": "x", "tracker_id": 99});
        let result = tool.execute(&args, &alice()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), Some("Failed to create issue: Tracker is invalid"));
    }

    #[tokio::test]
    async fn test_create_issue_permission() {
        let (ctx, _) = context();
        let tool = CreateIssue::new(ctx);
        let args = json!({"project_id": "docs", "subject": "Typo"});
        let err = tool.execute(&args, &carol()).await.unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_update_issue_assign_and_unassign() {
        let (ctx, _) = context();
        let tool = UpdateIssue::new(ctx.clone());

        let args = json!({"issue_id": 1, "assigned_to_id": 3, "status_id": 2, "notes": "Taking it"});
        let v = body(&tool.execute(&args, &alice()).await.unwrap());
        assert_eq!(v["assigned_to"]["id"], 3);
        assert_eq!(v["status"]["name"], "In Progress");

        let args = json!({"issue_id": 1, "assigned_to_id": null});
        let v = body(&tool.execute(&args, &alice()).await.unwrap());
        assert!(v["assigned_to"].is_null());

        let stored = ctx.host.issue(&alice(), 1).await.unwrap();
        assert_eq!(stored.journals.last().unwrap().notes, "Taking it");
    }

    #[tokio::test]
    async fn test_update_issue_soft_failure() {
        let (ctx, _) = context();
        let tool = UpdateIssue::new(ctx);
        let args = json!({"issue_id": 1, "subject": "   "});
        let result = tool.execute(&args, &alice()).await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), Some("Failed to update issue: Subject cannot be blank"));
    }

    #[tokio::test]
    async fn test_done_ratio_range() {
        let (ctx, _) = context();
        let tool = UpdateIssue::new(ctx);
        let err = tool
            .execute(&json!({"issue_id": 1, "done_ratio": 1000}), &alice())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'done_ratio' must be between 0 and 100");
    }

    #[tokio::test]
    async fn test_delete_issue_admin_only() {
        let (ctx, _) = context();
        let tool = DeleteIssue::new(ctx);
        assert!(!tool.is_available_to(&alice()));
        assert!(tool.is_available_to(&admin()));

        let err = tool.execute(&json!({"issue_id": 2}), &alice()).await.unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);

        let v = body(&tool.execute(&json!({"issue_id": 2}), &admin()).await.unwrap());
        assert_eq!(v["deleted_issue"]["id"], 2);
        let err = tool.execute(&json!({"issue_id": 2}), &admin()).await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
    }
}
