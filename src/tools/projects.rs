use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Page, ToolContext};
use crate::capabilities::arguments::{optional_bool, required_key};
use crate::capabilities::{ParamSpec, Tool, ToolResult};
use crate::errors::McpResult;
use crate::host::Project;
use crate::identity::Identity;

fn project_summary(project: &Project) -> Value {
    json!({
        "id": project.id,
        "identifier": project.identifier,
        "name": project.name,
        "description": project.description,
        "is_public": project.is_public,
        "created_on": project.created_on,
        "updated_on": project.updated_on,
    })
}

pub struct ListProjects {
    ctx: ToolContext,
}

impl ListProjects {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for ListProjects {
    fn name(&self) -> &str {
        "list_projects"
    }

    fn description(&self) -> &str {
        "List all projects visible to the current user. Returns paginated results with \
         project details including identifier, name, description, and visibility."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional(
                "limit",
                "integer",
                "Maximum number of results per page (respects server max_limit setting)",
            ),
            ParamSpec::optional("offset", "integer", "Number of results to skip for pagination"),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let page = Page::from_args(arguments, &self.ctx.settings.current());
        let projects = self.ctx.host.projects(identity).await?;
        let (projects, meta) = page.apply(projects);
        let list: Vec<Value> = projects.iter().map(project_summary).collect();
        Ok(ToolResult::json(&Value::Array(list)).with_meta(meta))
    }
}

pub struct GetProject {
    ctx: ToolContext,
}

impl GetProject {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetProject {
    fn name(&self) -> &str {
        "get_project"
    }

    fn description(&self) -> &str {
        "Retrieve detailed information about a specific project by identifier or numeric ID, \
         optionally including its enabled modules."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("project_id", "string", "Project identifier or numeric ID"),
            ParamSpec::optional(
                "include_modules",
                "boolean",
                "Include the list of enabled modules (default: true)",
            ),
        ]
    }

    async fn execute(&self, arguments: &Value, identity: &Identity) -> McpResult<ToolResult> {
        let key = required_key(arguments, "project_id")?;
        let project = self.ctx.host.project(identity, &key).await?;

        let mut body = project_summary(&project);
        if optional_bool(arguments, "include_modules")?.unwrap_or(true) {
            body["enabled_modules"] = json!(project.enabled_modules);
        }
        Ok(ToolResult::json(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RESOURCE_NOT_FOUND;
    use crate::tools::test_support::{body, context};

    #[tokio::test]
    async fn test_list_projects_respects_visibility_and_paging() {
        let (ctx, _) = context();
        let tool = ListProjects::new(ctx);

        let carol = Identity::new(4, "carol");
        let result = tool.execute(&json!({}), &carol).await.unwrap();
        let list = body(&result);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["identifier"], "docs");
        assert_eq!(result.meta.as_ref().unwrap()["total"], 1);

        let alice = Identity::new(2, "alice");
        let result = tool.execute(&json!({"limit": 1}), &alice).await.unwrap();
        assert_eq!(body(&result).as_array().unwrap().len(), 1);
        let meta = result.meta.unwrap();
        assert_eq!(meta["total"], 2);
        assert_eq!(meta["has_more"], true);
    }

    #[tokio::test]
    async fn test_get_project_by_identifier_or_id() {
        let (ctx, _) = context();
        let tool = GetProject::new(ctx);
        let alice = Identity::new(2, "alice");

        let v = body(&tool.execute(&json!({"project_id": "webapp"}), &alice).await.unwrap());
        assert_eq!(v["id"], 1);
        assert!(v["enabled_modules"].is_array());

        let args = json!({"project_id": 1, "include_modules": false});
        let v = body(&tool.execute(&args, &alice).await.unwrap());
        assert_eq!(v["identifier"], "webapp");
        assert!(v.get("enabled_modules").is_none());
    }

    #[tokio::test]
    async fn test_private_project_hidden_from_outsiders() {
        let (ctx, _) = context();
        let tool = GetProject::new(ctx);
        let carol = Identity::new(4, "carol");
        let err = tool
            .execute(&json!({"project_id": "webapp"}), &carol)
            .await
            .unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
        assert_eq!(err.to_string(), "Project not found: webapp");
    }
}
