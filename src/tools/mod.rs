//! Built-in tool catalog.
//!
//! Each tool is a thin shell: parse arguments, call [`HostData`], shape the
//! JSON. Visibility and permission rules live in the host. Shared paging and
//! sorting helpers are defined here.

pub mod issues;
pub mod projects;
pub mod time_entries;
pub mod users;
pub mod utility;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::capabilities::arguments::{lenient_i64, optional_str};
use crate::capabilities::{CapabilityRegistry, ToolResult};
use crate::config::{McpSettings, SettingsSource};
use crate::errors::{McpError, McpResult, RegistryError};
use crate::host::HostData;

/// Collaborators every built-in tool needs.
#[derive(Clone)]
pub struct ToolContext {
    pub host: Arc<dyn HostData>,
    pub settings: Arc<dyn SettingsSource>,
}

impl ToolContext {
    pub fn new(host: Arc<dyn HostData>, settings: Arc<dyn SettingsSource>) -> Self {
        Self { host, settings }
    }
}

/// Register every built-in tool.
pub fn register_builtin(
    registry: &mut CapabilityRegistry,
    ctx: &ToolContext,
) -> Result<(), RegistryError> {
    registry.register_tool(Arc::new(projects::ListProjects::new(ctx.clone())))?;
    registry.register_tool(Arc::new(projects::GetProject::new(ctx.clone())))?;
    registry.register_tool(Arc::new(issues::ListIssues::new(ctx.clone())))?;
    registry.register_tool(Arc::new(issues::GetIssue::new(ctx.clone())))?;
    registry.register_tool(Arc::new(issues::CreateIssue::new(ctx.clone())))?;
    registry.register_tool(Arc::new(issues::UpdateIssue::new(ctx.clone())))?;
    registry.register_tool(Arc::new(issues::DeleteIssue::new(ctx.clone())))?;
    registry.register_tool(Arc::new(time_entries::LogTime::new(ctx.clone())))?;
    registry.register_tool(Arc::new(users::GetCurrentUser::new(ctx.clone())))?;
    registry.register_tool(Arc::new(utility::ListStatuses::new(ctx.clone())))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// A page window taken from `limit` / `offset` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    /// `limit` defaults to the configured page size and is clamped to
    /// `[1, max_limit]`; a negative `offset` counts as 0.
    pub fn from_args(args: &Value, settings: &McpSettings) -> Self {
        let max = settings.max_limit() as i64;
        let limit = lenient_i64(args, "limit")
            .unwrap_or(settings.default_limit() as i64)
            .clamp(1, max.max(1));
        let offset = lenient_i64(args, "offset").unwrap_or(0).max(0);
        Self {
            limit: limit as u64,
            offset: offset as u64,
        }
    }

    /// Cut `items` down to this page and describe the cut.
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, Value) {
        let total = items.len() as u64;
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        let meta = json!({
            "total": total,
            "limit": self.limit,
            "offset": self.offset,
            "has_more": self.offset + self.limit < total,
        });
        (page, meta)
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Parse `"field"` or `"field:desc"` through a whitelist.
///
/// Blank input or a field outside `fields` yields `default`. Any direction
/// other than `desc` is ascending.
pub fn parse_sort<F: Copy>(
    args: &Value,
    fields: &[(&str, F)],
    default: (F, Direction),
) -> (F, Direction) {
    let Some(raw) = optional_str(args, "sort") else {
        return default;
    };
    let mut parts = raw.splitn(2, ':');
    let name = parts.next().unwrap_or_default().trim();
    let Some((_, field)) = fields.iter().find(|(n, _)| *n == name) else {
        return default;
    };
    let direction = match parts.next().map(|d| d.trim().to_ascii_lowercase()) {
        Some(d) if d == "desc" => Direction::Desc,
        _ => Direction::Asc,
    };
    (*field, direction)
}

// ---------------------------------------------------------------------------
// Result helpers
// ---------------------------------------------------------------------------

/// Turn host validation failures into a soft tool error prefixed with
/// `action`; every other failure stays a hard error.
pub(crate) fn soften<T>(result: McpResult<T>, action: &str) -> McpResult<Result<T, ToolResult>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(McpError::Validation(message)) => {
            Ok(Err(ToolResult::error(format!("Failed to {}: {}", action, message))))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::SharedSettings;
    use crate::host::InMemoryHost;

    pub fn context() -> (ToolContext, SharedSettings) {
        let settings = SharedSettings::new(McpSettings::default());
        let ctx = ToolContext::new(Arc::new(InMemoryHost::demo()), Arc::new(settings.clone()));
        (ctx, settings)
    }

    /// Parse the JSON text of a tool result.
    pub fn body(result: &ToolResult) -> Value {
        serde_json::from_str(result.text().unwrap_or_default()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(default_limit: i64, max_limit: i64) -> McpSettings {
        McpSettings {
            default_limit,
            max_limit,
            ..McpSettings::default()
        }
    }

    #[test]
    fn test_page_defaults_and_clamps() {
        let s = settings(25, 100);
        assert_eq!(Page::from_args(&json!({}), &s), Page { limit: 25, offset: 0 });
        assert_eq!(Page::from_args(&json!({"limit": 500}), &s).limit, 100);
        assert_eq!(Page::from_args(&json!({"limit": 0}), &s).limit, 1);
        assert_eq!(Page::from_args(&json!({"limit": "-3"}), &s).limit, 1);
        assert_eq!(Page::from_args(&json!({"offset": -10}), &s).offset, 0);
        assert_eq!(Page::from_args(&json!({"limit": "junk"}), &s).limit, 25);
    }

    #[test]
    fn test_page_floors_bad_settings() {
        let s = settings(0, -5);
        assert_eq!(Page::from_args(&json!({}), &s).limit, 1);
        assert_eq!(Page::from_args(&json!({"limit": 10}), &s).limit, 1);
    }

    #[test]
    fn test_page_apply_meta() {
        let page = Page { limit: 2, offset: 1 };
        let (items, meta) = page.apply(vec![1, 2, 3, 4]);
        assert_eq!(items, vec![2, 3]);
        assert_eq!(meta, json!({"total": 4, "limit": 2, "offset": 1, "has_more": true}));

        let (items, meta) = Page { limit: 10, offset: 3 }.apply(vec![1, 2, 3, 4]);
        assert_eq!(items, vec![4]);
        assert_eq!(meta["has_more"], false);
    }

    #[test]
    fn test_parse_sort_whitelist() {
        let fields = [("id", 0u8), ("priority", 1u8)];
        let default = (0u8, Direction::Desc);
        assert_eq!(parse_sort(&json!({}), &fields, default), default);
        assert_eq!(
            parse_sort(&json!({"sort": "priority"}), &fields, default),
            (1, Direction::Asc)
        );
        assert_eq!(
            parse_sort(&json!({"sort": "priority:DESC"}), &fields, default),
            (1, Direction::Desc)
        );
        assert_eq!(
            parse_sort(&json!({"sort": "id:sideways"}), &fields, default),
            (0, Direction::Asc)
        );
        assert_eq!(parse_sort(&json!({"sort": "password:desc"}), &fields, default), default);
    }

    #[test]
    fn test_builtin_catalog_registers() {
        let (ctx, _) = test_support::context();
        let mut registry = CapabilityRegistry::new();
        register_builtin(&mut registry, &ctx).unwrap();
        assert_eq!(registry.stats().tools, 10);
    }
}
