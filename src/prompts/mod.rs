//! Built-in prompt catalog.
//!
//! Prompts render a single user message, optionally enriched with live host
//! data (project names, issue counts).

pub mod bug_report;
pub mod feature_request;
pub mod status_report;

use std::sync::Arc;

use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::capabilities::arguments::optional_key;
use crate::capabilities::CapabilityRegistry;
use crate::errors::{McpError, McpResult, RegistryError};
use crate::host::HostData;
use crate::identity::Identity;

/// Register every built-in prompt.
pub fn register_builtin(
    registry: &mut CapabilityRegistry,
    host: Arc<dyn HostData>,
) -> Result<(), RegistryError> {
    registry.register_prompt(Arc::new(bug_report::BugReport::new(host.clone())))?;
    registry.register_prompt(Arc::new(feature_request::FeatureRequest::new(host.clone())))?;
    registry.register_prompt(Arc::new(status_report::StatusReport::new(host)))?;
    Ok(())
}

/// A look-back window such as "2 weeks".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days(u32),
    Weeks(u32),
    Months(u32),
}

impl Default for Period {
    fn default() -> Self {
        Period::Weeks(2)
    }
}

static PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d+)\s*(day|week|month)s?$").unwrap());

impl Period {
    /// Parse `"N days"`, `"N weeks"` or `"N months"` (singular allowed,
    /// case-insensitive). Blank input is two weeks.
    pub fn parse(input: Option<&str>) -> McpResult<Self> {
        let raw = input.unwrap_or_default();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Period::default());
        }
        let invalid = || {
            McpError::invalid_params(format!(
                "Invalid period format: '{}'. Use format like '2 weeks', '30 days', or '1 month'",
                raw
            ))
        };
        let caps = PERIOD.captures(trimmed).ok_or_else(invalid)?;
        let n: u32 = caps[1].parse().map_err(|_| invalid())?;
        Ok(match caps[2].to_ascii_lowercase().as_str() {
            "day" => Period::Days(n),
            "week" => Period::Weeks(n),
            _ => Period::Months(n),
        })
    }

    /// The instant this period started, counting back from `now`.
    pub fn start_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Period::Days(n) => now - Duration::days(i64::from(n)),
            Period::Weeks(n) => now - Duration::weeks(i64::from(n)),
            Period::Months(n) => now
                .checked_sub_months(Months::new(n))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// `"Project: <name>\n"` when `project_id` is given, empty otherwise.
async fn project_context(
    host: &dyn HostData,
    arguments: &Value,
    identity: &Identity,
) -> McpResult<String> {
    match optional_key(arguments, "project_id") {
        Some(key) => {
            let project = host.project(identity, &key).await?;
            Ok(format!("Project: {}\n", project.name))
        }
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::INTERNAL_ERROR;
    use crate::host::InMemoryHost;
    use chrono::TimeZone;

    #[test]
    fn test_parse_period_forms() {
        assert_eq!(Period::parse(None).unwrap(), Period::Weeks(2));
        assert_eq!(Period::parse(Some("  ")).unwrap(), Period::Weeks(2));
        assert_eq!(Period::parse(Some("30 days")).unwrap(), Period::Days(30));
        assert_eq!(Period::parse(Some("1 week")).unwrap(), Period::Weeks(1));
        assert_eq!(Period::parse(Some("3Months")).unwrap(), Period::Months(3));
        assert_eq!(Period::parse(Some(" 2 WEEKS ")).unwrap(), Period::Weeks(2));
    }

    #[test]
    fn test_parse_period_rejects_other_shapes() {
        for bad in ["fortnight", "2 years", "-1 days", "2 weeks ago"] {
            let err = Period::parse(Some(bad)).unwrap_err();
            assert_eq!(err.code(), INTERNAL_ERROR);
            assert!(err.to_string().starts_with(&format!("Invalid period format: '{}'", bad)));
        }
    }

    #[test]
    fn test_period_start() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        assert_eq!(
            Period::Days(1).start_from(now),
            Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Period::Weeks(2).start_from(now),
            Utc.with_ymd_and_hms(2024, 3, 17, 12, 0, 0).unwrap()
        );
        // Month arithmetic clamps to the last day of the shorter month.
        assert_eq!(
            Period::Months(1).start_from(now),
            Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_builtin_catalog_registers() {
        let mut registry = CapabilityRegistry::new();
        register_builtin(&mut registry, Arc::new(InMemoryHost::demo())).unwrap();
        let names: Vec<String> = registry
            .prompts()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["bug_report", "feature_request", "status_report"]);
    }
}
