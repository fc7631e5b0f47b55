//! # Host data collaborator
//!
//! The gateway never touches storage directly. Every tool, prompt and
//! resource read goes through [`HostData`], which answers on behalf of an
//! [`Identity`] and applies the host's visibility rules itself.
//!
//! Implementations classify failures with the shared taxonomy:
//!
//! | situation | error |
//! |---|---|
//! | record absent, or present but invisible to the caller | `ResourceNotFound` |
//! | record visible but the action is not allowed | `PermissionDenied` |
//! | module switched off for a project the caller can see | `PermissionDenied` |
//! | rejected input with a user-facing reason | `Validation` |
//! | storage failure | `Internal` |
//!
//! [`memory::InMemoryHost`] is a complete in-process implementation used by
//! the tests and the demo server.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::McpResult;
use crate::identity::Identity;

pub use memory::InMemoryHost;

/// Module name that gates wiki access.
pub const WIKI_MODULE: &str = "wiki";
/// Module name that gates time logging.
pub const TIME_TRACKING_MODULE: &str = "time_tracking";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// `{id, name}` pair used for every association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

impl NamedRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub is_public: bool,
    pub enabled_modules: Vec<String>,
    #[serde(skip)]
    pub member_ids: Vec<u64>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Project {
    pub fn module_enabled(&self, module: &str) -> bool {
        self.enabled_modules.iter().any(|m| m == module)
    }

    pub fn has_member(&self, user_id: u64) -> bool {
        self.member_ids.contains(&user_id)
    }

    pub fn to_ref(&self) -> NamedRef {
        NamedRef::new(self.id, self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub id: u64,
    pub user: NamedRef,
    pub notes: String,
    pub private_notes: bool,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    pub project: NamedRef,
    pub tracker: NamedRef,
    pub status: NamedRef,
    pub priority: NamedRef,
    pub author: NamedRef,
    pub assigned_to: Option<NamedRef>,
    pub subject: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub done_ratio: u8,
    pub estimated_hours: Option<f64>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub closed_on: Option<DateTime<Utc>>,
    pub journals: Vec<Journal>,
}

impl Issue {
    /// Listing shape: associations and timestamps, no body or history.
    pub fn summary_json(&self) -> Value {
        json!({
            "id": self.id,
            "project": self.project,
            "tracker": self.tracker,
            "status": self.status,
            "priority": self.priority,
            "subject": self.subject,
            "assigned_to": self.assigned_to,
            "created_on": self.created_on,
            "updated_on": self.updated_on,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    pub id: u64,
    pub name: String,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub login: String,
    pub firstname: String,
    pub lastname: String,
    pub mail: String,
    pub admin: bool,
    pub active: bool,
    pub created_on: DateTime<Utc>,
    pub last_login_on: Option<DateTime<Utc>>,
}

impl User {
    pub fn name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    pub fn to_ref(&self) -> NamedRef {
        NamedRef::new(self.id, self.name())
    }

    /// Profile as seen by `viewer`: full for admins and self, limited
    /// otherwise.
    pub fn profile_json(&self, viewer: &Identity) -> Value {
        if viewer.admin || viewer.id == self.id {
            json!({
                "id": self.id,
                "login": self.login,
                "firstname": self.firstname,
                "lastname": self.lastname,
                "mail": self.mail,
                "admin": self.admin,
                "status": if self.active { "active" } else { "locked" },
                "created_on": self.created_on,
                "last_login_on": self.last_login_on,
            })
        } else {
            json!({
                "id": self.id,
                "login": self.login,
                "firstname": self.firstname,
                "lastname": self.lastname,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    pub project: NamedRef,
    pub issue: Option<NamedRef>,
    pub user: NamedRef,
    pub activity: NamedRef,
    pub hours: f64,
    pub comments: String,
    pub spent_on: NaiveDate,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiPage {
    pub project_id: u64,
    pub title: String,
    pub text: String,
    pub author: NamedRef,
    pub updated_on: DateTime<Utc>,
}

/// What an attachment hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "container_type", rename_all = "snake_case")]
pub enum AttachmentContainer {
    Issue { container_id: u64 },
    Project { container_id: u64 },
    WikiPage { project_id: u64, title: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub filename: String,
    pub filesize: u64,
    pub content_type: String,
    pub description: String,
    pub author: Option<NamedRef>,
    pub container: AttachmentContainer,
    pub digest: String,
    pub created_on: DateTime<Utc>,
}

impl Attachment {
    pub fn download_url(&self) -> String {
        format!("/attachments/download/{}/{}", self.id, self.filename)
    }

    pub fn to_json(&self) -> Value {
        let mut v = json!({
            "id": self.id,
            "filename": self.filename,
            "filesize": self.filesize,
            "content_type": self.content_type,
            "description": self.description,
            "author": self.author,
            "created_on": self.created_on,
            "download_url": self.download_url(),
            "digest": self.digest,
        });
        if let (Value::Object(map), Ok(Value::Object(container))) =
            (&mut v, serde_json::to_value(&self.container))
        {
            map.extend(container);
        }
        v
    }
}

// ---------------------------------------------------------------------------
// Queries and commands
// ---------------------------------------------------------------------------

/// Status bucket for issue listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StatusFilter {
    /// Parse a client value. Unknown values mean no filtering.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("open") => StatusFilter::Open,
            Some("closed") => StatusFilter::Closed,
            Some(_) => StatusFilter::All,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueFilter {
    pub project_id: Option<u64>,
    pub status: StatusFilter,
    pub assigned_to_id: Option<u64>,
    pub tracker_id: Option<u64>,
    pub priority_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewIssue {
    pub project_id: u64,
    pub subject: String,
    pub description: Option<String>,
    pub tracker_id: Option<u64>,
    pub priority_id: Option<u64>,
    pub assigned_to_id: Option<u64>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub done_ratio: Option<u8>,
}

/// Partial update. `None` leaves a field alone; `assigned_to_id:
/// Some(None)` unassigns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueChanges {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status_id: Option<u64>,
    pub priority_id: Option<u64>,
    pub assigned_to_id: Option<Option<u64>>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub done_ratio: Option<u8>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTimeEntry {
    pub issue_id: Option<u64>,
    pub project_id: Option<u64>,
    pub hours: f64,
    pub activity_id: Option<u64>,
    pub comments: String,
    pub spent_on: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// HostData
// ---------------------------------------------------------------------------

/// Host application data, seen through one identity.
#[async_trait]
pub trait HostData: Send + Sync {
    /// Projects visible to `identity`, ordered by id.
    async fn projects(&self, identity: &Identity) -> McpResult<Vec<Project>>;

    /// One project by numeric id or identifier.
    async fn project(&self, identity: &Identity, id_or_identifier: &str) -> McpResult<Project>;

    /// Visible issues matching `filter`, ordered by id.
    async fn issues(&self, identity: &Identity, filter: &IssueFilter) -> McpResult<Vec<Issue>>;

    /// One issue, with journals the caller may read.
    async fn issue(&self, identity: &Identity, id: u64) -> McpResult<Issue>;

    async fn create_issue(&self, identity: &Identity, issue: NewIssue) -> McpResult<Issue>;

    async fn update_issue(
        &self,
        identity: &Identity,
        id: u64,
        changes: IssueChanges,
    ) -> McpResult<Issue>;

    /// Delete an issue and return it as it was.
    async fn delete_issue(&self, identity: &Identity, id: u64) -> McpResult<Issue>;

    async fn user(&self, identity: &Identity, id: u64) -> McpResult<User>;

    async fn current_user(&self, identity: &Identity) -> McpResult<User>;

    async fn time_entry(&self, identity: &Identity, id: u64) -> McpResult<TimeEntry>;

    async fn log_time(&self, identity: &Identity, entry: NewTimeEntry) -> McpResult<TimeEntry>;

    /// A wiki page of a project, by title.
    async fn wiki_page(
        &self,
        identity: &Identity,
        project_id_or_identifier: &str,
        title: &str,
    ) -> McpResult<WikiPage>;

    async fn attachment(&self, identity: &Identity, id: u64) -> McpResult<Attachment>;

    async fn issue_statuses(&self) -> McpResult<Vec<IssueStatus>>;
}
