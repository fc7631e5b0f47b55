//! In-process host with the usual visibility rules.
//!
//! - A project is visible to admins, to its members, and to everyone when
//!   public.
//! - Issues, time entries and wiki pages follow their project.
//! - Another user is visible to admins, and to users sharing a project
//!   while active.
//! - Private journal notes are shown to admins and project members only.
//! - Writes need project membership; deleting issues needs an admin.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::*;
use crate::errors::{McpError, McpResult};
use crate::identity::{Identity, IdentityResolver};

#[derive(Debug, Default)]
struct HostState {
    users: BTreeMap<u64, User>,
    projects: BTreeMap<u64, Project>,
    issues: BTreeMap<u64, Issue>,
    time_entries: BTreeMap<u64, TimeEntry>,
    wiki_pages: Vec<WikiPage>,
    attachments: BTreeMap<u64, Attachment>,
    statuses: Vec<IssueStatus>,
    trackers: Vec<NamedRef>,
    priorities: Vec<NamedRef>,
    activities: Vec<NamedRef>,
    api_keys: HashMap<String, u64>,
    next_journal_id: u64,
}

impl HostState {
    fn project_visible(&self, project: &Project, identity: &Identity) -> bool {
        identity.admin || project.is_public || project.has_member(identity.id)
    }

    fn can_write(&self, project: &Project, identity: &Identity) -> bool {
        identity.admin || project.has_member(identity.id)
    }

    fn visible_project(&self, identity: &Identity, key: &str) -> McpResult<&Project> {
        let key = key.trim();
        self.projects
            .values()
            .find(|p| p.identifier == key || p.id.to_string() == key)
            .filter(|p| self.project_visible(p, identity))
            .ok_or_else(|| McpError::not_found(format!("Project not found: {}", key)))
    }

    fn visible_project_by_id(&self, identity: &Identity, id: u64) -> McpResult<&Project> {
        self.visible_project(identity, &id.to_string())
    }

    fn issue_visible(&self, issue: &Issue, identity: &Identity) -> bool {
        self.projects
            .get(&issue.project.id)
            .map(|p| self.project_visible(p, identity))
            .unwrap_or(false)
    }

    fn visible_issue(&self, identity: &Identity, id: u64) -> McpResult<&Issue> {
        self.issues
            .get(&id)
            .filter(|i| self.issue_visible(i, identity))
            .ok_or_else(|| McpError::not_found(format!("Issue #{} not found or not accessible", id)))
    }

    fn user_ref(&self, id: u64) -> McpResult<NamedRef> {
        self.users
            .get(&id)
            .map(User::to_ref)
            .ok_or_else(|| McpError::Validation(format!("Assignee #{} does not exist", id)))
    }

    fn status_closed(&self, status_id: u64) -> bool {
        self.statuses
            .iter()
            .any(|s| s.id == status_id && s.is_closed)
    }

    fn lookup(list: &[NamedRef], id: Option<u64>, what: &str) -> McpResult<NamedRef> {
        match id {
            Some(id) => list
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or_else(|| McpError::Validation(format!("{} is invalid", what))),
            None => list
                .first()
                .cloned()
                .ok_or_else(|| McpError::Validation(format!("{} cannot be blank", what))),
        }
    }

    fn shares_project(&self, a: u64, b: u64) -> bool {
        self.projects
            .values()
            .any(|p| p.has_member(a) && p.has_member(b))
    }

    fn next_id<T>(map: &BTreeMap<u64, T>) -> u64 {
        map.keys().next_back().map_or(1, |k| k + 1)
    }
}

/// A complete [`HostData`] kept in memory.
#[derive(Debug)]
pub struct InMemoryHost {
    state: RwLock<HostState>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    /// Empty host with the stock statuses, trackers, priorities and
    /// activities.
    pub fn new() -> Self {
        let state = HostState {
            statuses: vec![
                IssueStatus { id: 1, name: "New".into(), is_closed: false },
                IssueStatus { id: 2, name: "In Progress".into(), is_closed: false },
                IssueStatus { id: 3, name: "Resolved".into(), is_closed: false },
                IssueStatus { id: 5, name: "Closed".into(), is_closed: true },
                IssueStatus { id: 6, name: "Rejected".into(), is_closed: true },
            ],
            trackers: vec![
                NamedRef::new(1, "Bug"),
                NamedRef::new(2, "Feature"),
                NamedRef::new(3, "Support"),
            ],
            priorities: vec![
                NamedRef::new(2, "Normal"),
                NamedRef::new(1, "Low"),
                NamedRef::new(3, "High"),
                NamedRef::new(4, "Urgent"),
            ],
            activities: vec![NamedRef::new(8, "Design"), NamedRef::new(9, "Development")],
            next_journal_id: 1,
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    // ========== Seeding ==========

    /// Add a user. Login doubles as first name.
    pub fn with_user(self, id: u64, login: &str, admin: bool) -> Self {
        self.state.write().users.insert(
            id,
            User {
                id,
                login: login.to_string(),
                firstname: capitalize(login),
                lastname: "User".to_string(),
                mail: format!("{}@example.net", login),
                admin,
                active: true,
                created_on: Utc::now(),
                last_login_on: None,
            },
        );
        self
    }

    /// Lock a user: they stop resolving and stop being visible to others.
    pub fn with_locked_user(self, id: u64) -> Self {
        if let Some(user) = self.state.write().users.get_mut(&id) {
            user.active = false;
        }
        self
    }

    /// Add a project with the wiki and time tracking modules enabled.
    pub fn with_project(self, id: u64, identifier: &str, is_public: bool, member_ids: &[u64]) -> Self {
        let now = Utc::now();
        self.state.write().projects.insert(
            id,
            Project {
                id,
                identifier: identifier.to_string(),
                name: capitalize(identifier),
                description: String::new(),
                is_public,
                enabled_modules: vec![
                    "issue_tracking".to_string(),
                    WIKI_MODULE.to_string(),
                    TIME_TRACKING_MODULE.to_string(),
                ],
                member_ids: member_ids.to_vec(),
                created_on: now,
                updated_on: now,
            },
        );
        self
    }

    pub fn with_disabled_module(self, project_id: u64, module: &str) -> Self {
        if let Some(project) = self.state.write().projects.get_mut(&project_id) {
            project.enabled_modules.retain(|m| m != module);
        }
        self
    }

    /// Add an open issue with default tracker and priority. Ids count up
    /// from 1.
    pub fn with_issue(self, project_id: u64, author_id: u64, subject: &str) -> Self {
        self.seed_issue(project_id, author_id, subject, 1, Utc::now())
    }

    /// Add an issue in `status_id`, created at `created_on`.
    pub fn with_issue_in_status(
        self,
        project_id: u64,
        author_id: u64,
        subject: &str,
        status_id: u64,
        created_on: DateTime<Utc>,
    ) -> Self {
        self.seed_issue(project_id, author_id, subject, status_id, created_on)
    }

    fn seed_issue(
        self,
        project_id: u64,
        author_id: u64,
        subject: &str,
        status_id: u64,
        created_on: DateTime<Utc>,
    ) -> Self {
        {
            let mut state = self.state.write();
            let id = HostState::next_id(&state.issues);
            let project = state
                .projects
                .get(&project_id)
                .map(Project::to_ref)
                .unwrap_or_else(|| NamedRef::new(project_id, "Unknown"));
            let author = state
                .users
                .get(&author_id)
                .map(User::to_ref)
                .unwrap_or_else(|| NamedRef::new(author_id, "Anonymous"));
            let status = state
                .statuses
                .iter()
                .find(|s| s.id == status_id)
                .map(|s| NamedRef::new(s.id, s.name.clone()))
                .unwrap_or_else(|| NamedRef::new(status_id, "Unknown"));
            let closed = state.status_closed(status_id);
            let issue = Issue {
                id,
                project,
                tracker: state.trackers[0].clone(),
                status,
                priority: state.priorities[0].clone(),
                author,
                assigned_to: None,
                subject: subject.to_string(),
                description: String::new(),
                start_date: None,
                due_date: None,
                done_ratio: 0,
                estimated_hours: None,
                created_on,
                updated_on: created_on,
                closed_on: closed.then_some(created_on),
                journals: Vec::new(),
            };
            state.issues.insert(id, issue);
        }
        self
    }

    /// Add a journal entry to an existing issue.
    pub fn with_journal(self, issue_id: u64, user_id: u64, notes: &str, private_notes: bool) -> Self {
        {
            let mut state = self.state.write();
            let id = state.next_journal_id;
            state.next_journal_id += 1;
            let user = state
                .users
                .get(&user_id)
                .map(User::to_ref)
                .unwrap_or_else(|| NamedRef::new(user_id, "Anonymous"));
            if let Some(issue) = state.issues.get_mut(&issue_id) {
                issue.journals.push(Journal {
                    id,
                    user,
                    notes: notes.to_string(),
                    private_notes,
                    created_on: Utc::now(),
                });
            }
        }
        self
    }

    pub fn with_wiki_page(self, project_id: u64, title: &str, text: &str) -> Self {
        {
            let mut state = self.state.write();
            let author = state
                .users
                .values()
                .find(|u| u.admin)
                .map(User::to_ref)
                .unwrap_or_else(|| NamedRef::new(0, "System"));
            state.wiki_pages.push(WikiPage {
                project_id,
                title: title.to_string(),
                text: text.to_string(),
                author,
                updated_on: Utc::now(),
            });
        }
        self
    }

    pub fn with_attachment(self, id: u64, filename: &str, container: AttachmentContainer) -> Self {
        self.state.write().attachments.insert(
            id,
            Attachment {
                id,
                filename: filename.to_string(),
                filesize: 1024,
                content_type: "application/octet-stream".to_string(),
                description: String::new(),
                author: None,
                container,
                digest: format!("{:032x}", id),
                created_on: Utc::now(),
            },
        );
        self
    }

    pub fn with_api_key(self, key: &str, user_id: u64) -> Self {
        self.state.write().api_keys.insert(key.to_string(), user_id);
        self
    }

    /// A small, self-consistent data set for the demo server.
    ///
    /// Keys: `admin-key` (admin), `alice-key` and `bob-key` (members of
    /// `webapp`), `carol-key` (no memberships).
    pub fn demo() -> Self {
        let week_ago = Utc::now() - chrono::Duration::days(7);
        Self::new()
            .with_user(1, "admin", true)
            .with_user(2, "alice", false)
            .with_user(3, "bob", false)
            .with_user(4, "carol", false)
            .with_project(1, "webapp", false, &[2, 3])
            .with_project(2, "docs", true, &[2])
            .with_issue(1, 2, "Login page returns 500 on empty password")
            .with_issue(1, 3, "Add dark mode")
            .with_issue_in_status(1, 2, "Upgrade TLS library", 5, week_ago)
            .with_issue(2, 2, "Document the export format")
            .with_journal(1, 3, "Reproduced on staging", false)
            .with_journal(1, 2, "Root cause is in the session middleware", true)
            .with_wiki_page(1, "Release Checklist", "# Release Checklist\n\n1. Tag\n2. Deploy")
            .with_wiki_page(2, "Getting Started", "# Getting Started\n\nRead the README.")
            .with_attachment(1, "stacktrace.txt", AttachmentContainer::Issue { container_id: 1 })
            .with_api_key("admin-key", 1)
            .with_api_key("alice-key", 2)
            .with_api_key("bob-key", 3)
            .with_api_key("carol-key", 4)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IdentityResolver for InMemoryHost {
    fn resolve(&self, api_key: &str) -> Option<Identity> {
        let state = self.state.read();
        let user_id = state.api_keys.get(api_key)?;
        state
            .users
            .get(user_id)
            .filter(|u| u.active)
            .map(|u| Identity::new(u.id, u.login.clone()).with_admin(u.admin))
    }
}

#[async_trait]
impl HostData for InMemoryHost {
    async fn projects(&self, identity: &Identity) -> McpResult<Vec<Project>> {
        let state = self.state.read();
        Ok(state
            .projects
            .values()
            .filter(|p| state.project_visible(p, identity))
            .cloned()
            .collect())
    }

    async fn project(&self, identity: &Identity, id_or_identifier: &str) -> McpResult<Project> {
        self.state
            .read()
            .visible_project(identity, id_or_identifier)
            .cloned()
    }

    async fn issues(&self, identity: &Identity, filter: &IssueFilter) -> McpResult<Vec<Issue>> {
        let state = self.state.read();
        Ok(state
            .issues
            .values()
            .filter(|i| state.issue_visible(i, identity))
            .filter(|i| filter.project_id.map_or(true, |p| i.project.id == p))
            .filter(|i| match filter.status {
                StatusFilter::Open => !state.status_closed(i.status.id),
                StatusFilter::Closed => state.status_closed(i.status.id),
                StatusFilter::All => true,
            })
            .filter(|i| {
                filter
                    .assigned_to_id
                    .map_or(true, |a| i.assigned_to.as_ref().map(|r| r.id) == Some(a))
            })
            .filter(|i| filter.tracker_id.map_or(true, |t| i.tracker.id == t))
            .filter(|i| filter.priority_id.map_or(true, |p| i.priority.id == p))
            .cloned()
            .collect())
    }

    async fn issue(&self, identity: &Identity, id: u64) -> McpResult<Issue> {
        let state = self.state.read();
        let mut issue = state.visible_issue(identity, id)?.clone();
        let sees_private = identity.admin
            || state
                .projects
                .get(&issue.project.id)
                .map_or(false, |p| p.has_member(identity.id));
        if !sees_private {
            issue.journals.retain(|j| !j.private_notes);
        }
        Ok(issue)
    }

    async fn create_issue(&self, identity: &Identity, new: NewIssue) -> McpResult<Issue> {
        let mut state = self.state.write();
        let project = state.visible_project_by_id(identity, new.project_id)?.clone();
        if !state.can_write(&project, identity) {
            return Err(McpError::denied("You don't have permission to add issues"));
        }
        if new.subject.trim().is_empty() {
            return Err(McpError::Validation("Subject cannot be blank".into()));
        }
        if new.done_ratio.map_or(false, |r| r > 100) {
            return Err(McpError::Validation("% Done is not included in the list".into()));
        }

        let tracker = HostState::lookup(&state.trackers, new.tracker_id, "Tracker")?;
        let priority = HostState::lookup(&state.priorities, new.priority_id, "Priority")?;
        let assigned_to = new.assigned_to_id.map(|id| state.user_ref(id)).transpose()?;
        let author = state
            .users
            .get(&identity.id)
            .map(User::to_ref)
            .unwrap_or_else(|| NamedRef::new(identity.id, identity.login.clone()));
        let status = state
            .statuses
            .first()
            .map(|s| NamedRef::new(s.id, s.name.clone()))
            .ok_or_else(|| McpError::Validation("Status cannot be blank".into()))?;

        let now = Utc::now();
        let id = HostState::next_id(&state.issues);
        let issue = Issue {
            id,
            project: project.to_ref(),
            tracker,
            status,
            priority,
            author,
            assigned_to,
            subject: new.subject.trim().to_string(),
            description: new.description.unwrap_or_default(),
            start_date: new.start_date,
            due_date: new.due_date,
            done_ratio: new.done_ratio.unwrap_or(0),
            estimated_hours: new.estimated_hours,
            created_on: now,
            updated_on: now,
            closed_on: None,
            journals: Vec::new(),
        };
        state.issues.insert(id, issue.clone());
        log::info!("Issue #{} created by identity {}", id, identity.id);
        Ok(issue)
    }

    async fn update_issue(
        &self,
        identity: &Identity,
        id: u64,
        changes: IssueChanges,
    ) -> McpResult<Issue> {
        let mut state = self.state.write();
        let project_id = state.visible_issue(identity, id)?.project.id;
        let writable = state
            .projects
            .get(&project_id)
            .map_or(false, |p| state.can_write(p, identity));
        if !writable {
            return Err(McpError::denied("You don't have permission to edit issues"));
        }

        let status = match changes.status_id {
            Some(sid) => Some(
                state
                    .statuses
                    .iter()
                    .find(|s| s.id == sid)
                    .map(|s| (NamedRef::new(s.id, s.name.clone()), s.is_closed))
                    .ok_or_else(|| McpError::Validation("Status is invalid".into()))?,
            ),
            None => None,
        };
        let priority = match changes.priority_id {
            Some(pid) => Some(HostState::lookup(&state.priorities, Some(pid), "Priority")?),
            None => None,
        };
        let assigned_to = match changes.assigned_to_id {
            Some(Some(uid)) => Some(Some(state.user_ref(uid)?)),
            Some(None) => Some(None),
            None => None,
        };
        if let Some(subject) = &changes.subject {
            if subject.trim().is_empty() {
                return Err(McpError::Validation("Subject cannot be blank".into()));
            }
        }
        if changes.done_ratio.map_or(false, |r| r > 100) {
            return Err(McpError::Validation("% Done is not included in the list".into()));
        }

        let journal_user = state
            .users
            .get(&identity.id)
            .map(User::to_ref)
            .unwrap_or_else(|| NamedRef::new(identity.id, identity.login.clone()));
        let journal_id = state.next_journal_id;
        let now = Utc::now();

        let issue = state
            .issues
            .get_mut(&id)
            .ok_or_else(|| McpError::not_found(format!("Issue #{} not found or not accessible", id)))?;
        if let Some(subject) = changes.subject {
            issue.subject = subject.trim().to_string();
        }
        if let Some(description) = changes.description {
            issue.description = description;
        }
        if let Some((status, closed)) = status {
            issue.status = status;
            issue.closed_on = if closed { Some(now) } else { None };
        }
        if let Some(priority) = priority {
            issue.priority = priority;
        }
        if let Some(assigned_to) = assigned_to {
            issue.assigned_to = assigned_to;
        }
        if let Some(d) = changes.start_date {
            issue.start_date = Some(d);
        }
        if let Some(d) = changes.due_date {
            issue.due_date = Some(d);
        }
        if let Some(h) = changes.estimated_hours {
            issue.estimated_hours = Some(h);
        }
        if let Some(r) = changes.done_ratio {
            issue.done_ratio = r;
        }
        let mut wrote_journal = false;
        if let Some(notes) = changes.notes.filter(|n| !n.trim().is_empty()) {
            issue.journals.push(Journal {
                id: journal_id,
                user: journal_user,
                notes,
                private_notes: false,
                created_on: now,
            });
            wrote_journal = true;
        }
        issue.updated_on = now;
        let updated = issue.clone();
        if wrote_journal {
            state.next_journal_id += 1;
        }
        Ok(updated)
    }

    async fn delete_issue(&self, identity: &Identity, id: u64) -> McpResult<Issue> {
        let mut state = self.state.write();
        state.visible_issue(identity, id)?;
        if !identity.admin {
            return Err(McpError::denied("You don't have permission to delete issues"));
        }
        state.time_entries.retain(|_, e| e.issue.as_ref().map(|i| i.id) != Some(id));
        state
            .issues
            .remove(&id)
            .ok_or_else(|| McpError::not_found(format!("Issue #{} not found or not accessible", id)))
    }

    async fn user(&self, identity: &Identity, id: u64) -> McpResult<User> {
        let state = self.state.read();
        let user = state
            .users
            .get(&id)
            .ok_or_else(|| McpError::not_found("User not found"))?;
        let visible = identity.admin
            || user.id == identity.id
            || (user.active && state.shares_project(identity.id, user.id));
        // Invisible users are reported missing so existence is not leaked.
        if !visible {
            return Err(McpError::not_found("User not found"));
        }
        Ok(user.clone())
    }

    async fn current_user(&self, identity: &Identity) -> McpResult<User> {
        self.state
            .read()
            .users
            .get(&identity.id)
            .cloned()
            .ok_or_else(|| McpError::not_found("User not found"))
    }

    async fn time_entry(&self, identity: &Identity, id: u64) -> McpResult<TimeEntry> {
        let state = self.state.read();
        state
            .time_entries
            .get(&id)
            .filter(|e| {
                state
                    .projects
                    .get(&e.project.id)
                    .map_or(false, |p| state.project_visible(p, identity))
            })
            .cloned()
            .ok_or_else(|| McpError::not_found(format!("Time entry #{} not found", id)))
    }

    async fn log_time(&self, identity: &Identity, entry: NewTimeEntry) -> McpResult<TimeEntry> {
        let mut state = self.state.write();

        let (project, issue) = match (entry.issue_id, entry.project_id) {
            (Some(issue_id), _) => {
                let issue = state.visible_issue(identity, issue_id)?;
                let issue_ref = NamedRef::new(issue.id, issue.subject.clone());
                let project = state.visible_project_by_id(identity, issue.project.id)?.clone();
                (project, Some(issue_ref))
            }
            (None, Some(project_id)) => (state.visible_project_by_id(identity, project_id)?.clone(), None),
            (None, None) => {
                return Err(McpError::invalid_params(
                    "Either issue_id or project_id is required",
                ))
            }
        };

        if !project.module_enabled(TIME_TRACKING_MODULE) {
            return Err(McpError::denied(format!(
                "Time tracking module is disabled for project '{}'",
                project.identifier
            )));
        }
        if !state.can_write(&project, identity) {
            return Err(McpError::denied("You don't have permission to log time"));
        }
        if !(entry.hours > 0.0 && entry.hours <= 1000.0) {
            return Err(McpError::Validation("Hours is invalid".into()));
        }
        let activity = HostState::lookup(&state.activities, entry.activity_id, "Activity")?;
        let user = state
            .users
            .get(&identity.id)
            .map(User::to_ref)
            .unwrap_or_else(|| NamedRef::new(identity.id, identity.login.clone()));

        let now = Utc::now();
        let id = HostState::next_id(&state.time_entries);
        let created = TimeEntry {
            id,
            project: project.to_ref(),
            issue,
            user,
            activity,
            hours: entry.hours,
            comments: entry.comments,
            spent_on: entry.spent_on.unwrap_or_else(|| now.date_naive()),
            created_on: now,
        };
        state.time_entries.insert(id, created.clone());
        Ok(created)
    }

    async fn wiki_page(
        &self,
        identity: &Identity,
        project_id_or_identifier: &str,
        title: &str,
    ) -> McpResult<WikiPage> {
        let state = self.state.read();
        let project = state.visible_project(identity, project_id_or_identifier)?;
        if !project.module_enabled(WIKI_MODULE) {
            return Err(McpError::denied(format!(
                "Wiki module is disabled for project '{}'",
                project.identifier
            )));
        }
        state
            .wiki_pages
            .iter()
            .find(|p| p.project_id == project.id && p.title.eq_ignore_ascii_case(title))
            .cloned()
            .ok_or_else(|| McpError::not_found("Wiki page not found"))
    }

    async fn attachment(&self, identity: &Identity, id: u64) -> McpResult<Attachment> {
        let state = self.state.read();
        let attachment = state
            .attachments
            .get(&id)
            .ok_or_else(|| McpError::not_found(format!("Attachment #{} not found", id)))?;
        let visible = match &attachment.container {
            AttachmentContainer::Issue { container_id } => state
                .issues
                .get(container_id)
                .map_or(false, |i| state.issue_visible(i, identity)),
            AttachmentContainer::Project { container_id } => state
                .projects
                .get(container_id)
                .map_or(false, |p| state.project_visible(p, identity)),
            AttachmentContainer::WikiPage { project_id, .. } => {
                state.projects.get(project_id).map_or(false, |p| {
                    p.module_enabled(WIKI_MODULE) && state.project_visible(p, identity)
                })
            }
        };
        if !visible {
            return Err(McpError::denied("Attachment not accessible"));
        }
        Ok(attachment.clone())
    }

    async fn issue_statuses(&self) -> McpResult<Vec<IssueStatus>> {
        Ok(self.state.read().statuses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PERMISSION_DENIED, RESOURCE_NOT_FOUND};

    fn alice() -> Identity {
        Identity::new(2, "alice")
    }

    fn carol() -> Identity {
        Identity::new(4, "carol")
    }

    fn admin() -> Identity {
        Identity::new(1, "admin").with_admin(true)
    }

    #[test]
    fn test_resolve_api_keys() {
        let host = InMemoryHost::demo().with_locked_user(3);
        assert_eq!(host.resolve("alice-key").unwrap().id, 2);
        assert!(host.resolve("admin-key").unwrap().admin);
        assert!(host.resolve("bob-key").is_none());
        assert!(host.resolve("nope").is_none());
    }

    #[tokio::test]
    async fn test_project_visibility() {
        let host = InMemoryHost::demo();
        let ids = |ps: Vec<Project>| ps.iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(ids(host.projects(&alice()).await.unwrap()), vec![1, 2]);
        assert_eq!(ids(host.projects(&carol()).await.unwrap()), vec![2]);

        assert_eq!(host.project(&alice(), "webapp").await.unwrap().id, 1);
        assert_eq!(host.project(&alice(), "1").await.unwrap().identifier, "webapp");
        let err = host.project(&carol(), "webapp").await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
        assert_eq!(err.to_string(), "Project not found: webapp");
    }

    #[tokio::test]
    async fn test_issue_filters() {
        let host = InMemoryHost::demo();
        let open = host.issues(&alice(), &IssueFilter::default()).await.unwrap();
        assert_eq!(open.len(), 3);

        let closed = host
            .issues(
                &alice(),
                &IssueFilter {
                    status: StatusFilter::Closed,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(closed.iter().map(|i| i.id).collect::<Vec<_>>(), vec![3]);

        let carol_sees = host.issues(&carol(), &IssueFilter::default()).await.unwrap();
        assert_eq!(carol_sees.iter().map(|i| i.id).collect::<Vec<_>>(), vec![4]);
    }

    #[tokio::test]
    async fn test_private_journals_hidden_from_non_members() {
        let host = InMemoryHost::demo();
        let member_view = host.issue(&alice(), 1).await.unwrap();
        assert_eq!(member_view.journals.len(), 2);

        // Make issue 1 reachable for carol by opening its project.
        host.state.write().projects.get_mut(&1).unwrap().is_public = true;
        let outsider_view = host.issue(&carol(), 1).await.unwrap();
        assert_eq!(outsider_view.journals.len(), 1);
        assert!(!outsider_view.journals[0].private_notes);
    }

    #[tokio::test]
    async fn test_create_update_delete_issue() {
        let host = InMemoryHost::demo();
        let created = host
            .create_issue(
                &alice(),
                NewIssue {
                    project_id: 1,
                    subject: "  Crash on save ".into(),
                    assigned_to_id: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, 5);
        assert_eq!(created.subject, "Crash on save");
        assert_eq!(created.status.name, "New");
        assert_eq!(created.assigned_to.as_ref().unwrap().id, 3);

        let updated = host
            .update_issue(
                &alice(),
                created.id,
                IssueChanges {
                    status_id: Some(5),
                    assigned_to_id: Some(None),
                    notes: Some("Fixed in 1.2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status.name, "Closed");
        assert!(updated.closed_on.is_some());
        assert!(updated.assigned_to.is_none());
        assert_eq!(updated.journals.len(), 1);

        let err = host.delete_issue(&alice(), created.id).await.unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
        let deleted = host.delete_issue(&admin(), created.id).await.unwrap();
        assert_eq!(deleted.subject, "Crash on save");
        assert!(host.issue(&admin(), created.id).await.is_err());
    }

    #[tokio::test]
    async fn test_write_rules() {
        let host = InMemoryHost::demo();
        // carol can see the public docs project but is not a member.
        let err = host
            .create_issue(
                &carol(),
                NewIssue {
                    project_id: 2,
                    subject: "x".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);

        let err = host
            .create_issue(
                &alice(),
                NewIssue {
                    project_id: 1,
                    subject: "   ".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Validation(_)));
        assert_eq!(err.client_message(), "Subject cannot be blank");
    }

    #[tokio::test]
    async fn test_user_visibility_reports_not_found() {
        let host = InMemoryHost::demo();
        assert_eq!(host.user(&alice(), 3).await.unwrap().login, "bob");
        let err = host.user(&carol(), 3).await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
        assert_eq!(host.user(&admin(), 4).await.unwrap().login, "carol");
        assert_eq!(host.current_user(&carol()).await.unwrap().id, 4);
    }

    #[tokio::test]
    async fn test_log_time() {
        let host = InMemoryHost::demo();
        let entry = host
            .log_time(
                &alice(),
                NewTimeEntry {
                    issue_id: Some(1),
                    hours: 1.5,
                    comments: "triage".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(entry.project.id, 1);
        assert_eq!(entry.activity.name, "Design");
        assert_eq!(host.time_entry(&alice(), entry.id).await.unwrap().hours, 1.5);
        assert!(host.time_entry(&carol(), entry.id).await.is_err());

        let err = host
            .log_time(
                &alice(),
                NewTimeEntry {
                    project_id: Some(1),
                    hours: 0.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Hours is invalid");

        let host = host.with_disabled_module(1, TIME_TRACKING_MODULE);
        let err = host
            .log_time(
                &alice(),
                NewTimeEntry {
                    project_id: Some(1),
                    hours: 1.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn test_wiki_disabled_is_denied_missing_is_not_found() {
        let host = InMemoryHost::demo();
        let page = host
            .wiki_page(&alice(), "webapp", "release checklist")
            .await
            .unwrap();
        assert!(page.text.starts_with("# Release Checklist"));

        let err = host.wiki_page(&alice(), "webapp", "Nope").await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);

        let host = host.with_disabled_module(1, WIKI_MODULE);
        let err = host
            .wiki_page(&alice(), "webapp", "Release Checklist")
            .await
            .unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
        assert_eq!(err.to_string(), "Wiki module is disabled for project 'webapp'");
    }

    #[tokio::test]
    async fn test_attachment_access() {
        let host = InMemoryHost::demo();
        let a = host.attachment(&alice(), 1).await.unwrap();
        assert_eq!(a.download_url(), "/attachments/download/1/stacktrace.txt");
        let json = a.to_json();
        assert_eq!(json["container_type"], "issue");
        assert_eq!(json["container_id"], 1);

        let err = host.attachment(&carol(), 1).await.unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
        let err = host.attachment(&alice(), 99).await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
    }
}
