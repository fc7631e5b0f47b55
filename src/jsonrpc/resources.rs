//! Resource templates and `resources/read`.
//!
//! Resources are not registered: the set of URI shapes is fixed, and each
//! shape maps to exactly one [`HostData`] lookup and one mime type.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{McpError, McpResult};
use crate::host::HostData;
use crate::identity::Identity;

/// URI scheme of every resource.
pub const SCHEME: &str = "host";

const JSON_MIME: &str = "application/json";
const MARKDOWN_MIME: &str = "text/markdown";

/// One entry of `resources/templates/list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

pub static TEMPLATES: &[ResourceTemplate] = &[
    ResourceTemplate {
        uri_template: "host://issues/{id}",
        name: "Issue Details",
        description: "Full issue with journals the caller may read",
        mime_type: JSON_MIME,
    },
    ResourceTemplate {
        uri_template: "host://projects/{id}",
        name: "Project Details",
        description: "Project info including enabled modules",
        mime_type: JSON_MIME,
    },
    ResourceTemplate {
        uri_template: "host://projects/{project_id}/wiki/{title}",
        name: "Wiki Page",
        description: "Wiki page content in Markdown",
        mime_type: MARKDOWN_MIME,
    },
    ResourceTemplate {
        uri_template: "host://users/{id}",
        name: "User Profile",
        description: "User profile (admins and the user see all fields, others see limited info)",
        mime_type: JSON_MIME,
    },
    ResourceTemplate {
        uri_template: "host://users/current",
        name: "Current User",
        description: "The authenticated caller's full profile",
        mime_type: JSON_MIME,
    },
    ResourceTemplate {
        uri_template: "host://time_entries/{id}",
        name: "Time Entry",
        description: "Time entry with project, issue, activity and user",
        mime_type: JSON_MIME,
    },
    ResourceTemplate {
        uri_template: "host://attachments/{id}",
        name: "Attachment",
        description: "Attachment metadata and download URL",
        mime_type: JSON_MIME,
    },
];

/// `{"resourceTemplates": [...]}`.
pub fn templates_result() -> Value {
    json!({ "resourceTemplates": TEMPLATES })
}

// ---------------------------------------------------------------------------
// URI matching
// ---------------------------------------------------------------------------

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Issue(u64),
    Project(String),
    WikiPage { project: String, title: String },
    CurrentUser,
    User(u64),
    TimeEntry(u64),
    Attachment(u64),
}

static ISSUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^host://issues/(\d+)$").unwrap());
static PROJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^host://projects/([^/]+)$").unwrap());
static WIKI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^host://projects/([^/]+)/wiki/(.+)$").unwrap());
static USER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^host://users/(\d+)$").unwrap());
static TIME_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^host://time_entries/(\d+)$").unwrap());
static ATTACHMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^host://attachments/(\d+)$").unwrap());

impl ResourceUri {
    /// Match `uri` against the known shapes. Unknown shapes, and numeric
    /// ids that do not fit, are not found.
    pub fn parse(uri: &str) -> McpResult<Self> {
        let unknown = || McpError::not_found(format!("Unknown resource URI: {}", uri));
        let id = |re: &Regex| -> Option<Result<u64, McpError>> {
            re.captures(uri)
                .map(|c| c[1].parse::<u64>().map_err(|_| unknown()))
        };

        if let Some(id) = id(&ISSUE) {
            return Ok(ResourceUri::Issue(id?));
        }
        if let Some(c) = PROJECT.captures(uri) {
            return Ok(ResourceUri::Project(c[1].to_string()));
        }
        if let Some(c) = WIKI.captures(uri) {
            return Ok(ResourceUri::WikiPage {
                project: c[1].to_string(),
                title: percent_decode(&c[2]),
            });
        }
        if uri == "host://users/current" {
            return Ok(ResourceUri::CurrentUser);
        }
        if let Some(id) = id(&USER) {
            return Ok(ResourceUri::User(id?));
        }
        if let Some(id) = id(&TIME_ENTRY) {
            return Ok(ResourceUri::TimeEntry(id?));
        }
        if let Some(id) = id(&ATTACHMENT) {
            return Ok(ResourceUri::Attachment(id?));
        }
        Err(unknown())
    }
}

/// Decode `%XX` escapes and `+` as space. Malformed escapes are kept;
/// invalid UTF-8 is replaced.
fn percent_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => {
            String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
        }
    }
}

// ---------------------------------------------------------------------------
// resources/read
// ---------------------------------------------------------------------------

fn content(uri: &str, mime_type: &str, text: String) -> Value {
    json!({ "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }] })
}

fn json_text(value: &impl Serialize) -> McpResult<String> {
    serde_json::to_string(value).map_err(|e| McpError::Internal(e.into()))
}

/// Resolve `uri` for `identity` and return `{"contents": [...]}`.
pub async fn read_resource(host: &dyn HostData, identity: &Identity, uri: &str) -> McpResult<Value> {
    match ResourceUri::parse(uri)? {
        ResourceUri::Issue(id) => {
            let issue = host.issue(identity, id).await?;
            Ok(content(uri, JSON_MIME, json_text(&issue)?))
        }
        ResourceUri::Project(key) => {
            let project = host.project(identity, &key).await?;
            Ok(content(uri, JSON_MIME, json_text(&project)?))
        }
        ResourceUri::WikiPage { project, title } => {
            let page = host.wiki_page(identity, &project, &title).await?;
            Ok(content(uri, MARKDOWN_MIME, page.text))
        }
        ResourceUri::CurrentUser => {
            let user = host.current_user(identity).await?;
            Ok(content(uri, JSON_MIME, json_text(&user.profile_json(identity))?))
        }
        ResourceUri::User(id) => {
            let user = host.user(identity, id).await?;
            Ok(content(uri, JSON_MIME, json_text(&user.profile_json(identity))?))
        }
        ResourceUri::TimeEntry(id) => {
            let entry = host.time_entry(identity, id).await?;
            Ok(content(uri, JSON_MIME, json_text(&entry)?))
        }
        ResourceUri::Attachment(id) => {
            let attachment = host.attachment(identity, id).await?;
            Ok(content(uri, JSON_MIME, json_text(&attachment.to_json())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{PERMISSION_DENIED, RESOURCE_NOT_FOUND};
    use crate::host::{InMemoryHost, WIKI_MODULE};

    #[test]
    fn test_parse_shapes() {
        assert_eq!(ResourceUri::parse("host://issues/12").unwrap(), ResourceUri::Issue(12));
        assert_eq!(
            ResourceUri::parse("host://projects/webapp").unwrap(),
            ResourceUri::Project("webapp".into())
        );
        assert_eq!(
            ResourceUri::parse("host://projects/webapp/wiki/Release%20Checklist").unwrap(),
            ResourceUri::WikiPage {
                project: "webapp".into(),
                title: "Release Checklist".into()
            }
        );
        assert_eq!(ResourceUri::parse("host://users/current").unwrap(), ResourceUri::CurrentUser);
        assert_eq!(ResourceUri::parse("host://users/3").unwrap(), ResourceUri::User(3));
        assert_eq!(ResourceUri::parse("host://time_entries/1").unwrap(), ResourceUri::TimeEntry(1));
        assert_eq!(ResourceUri::parse("host://attachments/9").unwrap(), ResourceUri::Attachment(9));
    }

    #[test]
    fn test_unknown_uri_is_not_found() {
        for uri in [
            "host://issues/abc",
            "host://issues/99999999999999999999999",
            "other://issues/1",
            "host://versions/1",
        ] {
            let err = ResourceUri::parse(uri).unwrap_err();
            assert_eq!(err.code(), RESOURCE_NOT_FOUND);
            assert_eq!(err.to_string(), format!("Unknown resource URI: {}", uri));
        }
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("Getting+Started"), "Getting Started");
        assert_eq!(percent_decode("a%2Fb"), "a/b");
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("C%2B%2B+Notes"), "C++ Notes");
        assert_eq!(percent_decode("Caf%C3%A9"), "Café");
        assert_eq!(percent_decode("bad%FFbyte"), "bad\u{FFFD}byte");
    }

    #[test]
    fn test_templates_catalog() {
        let v = templates_result();
        let list = v["resourceTemplates"].as_array().unwrap();
        assert_eq!(list.len(), 7);
        assert!(list.iter().all(|t| t["uriTemplate"].as_str().unwrap().starts_with("host://")));
        let wiki = list.iter().find(|t| t["name"] == "Wiki Page").unwrap();
        assert_eq!(wiki["mimeType"], "text/markdown");
    }

    #[tokio::test]
    async fn test_read_issue_and_wiki() {
        let host = InMemoryHost::demo();
        let alice = Identity::new(2, "alice");

        let v = read_resource(&host, &alice, "host://issues/1").await.unwrap();
        let item = &v["contents"][0];
        assert_eq!(item["uri"], "host://issues/1");
        assert_eq!(item["mimeType"], "application/json");
        let issue: Value = serde_json::from_str(item["text"].as_str().unwrap()).unwrap();
        assert_eq!(issue["id"], 1);

        let v = read_resource(&host, &alice, "host://projects/webapp/wiki/Release+Checklist")
            .await
            .unwrap();
        assert_eq!(v["contents"][0]["mimeType"], "text/markdown");
        assert!(v["contents"][0]["text"].as_str().unwrap().starts_with("# Release"));
    }

    #[tokio::test]
    async fn test_user_profiles_are_tiered() {
        let host = InMemoryHost::demo();
        let alice = Identity::new(2, "alice");

        let v = read_resource(&host, &alice, "host://users/current").await.unwrap();
        let me: Value = serde_json::from_str(v["contents"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(me["mail"], "alice@example.net");

        let v = read_resource(&host, &alice, "host://users/3").await.unwrap();
        let bob: Value = serde_json::from_str(v["contents"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(bob["login"], "bob");
        assert!(bob.get("mail").is_none());
    }

    #[tokio::test]
    async fn test_denied_versus_not_found() {
        let host = InMemoryHost::demo().with_disabled_module(2, WIKI_MODULE);
        let carol = Identity::new(4, "carol");

        let err = read_resource(&host, &carol, "host://users/3").await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
        let err = read_resource(&host, &carol, "host://issues/1").await.unwrap_err();
        assert_eq!(err.code(), RESOURCE_NOT_FOUND);
        let err = read_resource(&host, &carol, "host://attachments/1").await.unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
        let err = read_resource(&host, &carol, "host://projects/docs/wiki/Getting+Started")
            .await
            .unwrap_err();
        assert_eq!(err.code(), PERMISSION_DENIED);
    }
}
