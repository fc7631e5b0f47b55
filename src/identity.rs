//! The authenticated caller.
//!
//! Authentication itself belongs to the host. The gateway only needs a
//! stable key for admission counters and enough facts for visibility checks.

use serde::{Deserialize, Serialize};

/// Authenticated caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable numeric key, used for rate and connection accounting.
    pub id: u64,
    /// Login name.
    pub login: String,
    /// Host administrators see every record and every tool.
    #[serde(default)]
    pub admin: bool,
}

impl Identity {
    pub fn new(id: u64, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            admin: false,
        }
    }

    /// Builder: mark as administrator.
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }
}

/// Resolves a presented API key to an identity.
///
/// Returns `None` for unknown keys, which the HTTP shell treats as anonymous.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, api_key: &str) -> Option<Identity>;
}
