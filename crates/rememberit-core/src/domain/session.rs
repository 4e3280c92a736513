//! Authenticated sync session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session key bound to the endpoint that issued it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque host key presented on every sync request
    pub hkey: String,
    /// Endpoint that issued the key (with trailing slash)
    pub endpoint: String,
    /// Account the key was obtained for
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(hkey: impl Into<String>, endpoint: &str, username: Option<String>) -> Self {
        Self {
            hkey: hkey.into(),
            endpoint: normalize_endpoint(endpoint),
            username,
            created_at: Utc::now(),
        }
    }

    /// Whether the session may be presented to `endpoint`
    pub fn is_valid_for(&self, endpoint: &str) -> bool {
        self.endpoint == normalize_endpoint(endpoint)
    }
}

// The host key is a credential and stays out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("hkey", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Ensure an endpoint URL ends with exactly one `/`
pub fn normalize_endpoint(endpoint: &str) -> String {
    format!("{}/", endpoint.trim().trim_end_matches('/'))
}
