//! `anki-sync` request header.

use serde::{Deserialize, Serialize};

/// Sync protocol version spoken by this client.
pub const SYNC_VERSION: u8 = 11;

/// Name of the HTTP header carrying [`SyncHeader`].
pub const SYNC_HEADER_NAME: &str = "anki-sync";

/// Length of the per-request nonce.
const NONCE_LEN: usize = 8;

/// Client identifier sent as `c`: `<version>,rememberit,<os>`.
pub fn client_version() -> String {
    format!(
        "{},rememberit,{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

/// Per-request header JSON: `{"v":11,"k":"<hkey>","c":"<client>","s":"<nonce>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHeader {
    #[serde(rename = "v")]
    pub version: u8,
    /// Session key, empty before login.
    #[serde(rename = "k")]
    pub host_key: String,
    #[serde(rename = "c")]
    pub client: String,
    /// Fresh random token per request.
    #[serde(rename = "s")]
    pub nonce: String,
}

impl SyncHeader {
    /// Header for one request; every call draws a new nonce.
    pub fn new(host_key: &str) -> Self {
        Self {
            version: SYNC_VERSION,
            host_key: host_key.to_string(),
            client: client_version(),
            nonce: new_nonce(),
        }
    }

    /// Header for the unauthenticated host-key request.
    pub fn anonymous() -> Self {
        Self::new("")
    }

    /// Serialized header value.
    pub fn to_header_value(&self) -> String {
        // Serializing plain strings and an integer cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..NONCE_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_json_shape() {
        let header = SyncHeader::new("hk");
        let value: serde_json::Value = serde_json::from_str(&header.to_header_value()).unwrap();
        assert_eq!(value["v"], 11);
        assert_eq!(value["k"], "hk");
        assert!(value["c"].as_str().unwrap().contains(",rememberit,"));
        assert_eq!(value["s"].as_str().unwrap().len(), NONCE_LEN);
    }

    #[test]
    fn test_nonce_changes_per_request() {
        let a = SyncHeader::anonymous();
        let b = SyncHeader::anonymous();
        assert_eq!(a.host_key, "");
        assert_ne!(a.nonce, b.nonce);
        assert!(a.nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
