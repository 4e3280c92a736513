//! JSON-lines record of HTTP exchanges
//!
//! When a debug log path is configured every request/response pair is
//! appended as one JSON object. Bodies are cut at [`PREVIEW_LIMIT`] bytes.
//! Writing the log never fails the request it describes.
//!
//! Cookies and the session key inside the `anki-sync` header are replaced
//! before a record is built; callers drop the bodies of credential exchanges
//! with [`ExchangeRecord::without_bodies`].

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

/// Bytes of each body kept in the log
pub const PREVIEW_LIMIT: usize = 2000;

const TRUNCATION_MARKER: &str = "...(truncated)";

/// Header values replaced before logging
const REDACTED_HEADERS: [&str; 2] = ["cookie", "set-cookie"];

/// Carries the session key in its `k` member
const SYNC_HEADER: &str = "anki-sync";

const REDACTED: &str = "<redacted>";

/// One logged exchange
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    pub timestamp: String,
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body_len: usize,
    pub request_body_preview: String,
    pub response_status: u16,
    pub response_headers: Vec<(String, String)>,
    pub response_body_len: usize,
    pub response_body_preview: String,
}

impl ExchangeRecord {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: method.to_string(),
            url: url.to_string(),
            request_headers: Vec::new(),
            request_body_len: 0,
            request_body_preview: String::new(),
            response_status: 0,
            response_headers: Vec::new(),
            response_body_len: 0,
            response_body_preview: String::new(),
        }
    }

    #[must_use]
    pub fn request<'a>(
        mut self,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: &[u8],
    ) -> Self {
        self.request_headers = redact(headers);
        self.request_body_len = body.len();
        self.request_body_preview = preview(body);
        self
    }

    #[must_use]
    pub fn response(mut self, status: u16, headers: &reqwest::header::HeaderMap, body: &[u8]) -> Self {
        self.response_status = status;
        self.response_headers = redact(
            headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>"))),
        );
        self.response_body_len = body.len();
        self.response_body_preview = preview(body);
        self
    }

    /// Replace both body previews, keeping their lengths
    #[must_use]
    pub fn without_bodies(mut self) -> Self {
        self.request_body_preview = REDACTED.to_string();
        self.response_body_preview = REDACTED.to_string();
        self
    }
}

fn redact<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            let value = if REDACTED_HEADERS.contains(&lower.as_str()) {
                REDACTED.to_string()
            } else if lower == SYNC_HEADER {
                redact_sync_header(value)
            } else {
                value.to_string()
            };
            (name.to_string(), value)
        })
        .collect()
}

/// `anki-sync` value with a non-empty `k` replaced
fn redact_sync_header(value: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Object(mut header)) => {
            if let Some(key) = header.get_mut("k") {
                if key.as_str().map_or(true, |k| !k.is_empty()) {
                    *key = serde_json::Value::String(REDACTED.to_string());
                }
            }
            serde_json::Value::Object(header).to_string()
        }
        _ => REDACTED.to_string(),
    }
}

/// Lossy UTF-8 preview of a body, truncated with a marker
pub fn preview(body: &[u8]) -> String {
    if body.len() > PREVIEW_LIMIT {
        let mut text = String::from_utf8_lossy(&body[..PREVIEW_LIMIT]).into_owned();
        text.push_str(TRUNCATION_MARKER);
        text
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

/// Appends exchange records to a file, or does nothing
#[derive(Debug, Clone, Default)]
pub struct ExchangeLog {
    path: Option<PathBuf>,
}

impl ExchangeLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Append `record`; failures are logged and dropped
    pub fn record(&self, record: &ExchangeRecord) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = append_line(path, record) {
            warn!(path = %path.display(), error = %e, "Failed to write exchange log");
        }
    }
}

fn append_line(path: &Path, record: &ExchangeRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let line = serde_json::to_string(record)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}
