//! AnkiWeb sync protocol client
//!
//! Every call is a POST to `<endpoint>sync/<method>` carrying the
//! `anki-sync` header and a compressed body. Three methods are used:
//!
//! - `hostKey` exchanges credentials for a session key
//! - `download` returns the whole collection file
//! - `upload` replaces the whole collection file
//!
//! Redirects are not followed by the HTTP stack; a single hop is replayed by
//! hand so the body and sync header survive the move to another host.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{redirect, Client};
use rememberit_core::config::Settings;
use rememberit_core::Phase;
use rememberit_proto::{decompress_collection, Compression, EnvelopeCodec, SyncHeader, SYNC_HEADER_NAME};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use crate::exchange_log::{ExchangeLog, ExchangeRecord};
use crate::AnkiWebError;

/// Redirects replayed per request
const MAX_REDIRECT_HOPS: usize = 1;

const OCTET_STREAM: &str = "application/octet-stream";

/// Settings for a [`SyncClient`]
#[derive(Debug, Clone)]
pub struct SyncClientConfig {
    /// Endpoint used for login, with a trailing slash
    pub endpoint: String,
    /// Timeout for host key requests
    pub metadata_timeout: Duration,
    /// Timeout for collection download and upload
    pub transfer_timeout: Duration,
    pub compression: Compression,
    pub debug_log: Option<PathBuf>,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl SyncClientConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            endpoint: settings.endpoint(),
            metadata_timeout: Duration::from_secs(settings.timeouts.metadata_secs),
            transfer_timeout: Duration::from_secs(settings.timeouts.transfer_secs),
            compression: Compression::Zstd,
            debug_log: settings.debug_log_path(),
        }
    }
}

/// HTTP client for the sync protocol
pub struct SyncClient {
    http: Client,
    endpoint: String,
    codec: EnvelopeCodec,
    metadata_timeout: Duration,
    transfer_timeout: Duration,
    log: ExchangeLog,
}

impl SyncClient {
    /// Creates a client for `config`
    ///
    /// # Errors
    ///
    /// Returns `AnkiWebError::InvalidUrl` if the endpoint does not parse and
    /// `AnkiWebError::Network` if the HTTP stack cannot be initialised.
    pub fn new(config: SyncClientConfig) -> Result<Self, AnkiWebError> {
        Url::parse(&config.endpoint)
            .map_err(|e| AnkiWebError::InvalidUrl(format!("{}: {e}", config.endpoint)))?;
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.metadata_timeout)
            .build()
            .map_err(|e| AnkiWebError::network(Phase::Auth, e))?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
            codec: EnvelopeCodec::new(config.compression),
            metadata_timeout: config.metadata_timeout,
            transfer_timeout: config.transfer_timeout,
            log: ExchangeLog::new(config.debug_log),
        })
    }

    /// Endpoint used for login
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn method_url(endpoint: &str, method: &str) -> Result<Url, AnkiWebError> {
        let base = Url::parse(endpoint).map_err(|e| AnkiWebError::InvalidUrl(format!("{endpoint}: {e}")))?;
        base.join(&format!("sync/{method}"))
            .map_err(|e| AnkiWebError::InvalidUrl(format!("{endpoint}: {e}")))
    }

    /// Exchange credentials for a session key
    ///
    /// # Errors
    ///
    /// Returns `AnkiWebError::Auth` when the response has no `key` member,
    /// and status/network errors tagged with the auth phase.
    pub async fn host_key(&self, username: &str, password: &str) -> Result<String, AnkiWebError> {
        let url = Self::method_url(&self.endpoint, "hostKey")?;
        let body = self
            .codec
            .encode(&json!({ "u": username, "p": password }))
            .map_err(|e| AnkiWebError::InvalidRequest(e.to_string()))?;

        debug!(endpoint = %self.endpoint, "Requesting host key");
        let response = self
            .post(Phase::Auth, url, &SyncHeader::anonymous(), body, self.metadata_timeout)
            .await?;

        let value = self
            .codec
            .decode(&response)
            .map_err(|e| AnkiWebError::Auth(format!("could not decode host key response: {e}")))?;
        extract_host_key(&value)
    }

    /// Download the full collection as SQLite file bytes
    pub async fn download(&self, endpoint: &str, host_key: &str) -> Result<Vec<u8>, AnkiWebError> {
        let url = Self::method_url(endpoint, "download")?;
        let body = self
            .codec
            .encode(&json!({}))
            .map_err(|e| AnkiWebError::InvalidRequest(e.to_string()))?;

        let response = self
            .post(Phase::Download, url, &SyncHeader::new(host_key), body, self.transfer_timeout)
            .await?;
        let collection = decompress_collection(&response)
            .map_err(|e| AnkiWebError::decode(Phase::Download, e))?;

        info!(compressed = response.len(), size = collection.len(), "Downloaded collection");
        Ok(collection)
    }

    /// Replace the remote collection with `collection`
    pub async fn upload(&self, endpoint: &str, host_key: &str, collection: &[u8]) -> Result<(), AnkiWebError> {
        let url = Self::method_url(endpoint, "upload")?;
        let body = self
            .codec
            .compress(collection)
            .map_err(|e| AnkiWebError::InvalidRequest(e.to_string()))?;
        let compressed = body.len();

        let response = self
            .post(Phase::Upload, url, &SyncHeader::new(host_key), body, self.transfer_timeout)
            .await?;

        match upload_reply(&self.codec, &response) {
            Some(reply) if reply != "OK" => warn!(reply = %reply, "Unexpected upload reply"),
            _ => {}
        }
        info!(size = collection.len(), compressed, "Uploaded collection");
        Ok(())
    }

    /// POST `body`, replaying one redirect, and return the response body
    async fn post(
        &self,
        phase: Phase,
        mut url: Url,
        header: &SyncHeader,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, AnkiWebError> {
        let header_value = header.to_header_value();
        let request_headers = [
            (SYNC_HEADER_NAME, header_value.as_str()),
            ("content-type", OCTET_STREAM),
            ("accept", "*/*"),
        ];
        let mut hops = 0;

        loop {
            let mut request = self.http.post(url.clone()).timeout(timeout).body(body.clone());
            for (name, value) in request_headers {
                request = request.header(name, value);
            }
            let response = request
                .send()
                .await
                .map_err(|e| AnkiWebError::network(phase, e))?;
            let status = response.status();

            if status.is_redirection() && hops < MAX_REDIRECT_HOPS {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(location) = location {
                    let next = url
                        .join(&location)
                        .map_err(|e| AnkiWebError::InvalidUrl(format!("{location}: {e}")))?;
                    info!(%phase, from = %url, to = %next, "Following sync redirect");
                    url = next;
                    hops += 1;
                    continue;
                }
            }

            let response_headers = response.headers().clone();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AnkiWebError::network(phase, e))?;

            let record = ExchangeRecord::new("POST", url.as_str())
                .request(request_headers, &body)
                .response(status.as_u16(), &response_headers, &bytes);
            // Host key bodies hold the password and the issued key.
            self.log.record(&if phase == Phase::Auth {
                record.without_bodies()
            } else {
                record
            });

            if !status.is_success() {
                warn!(%phase, status = status.as_u16(), url = %url, "Sync request failed");
                return Err(AnkiWebError::status(phase, status.as_u16()));
            }
            debug!(%phase, status = status.as_u16(), size = bytes.len(), "Sync response received");
            return Ok(bytes.to_vec());
        }
    }
}

/// `key` member of a host key response
fn extract_host_key(value: &Value) -> Result<String, AnkiWebError> {
    match value.get("key").and_then(Value::as_str) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(AnkiWebError::Auth(
            "host key response has no 'key' field".to_string(),
        )),
    }
}

/// Text of an upload reply, compressed or not
fn upload_reply(codec: &EnvelopeCodec, body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(Value::String(text)) = codec.decode(body) {
        return Some(text);
    }
    let raw = codec.decompress(body);
    Some(String::from_utf8_lossy(&raw).trim().trim_matches('"').to_string())
}
