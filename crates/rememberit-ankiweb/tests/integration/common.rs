//! Shared helpers for the AnkiWeb integration tests

use std::time::Duration;

use rememberit_ankiweb::{SyncClient, SyncClientConfig, WebServiceClient, WebServiceConfig};
use rememberit_core::config::Settings;
use rememberit_proto::{Compression, EnvelopeCodec, SQLITE_MAGIC};
use wiremock::MockServer;

/// Bytes that pass the collection sanity check
pub fn fake_collection() -> Vec<u8> {
    let mut bytes = SQLITE_MAGIC.to_vec();
    bytes.extend(std::iter::repeat(7u8).take(4096));
    bytes
}

pub fn codec() -> EnvelopeCodec {
    EnvelopeCodec::new(Compression::Zstd)
}

/// Sync client pointed at the mock server
pub fn sync_client(server: &MockServer) -> SyncClient {
    let config = SyncClientConfig {
        endpoint: format!("{}/", server.uri()),
        metadata_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(5),
        compression: Compression::Zstd,
        debug_log: None,
    };
    SyncClient::new(config).unwrap()
}

/// Web client with both hosts on `web` and `editor`
pub fn web_client(web: &MockServer, editor: &MockServer, settings: Settings) -> WebServiceClient {
    let config = WebServiceConfig::from_settings(&settings).with_base_urls(&web.uri(), &editor.uri());
    WebServiceClient::new(config).unwrap()
}

pub fn settings_with_cookie(cookie: &str) -> Settings {
    Settings {
        cookie_header: cookie.to_string(),
        ..Settings::default()
    }
}
