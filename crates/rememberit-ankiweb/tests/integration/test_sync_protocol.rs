//! Sync protocol requests: host key, download, upload, redirects

use rememberit_ankiweb::sync_client::SyncClientConfig;
use rememberit_ankiweb::{AnkiWebError, AnkiWebSyncTransport, SyncClient};
use rememberit_core::ports::ISyncTransport;
use rememberit_core::{Phase, RememberItError};
use rememberit_proto::SYNC_HEADER_NAME;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{codec, fake_collection, sync_client};

#[tokio::test]
async fn test_host_key_returns_key() {
    let server = MockServer::start().await;
    let body = codec().encode(&json!({"key": "hk-123"})).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .and(header_exists(SYNC_HEADER_NAME))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = sync_client(&server);
    let key = client.host_key("me@example.com", "secret").await.unwrap();
    assert_eq!(key, "hk-123");

    let requests = server.received_requests().await.unwrap();
    let sent = codec().decode(&requests[0].body).unwrap();
    assert_eq!(sent, json!({"u": "me@example.com", "p": "secret"}));
}

#[tokio::test]
async fn test_host_key_sync_header_has_no_key() {
    let server = MockServer::start().await;
    let body = codec().encode(&json!({"key": "hk"})).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    sync_client(&server).host_key("u", "p").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let value = requests[0].headers.get(SYNC_HEADER_NAME).unwrap().to_str().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(value).unwrap();
    assert_eq!(parsed["v"], 11);
    assert_eq!(parsed["k"], "");
}

#[tokio::test]
async fn test_host_key_without_key_is_auth_error() {
    let server = MockServer::start().await;
    let body = codec().encode(&json!({"err": "nope"})).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let err = sync_client(&server).host_key("u", "p").await.unwrap_err();
    assert!(matches!(err, AnkiWebError::Auth(_)));
    let err: RememberItError = err.into();
    assert!(matches!(err, RememberItError::Authentication(_)));
}

#[tokio::test]
async fn test_host_key_forbidden_maps_to_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let transport = AnkiWebSyncTransport::new(sync_client(&server));
    let err = transport.login("u", "wrong").await.unwrap_err();
    assert!(matches!(err, RememberItError::Authentication(_)));
}

#[tokio::test]
async fn test_login_binds_session_to_endpoint() {
    let server = MockServer::start().await;
    let body = codec().encode(&json!({"key": "hk-9"})).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let transport = AnkiWebSyncTransport::new(sync_client(&server));
    let session = transport.login("me@example.com", "pw").await.unwrap();
    assert_eq!(session.hkey, "hk-9");
    assert_eq!(session.endpoint, format!("{}/", server.uri()));
    assert_eq!(session.username.as_deref(), Some("me@example.com"));
}

#[tokio::test]
async fn test_download_decompresses_collection() {
    let server = MockServer::start().await;
    let collection = fake_collection();
    let compressed = codec().compress(&collection).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(compressed))
        .expect(1)
        .mount(&server)
        .await;

    let client = sync_client(&server);
    let endpoint = format!("{}/", server.uri());
    let bytes = client.download(&endpoint, "hk").await.unwrap();
    assert_eq!(bytes, collection);

    let requests = server.received_requests().await.unwrap();
    let value = requests[0].headers.get(SYNC_HEADER_NAME).unwrap().to_str().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(value).unwrap();
    assert_eq!(parsed["k"], "hk");
}

#[tokio::test]
async fn test_download_accepts_plain_sqlite() {
    let server = MockServer::start().await;
    let collection = fake_collection();
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(collection.clone()))
        .mount(&server)
        .await;

    let endpoint = format!("{}/", server.uri());
    let bytes = sync_client(&server).download(&endpoint, "hk").await.unwrap();
    assert_eq!(bytes, collection);
}

#[tokio::test]
async fn test_download_garbage_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not a database".to_vec()))
        .mount(&server)
        .await;

    let endpoint = format!("{}/", server.uri());
    let err = sync_client(&server).download(&endpoint, "hk").await.unwrap_err();
    assert!(matches!(err, AnkiWebError::Decode { phase: Phase::Download, .. }));
}

#[tokio::test]
async fn test_download_forbidden_is_protocol_error_with_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let transport = AnkiWebSyncTransport::new(sync_client(&server));
    let session = rememberit_core::domain::Session::new("hk", &server.uri(), None);
    let err = transport.download_collection(&session).await.unwrap_err();
    match err {
        RememberItError::Protocol { phase, status, hint } => {
            assert_eq!(phase, Phase::Download);
            assert_eq!(status, 403);
            assert!(hint.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_followed_once() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    let collection = fake_collection();

    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("location", format!("{}/sync/download", second.uri()).as_str()),
        )
        .expect(1)
        .mount(&first)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .and(header_exists(SYNC_HEADER_NAME))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(codec().compress(&collection).unwrap()))
        .expect(1)
        .mount(&second)
        .await;

    let endpoint = format!("{}/", first.uri());
    let bytes = sync_client(&first).download(&endpoint, "hk").await.unwrap();
    assert_eq!(bytes, collection);
}

#[tokio::test]
async fn test_second_redirect_not_followed() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", format!("{}/sync/download", second.uri()).as_str()),
        )
        .mount(&first)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(
            ResponseTemplate::new(307)
                .insert_header("location", format!("{}/sync/download", first.uri()).as_str()),
        )
        .mount(&second)
        .await;

    let endpoint = format!("{}/", first.uri());
    let err = sync_client(&first).download(&endpoint, "hk").await.unwrap_err();
    assert_eq!(err.status_code(), Some(307));
}

#[tokio::test]
async fn test_upload_sends_compressed_collection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OK".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let collection = fake_collection();
    let transport = AnkiWebSyncTransport::new(sync_client(&server));
    let session = rememberit_core::domain::Session::new("hk", &server.uri(), None);
    transport
        .upload_collection(&session, collection.clone())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_ne!(requests[0].body, collection);
    assert_eq!(codec().decompress(&requests[0].body), collection);
}

#[tokio::test]
async fn test_session_endpoint_overrides_login_endpoint() {
    let login_server = MockServer::start().await;
    let data_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(fake_collection()))
        .expect(1)
        .mount(&data_server)
        .await;

    let transport = AnkiWebSyncTransport::new(sync_client(&login_server));
    let session = rememberit_core::domain::Session::new("hk", &data_server.uri(), None);
    transport.download_collection(&session).await.unwrap();
    assert!(login_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_log_written_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"OK".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs").join("exchange.jsonl");
    let config = SyncClientConfig {
        endpoint: format!("{}/", server.uri()),
        debug_log: Some(log_path.clone()),
        ..SyncClientConfig::default()
    };
    let client = SyncClient::new(config).unwrap();
    client.upload(&format!("{}/", server.uri()), "hk", &fake_collection()).await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    let line: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(line["method"], "POST");
    assert_eq!(line["response_status"], 200);
    assert!(line["url"].as_str().unwrap().ends_with("/sync/upload"));
}

#[tokio::test]
async fn test_exchange_log_keeps_credentials_out() {
    let server = MockServer::start().await;
    let key_body = codec().encode(&json!({"key": "hostkey-SECRET-777"})).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/hostKey"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(key_body))
        .mount(&server)
        .await;
    let collection = codec().compress(&fake_collection()).unwrap();
    Mock::given(method("POST"))
        .and(path("/sync/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(collection))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("exchange.jsonl");
    let endpoint = format!("{}/", server.uri());
    let config = SyncClientConfig {
        endpoint: endpoint.clone(),
        debug_log: Some(log_path.clone()),
        ..SyncClientConfig::default()
    };
    let client = SyncClient::new(config).unwrap();
    let key = client.host_key("me@example.com", "hunter2-PASSWORD").await.unwrap();
    client.download(&endpoint, &key).await.unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(!log.contains("hunter2-PASSWORD"));
    assert!(!log.contains("hostkey-SECRET-777"));

    let login: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(login["request_body_preview"], "<redacted>");
    assert!(login["request_body_len"].as_u64().unwrap() > 0);
}
