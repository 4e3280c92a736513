//! `ISyncTransport` over the AnkiWeb sync protocol
//!
//! Download and upload go to the endpoint recorded in the session, which
//! may differ from the login endpoint after a redirect or a settings change.

use async_trait::async_trait;
use rememberit_core::domain::Session;
use rememberit_core::ports::ISyncTransport;
use rememberit_core::RememberItError;
use tracing::info;

use crate::sync_client::SyncClient;

/// Sync transport backed by [`SyncClient`]
pub struct AnkiWebSyncTransport {
    client: SyncClient,
}

impl AnkiWebSyncTransport {
    pub fn new(client: SyncClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &SyncClient {
        &self.client
    }
}

#[async_trait]
impl ISyncTransport for AnkiWebSyncTransport {
    async fn login(&self, username: &str, password: &str) -> Result<Session, RememberItError> {
        let hkey = self.client.host_key(username, password).await?;
        info!(endpoint = %self.client.endpoint(), "Obtained host key");
        Ok(Session::new(hkey, self.client.endpoint(), Some(username.to_string())))
    }

    async fn download_collection(&self, session: &Session) -> Result<Vec<u8>, RememberItError> {
        Ok(self.client.download(&session.endpoint, &session.hkey).await?)
    }

    async fn upload_collection(
        &self,
        session: &Session,
        collection: Vec<u8>,
    ) -> Result<(), RememberItError> {
        Ok(self
            .client
            .upload(&session.endpoint, &session.hkey, &collection)
            .await?)
    }
}
