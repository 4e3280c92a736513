//! Sync transport port (driven/secondary port)
//!
//! The collection-swap strategy needs three calls from the remote sync
//! service: exchange credentials for a host key, download the whole
//! collection, and upload it back. Implementations own compression, headers,
//! redirects and timeouts.
//!
//! ## Design Notes
//!
//! - Methods return [`RememberItError`] tagged with the phase (`auth`,
//!   `download`, `upload`) so callers can tell which step failed.
//! - Payloads are raw SQLite file bytes; the transport handles the wire
//!   compression in both directions.

use crate::domain::errors::RememberItError;
use crate::domain::session::Session;

/// Port trait for the full-collection sync service
#[async_trait::async_trait]
pub trait ISyncTransport: Send + Sync {
    /// Exchange credentials for a session key
    ///
    /// Fails with [`RememberItError::Authentication`] when the credentials
    /// are rejected or the response carries no key.
    async fn login(&self, username: &str, password: &str) -> Result<Session, RememberItError>;

    /// Download the complete collection database
    ///
    /// # Returns
    /// Uncompressed SQLite file bytes
    async fn download_collection(&self, session: &Session) -> Result<Vec<u8>, RememberItError>;

    /// Replace the remote collection with `collection`
    ///
    /// # Arguments
    /// * `collection` - Uncompressed SQLite file bytes
    async fn upload_collection(
        &self,
        session: &Session,
        collection: Vec<u8>,
    ) -> Result<(), RememberItError>;
}
