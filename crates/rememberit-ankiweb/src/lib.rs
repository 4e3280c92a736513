//! RememberIt AnkiWeb - HTTP clients for AnkiWeb
//!
//! Provides async clients for:
//! - The sync protocol: host key login, full collection download and upload
//! - The legacy web service: deck list, search, editor and deck management
//!   endpoints that take cookie authentication and binary messages
//!
//! ## Modules
//!
//! - [`sync_client`] - Sync protocol HTTP client
//! - [`web_client`] - Web service HTTP client, implements `IWebService`
//! - [`provider`] - `ISyncTransport` implementation over [`sync_client`]
//! - [`exchange_log`] - Optional JSON-lines record of every exchange

pub mod exchange_log;
pub mod provider;
pub mod sync_client;
pub mod web_client;

use rememberit_core::{Phase, RememberItError};
use rememberit_proto::ProtoError;
use thiserror::Error;

pub use provider::AnkiWebSyncTransport;
pub use sync_client::{SyncClient, SyncClientConfig};
pub use web_client::{WebServiceClient, WebServiceConfig};

/// Remediation shown when AnkiWeb answers 403
pub const FORBIDDEN_HINT: &str = "AnkiWeb refused the request. Log in again to refresh the \
session key; for web-service calls, paste fresh cookies from a logged-in browser into the \
cookie_header settings.";

/// Errors that can occur when talking to AnkiWeb
#[derive(Debug, Error)]
pub enum AnkiWebError {
    /// Timeout, refused connection, DNS failure, broken body stream
    #[error("Network error during {phase}: {message}")]
    Network { phase: Phase, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} during {phase}")]
    Status {
        phase: Phase,
        status: u16,
        hint: Option<String>,
    },

    /// The response body could not be decoded
    #[error("Undecodable {phase} response: {source}")]
    Decode {
        phase: Phase,
        #[source]
        source: ProtoError,
    },

    /// The host key response carried no usable key
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A configured or redirected URL is not valid
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A request could not be built from the given input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl AnkiWebError {
    pub(crate) fn network(phase: Phase, err: impl std::fmt::Display) -> Self {
        Self::Network {
            phase,
            message: err.to_string(),
        }
    }

    /// Status error, with a hint for 403
    pub(crate) fn status(phase: Phase, status: u16) -> Self {
        Self::Status {
            phase,
            status,
            hint: (status == 403).then(|| FORBIDDEN_HINT.to_string()),
        }
    }

    pub(crate) fn decode(phase: Phase, source: ProtoError) -> Self {
        Self::Decode { phase, source }
    }

    /// The HTTP status for status errors
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<AnkiWebError> for RememberItError {
    fn from(err: AnkiWebError) -> Self {
        match err {
            AnkiWebError::Network { phase, message } => RememberItError::Transport { phase, message },
            AnkiWebError::Status {
                phase: Phase::Auth,
                status: status @ (401 | 403),
                ..
            } => RememberItError::Authentication(format!(
                "AnkiWeb rejected the credentials (HTTP {status})"
            )),
            AnkiWebError::Status {
                phase,
                status,
                hint,
            } => RememberItError::Protocol {
                phase,
                status,
                hint,
            },
            AnkiWebError::Decode { phase, source } => source.into_error(phase),
            AnkiWebError::Auth(message) => RememberItError::Authentication(message),
            AnkiWebError::InvalidUrl(message) | AnkiWebError::InvalidRequest(message) => {
                RememberItError::InvalidInput(message)
            }
        }
    }
}
