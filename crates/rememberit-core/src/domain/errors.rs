//! Domain error types
//!
//! [`RememberItError`] is the error every public operation returns. Adapter
//! crates keep their own narrow error enums and convert into this one at the
//! port boundary, attaching the [`Phase`] in which the failure happened.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The step of a client operation in which an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Exchanging credentials for a session key
    Auth,
    /// Downloading the full collection
    Download,
    /// Applying a local change to the collection
    Mutate,
    /// Uploading the modified collection
    Upload,
    /// Metadata calls (deck list, search, legacy web-service edits)
    Query,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Auth => "auth",
            Phase::Download => "download",
            Phase::Mutate => "mutate",
            Phase::Upload => "upload",
            Phase::Query => "query",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by RememberIt operations
#[derive(Debug, Error)]
pub enum RememberItError {
    /// Credentials were rejected or the auth response could not be understood
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An operation needing a session was attempted without one
    #[error("Not logged in. Call login() first.")]
    NotLoggedIn,

    /// Network-level failure (timeout, refused connection, DNS)
    #[error("Transport error during {phase}: {message}")]
    Transport {
        /// Phase in which the request was issued
        phase: Phase,
        /// Underlying error text
        message: String,
    },

    /// The remote service answered with a non-success status
    #[error("{phase} request failed with HTTP {status}{}", hint_suffix(.hint))]
    Protocol {
        /// Phase in which the request was issued
        phase: Phase,
        /// HTTP status code
        status: u16,
        /// Remediation hint for permission errors
        hint: Option<String>,
    },

    /// Every decoding strategy failed for a response payload
    #[error("Could not decode {phase} response: {message}")]
    Decode {
        /// Phase in which the response arrived
        phase: Phase,
        /// Diagnostics listing each attempted strategy
        message: String,
    },

    /// A deck or note referenced by id, name or path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local database open/read/write failure
    #[error("Collection store error at {}: {message}", .path.display())]
    Store {
        /// Database or scratch file involved
        path: PathBuf,
        /// Underlying error text
        message: String,
    },

    /// Caller-supplied data was malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl RememberItError {
    /// Returns the phase tag for network-related errors
    pub fn phase(&self) -> Option<Phase> {
        match self {
            RememberItError::Transport { phase, .. }
            | RememberItError::Protocol { phase, .. }
            | RememberItError::Decode { phase, .. } => Some(*phase),
            RememberItError::Authentication(_) => Some(Phase::Auth),
            _ => None,
        }
    }

    /// Returns true for permission-denied protocol errors
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RememberItError::Protocol { status: 403, .. })
    }

    /// Wraps a [`RememberItError::NotFound`] with the caller's lookup key
    pub fn with_lookup_key(self, key: &str) -> Self {
        match self {
            RememberItError::NotFound(what) if !what.contains(key) => {
                RememberItError::NotFound(format!("{what} (looked up by '{key}')"))
            }
            other => other,
        }
    }
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default()
}

/// Errors raised when validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Deck names may not be empty or consist of empty path segments
    #[error("Invalid deck name: {0}")]
    InvalidDeckName(String),

    /// Identifier was not a positive integer
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

impl From<DomainError> for RememberItError {
    fn from(err: DomainError) -> Self {
        RememberItError::InvalidInput(err.to_string())
    }
}

/// Result alias used across the workspace
pub type Result<T, E = RememberItError> = std::result::Result<T, E>;
