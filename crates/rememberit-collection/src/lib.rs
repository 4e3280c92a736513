//! RememberIt Collection - Anki collection database access
//!
//! Opens a downloaded collection (an SQLite file) in a private scratch
//! directory, reads decks, notes and cards, applies local edits with the
//! bookkeeping the desktop application expects, and exports the file again
//! for upload.
//!
//! ## Architecture
//!
//! This is the only crate that knows table and column names. Everything
//! above it works with the domain types from `rememberit-core`.
//!
//! ## Key Components
//!
//! - [`ScratchDatabase`] - Scratch copy of the file plus its connection pool
//! - [`CollectionStore`] - Typed reads and mutations
//! - [`package`] - `.apkg` export of a single deck
//! - [`CollectionError`] - Error types for collection operations

pub mod fields;
pub mod package;
pub mod pool;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::path::PathBuf;

use rememberit_core::domain::NoteId;
use rememberit_core::RememberItError;

pub use pool::ScratchDatabase;
pub use schema::SchemaGeneration;
pub use store::{CollectionStore, NoteTypeInfo, RemovedDeck};

/// Errors that can occur during collection operations
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// Failed to materialise or open the database file
    #[error("Failed to open collection at {}: {message}", .path.display())]
    OpenFailed { path: PathBuf, message: String },

    /// A database query failed
    #[error("Query failed on {}: {message}", .path.display())]
    QueryFailed { path: PathBuf, message: String },

    /// Stored JSON or blob content could not be interpreted
    #[error("Unreadable collection data in {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    /// The collection has no note type with a front and back field
    #[error("No two-field note type in {}", .path.display())]
    NoNoteType { path: PathBuf },

    /// Referenced note does not exist
    #[error("note {0} not found")]
    NoteNotFound(NoteId),

    /// Referenced deck does not exist
    #[error("deck {0} not found")]
    DeckNotFound(String),

    /// Filtered decks only borrow cards from other decks
    #[error("'{0}' is a filtered deck and cannot hold new cards")]
    FilteredDeck(String),

    /// A rename would collide with another deck
    #[error("a deck named '{0}' already exists")]
    DeckExists(String),

    /// A deck package could not be written or read
    #[error("Package error at {}: {message}", .path.display())]
    Package { path: PathBuf, message: String },
}

impl From<CollectionError> for RememberItError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::NoteNotFound(_) | CollectionError::DeckNotFound(_) => {
                RememberItError::NotFound(err.to_string())
            }
            CollectionError::DeckExists(_) | CollectionError::FilteredDeck(_) => {
                RememberItError::InvalidInput(err.to_string())
            }
            CollectionError::OpenFailed { ref path, .. }
            | CollectionError::QueryFailed { ref path, .. }
            | CollectionError::Corrupt { ref path, .. }
            | CollectionError::Package { ref path, .. }
            | CollectionError::NoNoteType { ref path } => RememberItError::Store {
                path: path.clone(),
                message: err.to_string(),
            },
        }
    }
}
