//! Legacy web service port
//!
//! The AnkiWeb browser endpoints (`/svc/decks/*`, `/svc/search/*`,
//! `/svc/editor/*`) accept cookie-authenticated binary messages. They are
//! kept behind this trait so the legacy strategy can be selected at
//! configuration time.

use serde::{Deserialize, Serialize};

use crate::domain::deck::DeckNode;
use crate::domain::errors::RememberItError;
use crate::domain::newtypes::{DeckId, NoteId, NoteTypeId};

/// Decoded deck list response
///
/// The three scalars are `None` when the server omitted them, which is
/// distinct from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckListInfo {
    pub top_node: Option<DeckNode>,
    pub current_deck_id: Option<i64>,
    pub collection_size_bytes: Option<u64>,
    pub media_size_bytes: Option<u64>,
}

/// A single search row: note id and `"front / back"` text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub note_id: NoteId,
    pub text: String,
}

/// Note content sent to the editor endpoint
///
/// `note_id` present means update; absent means create, which requires
/// `note_type_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEdit {
    pub front: String,
    pub back: String,
    pub tags: String,
    pub note_type_id: Option<NoteTypeId>,
    pub deck_id: Option<DeckId>,
    pub note_id: Option<NoteId>,
}

/// Port trait for the legacy web service
#[async_trait::async_trait]
pub trait IWebService: Send + Sync {
    /// Fetch the deck tree
    async fn deck_list(&self, minutes_west_of_utc: i32) -> Result<DeckListInfo, RememberItError>;

    /// Run a search query such as `deck:"Spanish"`
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RememberItError>;

    /// Add a note or update an existing one
    async fn add_or_update(&self, edit: &NoteEdit) -> Result<(), RememberItError>;

    async fn create_deck(&self, name: &str) -> Result<(), RememberItError>;

    async fn rename_deck(&self, deck_id: DeckId, name: &str) -> Result<(), RememberItError>;

    async fn remove_deck(&self, deck_id: DeckId) -> Result<(), RememberItError>;

    /// Base URL used to build card edit links
    fn edit_base_url(&self) -> String;
}
