//! Sync strategy seam
//!
//! A strategy carries out one protocol generation's version of each
//! orchestrator operation. Which one is used is fixed when the orchestrator
//! is built, from `Settings::strategy`.
//!
//! Every mutating call returns the complete, freshly read deck list so the
//! orchestrator can swap its cache in one step.

use async_trait::async_trait;
use rememberit_core::config::StrategyKind;
use rememberit_core::domain::{CardDocument, Deck, DeckId, NoteId, NoteTypeId, Session};
use rememberit_core::usecases::UpsertReport;
use rememberit_core::RememberItError;

use crate::state::StateTracker;

/// Content for a new or edited card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent<'a> {
    pub front: &'a str,
    pub back: &'a str,
    /// `None` keeps existing tags on update and means no tags on insert
    pub tags: Option<&'a str>,
}

/// A bulk upsert against one deck
#[derive(Debug, Clone)]
pub struct UpsertBatch<'a> {
    pub deck_id: DeckId,
    pub cards: &'a [CardDocument],
    /// Rewrite notes matched by id even when their content is unchanged
    pub replace: bool,
    pub note_type_id: Option<NoteTypeId>,
}

#[async_trait]
pub trait SyncStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Read every deck with its cards
    async fn full_sync(
        &self,
        session: &Session,
        tracker: &StateTracker,
    ) -> Result<Vec<Deck>, RememberItError>;

    /// Create `path` (and any missing parents); returns the new deck id
    /// and the refreshed decks
    async fn create_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        path: &str,
    ) -> Result<(DeckId, Vec<Deck>), RememberItError>;

    async fn rename_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        new_path: &str,
    ) -> Result<Vec<Deck>, RememberItError>;

    async fn remove_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
    ) -> Result<Vec<Deck>, RememberItError>;

    async fn add_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError>;

    async fn update_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        note_id: NoteId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError>;

    /// Apply the upsert policy against the current content of the deck
    async fn upsert(
        &self,
        session: &Session,
        tracker: &StateTracker,
        batch: UpsertBatch<'_>,
    ) -> Result<(UpsertReport, Vec<Deck>), RememberItError>;
}
