//! Full collection swap strategy
//!
//! Every operation downloads the whole collection, opens it in a scratch
//! SQLite file, and reads or mutates it there. Mutations are then uploaded
//! in full and followed by a fresh download, so the deck list returned to
//! the orchestrator is always what the server now holds.
//!
//! The scratch file belongs to the open [`CollectionStore`] and is removed
//! when the store is dropped, whichever way the operation ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use rememberit_collection::{CollectionError, CollectionStore};
use rememberit_core::config::StrategyKind;
use rememberit_core::domain::{Deck, DeckId, NoteId, NoteTypeId, Session};
use rememberit_core::ports::{Clock, ISyncTransport};
use rememberit_core::usecases::{plan_upsert, UpsertAction, UpsertReport};
use rememberit_core::RememberItError;
use tracing::{debug, info, warn};

use crate::state::{StateTracker, SyncState};
use crate::strategy::{CardContent, SyncStrategy, UpsertBatch};

/// Result of a mutation callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    /// Whether the collection was written and must be uploaded
    pub changed: bool,
}

impl<T> Outcome<T> {
    pub fn changed(value: T) -> Self {
        Self { value, changed: true }
    }

    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

pub struct CollectionSwapStrategy {
    transport: Arc<dyn ISyncTransport>,
    clock: Arc<dyn Clock>,
    note_type_id: Option<NoteTypeId>,
    local_copy: Option<PathBuf>,
}

impl CollectionSwapStrategy {
    pub fn new(transport: Arc<dyn ISyncTransport>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            note_type_id: None,
            local_copy: None,
        }
    }

    /// Note type for new notes when a call names none
    #[must_use]
    pub fn with_note_type(mut self, note_type_id: Option<NoteTypeId>) -> Self {
        self.note_type_id = note_type_id;
        self
    }

    /// Keep a copy of the last downloaded collection at `path`
    #[must_use]
    pub fn with_local_copy(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_copy = Some(path.into());
        self
    }

    async fn download_store(
        &self,
        session: &Session,
        tracker: &StateTracker,
        note_type_id: Option<NoteTypeId>,
    ) -> Result<(CollectionStore, Vec<u8>), RememberItError> {
        tracker.advance(SyncState::Downloading)?;
        let bytes = self.transport.download_collection(session).await?;
        let store = CollectionStore::open(&bytes, Arc::clone(&self.clock))
            .await?
            .with_note_type(note_type_id.or(self.note_type_id));
        debug!(generation = %store.generation(), size = bytes.len(), "Opened downloaded collection");
        Ok((store, bytes))
    }

    /// Download, apply `mutation`, upload, and read the result back
    ///
    /// When the callback reports no change nothing is uploaded and the decks
    /// of the downloaded collection are returned.
    ///
    /// # Errors
    ///
    /// Transport errors from either transfer and store errors from the
    /// callback propagate unchanged. Nothing is uploaded unless the callback
    /// succeeds.
    #[tracing::instrument(skip(self, session, tracker, mutation))]
    pub async fn mutate_and_reupload<T, F>(
        &self,
        session: &Session,
        tracker: &StateTracker,
        note_type_id: Option<NoteTypeId>,
        mutation: F,
    ) -> Result<(T, Vec<Deck>), RememberItError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s CollectionStore) -> BoxFuture<'s, Result<Outcome<T>, CollectionError>>
            + Send,
    {
        let (store, _) = self.download_store(session, tracker, note_type_id).await?;
        tracker.advance(SyncState::CollectionLoaded)?;

        tracker.advance(SyncState::Mutating)?;
        let outcome = mutation(&store).await?;
        if !outcome.changed {
            let decks = store.load_decks().await?;
            tracker.advance(SyncState::CollectionLoaded)?;
            debug!("Mutation left the collection unchanged, skipping upload");
            return Ok((outcome.value, decks));
        }
        tracker.advance(SyncState::CollectionDirty)?;

        store.touch_collection_modified().await?;
        let collection = store.export().await?;

        tracker.advance(SyncState::Uploading)?;
        self.transport.upload_collection(session, collection).await?;
        tracker.advance(SyncState::CollectionLoaded)?;

        let decks = self.full_sync(session, tracker).await?;
        Ok((outcome.value, decks))
    }

    async fn save_local_copy(&self, bytes: &[u8]) {
        let Some(path) = &self.local_copy else {
            return;
        };
        if let Err(e) = write_atomic(path, bytes).await {
            warn!(path = %path.display(), error = %e, "Failed to save local collection copy");
        } else {
            debug!(path = %path.display(), size = bytes.len(), "Saved local collection copy");
        }
    }
}

/// Write via a sibling temp file and rename
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Tags to write on update; empty keeps the note's tags
fn update_tags(tags: &str) -> Option<&str> {
    (!tags.is_empty()).then_some(tags)
}

#[async_trait]
impl SyncStrategy for CollectionSwapStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CollectionSwap
    }

    #[tracing::instrument(skip(self, session, tracker))]
    async fn full_sync(
        &self,
        session: &Session,
        tracker: &StateTracker,
    ) -> Result<Vec<Deck>, RememberItError> {
        let (store, bytes) = self.download_store(session, tracker, None).await?;
        let decks = store.load_decks().await?;
        drop(store);
        self.save_local_copy(&bytes).await;
        tracker.advance(SyncState::CollectionLoaded)?;
        info!(decks = decks.len(), "Full sync complete");
        Ok(decks)
    }

    async fn create_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        path: &str,
    ) -> Result<(DeckId, Vec<Deck>), RememberItError> {
        let path = path.to_string();
        self.mutate_and_reupload(session, tracker, None, move |store| {
            Box::pin(async move {
                if let Some(existing) = store.find_deck(&path).await? {
                    return Ok(Outcome::unchanged(existing));
                }
                let deck_id = store.insert_deck(&path).await?;
                info!(deck_id = %deck_id, path = %path, "Created deck");
                Ok(Outcome::changed(deck_id))
            })
        })
        .await
    }

    async fn rename_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        new_path: &str,
    ) -> Result<Vec<Deck>, RememberItError> {
        let new_path = new_path.to_string();
        let ((), decks) = self
            .mutate_and_reupload(session, tracker, None, move |store| {
                Box::pin(async move {
                    store.rename_deck(deck_id, &new_path).await?;
                    info!(deck_id = %deck_id, path = %new_path, "Renamed deck");
                    Ok(Outcome::changed(()))
                })
            })
            .await?;
        Ok(decks)
    }

    async fn remove_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
    ) -> Result<Vec<Deck>, RememberItError> {
        let ((), decks) = self
            .mutate_and_reupload(session, tracker, None, move |store| {
                Box::pin(async move {
                    let removed = store.remove_deck(deck_id).await?;
                    info!(
                        deck_id = %deck_id,
                        decks = removed.deck_ids.len(),
                        notes = removed.notes,
                        cards = removed.cards,
                        "Removed deck"
                    );
                    Ok(Outcome::changed(()))
                })
            })
            .await?;
        Ok(decks)
    }

    async fn add_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError> {
        let front = card.front.to_string();
        let back = card.back.to_string();
        let tags = card.tags.unwrap_or_default().to_string();
        let ((), decks) = self
            .mutate_and_reupload(session, tracker, None, move |store| {
                Box::pin(async move {
                    let (note_id, card_id) = store.insert_note(deck_id, &front, &back, &tags).await?;
                    info!(deck_id = %deck_id, note_id = %note_id, card_id = %card_id, "Added card");
                    Ok(Outcome::changed(()))
                })
            })
            .await?;
        Ok(decks)
    }

    async fn update_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        note_id: NoteId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError> {
        let front = card.front.to_string();
        let back = card.back.to_string();
        let tags = card.tags.map(str::to_string);
        let ((), decks) = self
            .mutate_and_reupload(session, tracker, None, move |store| {
                Box::pin(async move {
                    store.update_note(note_id, &front, &back, tags.as_deref()).await?;
                    info!(note_id = %note_id, "Updated card");
                    Ok(Outcome::changed(()))
                })
            })
            .await?;
        Ok(decks)
    }

    #[tracing::instrument(skip(self, session, tracker, batch), fields(deck_id = %batch.deck_id, cards = batch.cards.len()))]
    async fn upsert(
        &self,
        session: &Session,
        tracker: &StateTracker,
        batch: UpsertBatch<'_>,
    ) -> Result<(UpsertReport, Vec<Deck>), RememberItError> {
        let deck_id = batch.deck_id;
        let replace = batch.replace;
        let incoming = batch.cards.to_vec();
        self.mutate_and_reupload(session, tracker, batch.note_type_id, move |store| {
            Box::pin(async move {
                let mut by_deck = store.list_cards().await?;
                let existing = by_deck.remove(&deck_id).unwrap_or_default();
                let actions = plan_upsert(&existing, &incoming, replace);
                let report = UpsertReport::from_actions(&actions);

                for action in &actions {
                    match action {
                        UpsertAction::Insert { front, back, tags } => {
                            store.insert_note(deck_id, front, back, tags).await?;
                        }
                        UpsertAction::Update {
                            note_id,
                            front,
                            back,
                            tags,
                        } => {
                            store
                                .update_note(*note_id, front, back, update_tags(tags))
                                .await?;
                        }
                        UpsertAction::Skip { .. } | UpsertAction::Duplicate { .. } => {}
                    }
                }

                info!(%report, "Applied upsert");
                if report.is_noop() {
                    Ok(Outcome::unchanged(report))
                } else {
                    Ok(Outcome::changed(report))
                }
            })
        })
        .await
    }
}
