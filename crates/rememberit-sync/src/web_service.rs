//! Legacy web service strategy
//!
//! Reads the deck tree from the deck list endpoint and each deck's cards
//! from the search endpoint; writes go to the editor and deck endpoints one
//! request at a time. Authentication is the browser cookie held by the web
//! service client, so the session is only checked for presence.
//!
//! Search results carry no tags, so cards read this way have empty tags.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rememberit_core::config::StrategyKind;
use rememberit_core::domain::{Card, Deck, DeckId, NoteId, NoteTypeId, Session, PATH_SEPARATOR};
use rememberit_core::ports::{IWebService, NoteEdit};
use rememberit_core::usecases::{plan_upsert, UpsertAction, UpsertReport};
use rememberit_core::RememberItError;
use tracing::{debug, info};

use crate::state::{StateTracker, SyncState};
use crate::strategy::{CardContent, SyncStrategy, UpsertBatch};

pub struct WebServiceStrategy {
    web: Arc<dyn IWebService>,
    minutes_west_of_utc: i32,
    note_type_id: Option<NoteTypeId>,
}

impl WebServiceStrategy {
    pub fn new(web: Arc<dyn IWebService>, minutes_west_of_utc: i32) -> Self {
        Self {
            web,
            minutes_west_of_utc,
            note_type_id: None,
        }
    }

    #[must_use]
    pub fn with_note_type(mut self, note_type_id: Option<NoteTypeId>) -> Self {
        self.note_type_id = note_type_id;
        self
    }

    /// Deck tree flattened, without the server's unnamed root, cards attached
    async fn fetch_decks(&self) -> Result<Vec<Deck>, RememberItError> {
        let info = self.web.deck_list(self.minutes_west_of_utc).await?;
        let mut decks: Vec<Deck> = info
            .top_node
            .map(|root| root.flatten())
            .unwrap_or_default()
            .into_iter()
            .filter(|deck| !deck.path.is_empty())
            .collect();

        let edit_base = self.web.edit_base_url();
        for deck in &mut decks {
            let hits = self.web.search(&deck_query(&deck.path)).await?;
            deck.cards = hits
                .into_iter()
                .map(|hit| Card::from_search_text(hit.note_id, &hit.text, &edit_base).in_deck(deck.id))
                .collect();
        }
        debug!(decks = decks.len(), "Fetched decks from web service");
        Ok(decks)
    }

    /// Run `requests` as one mutation and read the decks back
    async fn mutate<F, Fut>(
        &self,
        session: &Session,
        tracker: &StateTracker,
        requests: F,
    ) -> Result<Vec<Deck>, RememberItError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<(), RememberItError>> + Send,
    {
        tracker.advance(SyncState::Mutating)?;
        tracker.advance(SyncState::CollectionDirty)?;
        tracker.advance(SyncState::Uploading)?;
        requests().await?;
        tracker.advance(SyncState::CollectionLoaded)?;
        self.full_sync(session, tracker).await
    }

    fn create_edit(
        &self,
        deck_id: DeckId,
        front: &str,
        back: &str,
        tags: &str,
        note_type_id: Option<NoteTypeId>,
    ) -> NoteEdit {
        NoteEdit {
            front: front.to_string(),
            back: back.to_string(),
            tags: tags.to_string(),
            note_type_id: note_type_id.or(self.note_type_id),
            deck_id: Some(deck_id),
            note_id: None,
        }
    }
}

fn update_edit(note_id: NoteId, front: &str, back: &str, tags: &str) -> NoteEdit {
    NoteEdit {
        front: front.to_string(),
        back: back.to_string(),
        tags: tags.to_string(),
        note_type_id: None,
        deck_id: None,
        note_id: Some(note_id),
    }
}

/// Search for the cards directly in `path`, excluding subdecks
pub fn deck_query(path: &str) -> String {
    let quoted = path.replace('"', "\\\"");
    format!("deck:\"{quoted}\" -deck:\"{quoted}{PATH_SEPARATOR}*\"")
}

#[async_trait]
impl SyncStrategy for WebServiceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WebService
    }

    #[tracing::instrument(skip(self, _session, tracker))]
    async fn full_sync(
        &self,
        _session: &Session,
        tracker: &StateTracker,
    ) -> Result<Vec<Deck>, RememberItError> {
        tracker.advance(SyncState::Downloading)?;
        let decks = self.fetch_decks().await?;
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
        let decks = self
            .mutate(session, tracker, || self.web.create_deck(path))
            .await?;
        let deck_id = decks
            .iter()
            .find(|deck| deck.path.eq_ignore_ascii_case(path))
            .map(|deck| deck.id)
            .ok_or_else(|| {
                RememberItError::NotFound(format!("deck '{path}' not listed after creation"))
            })?;
        info!(deck_id = %deck_id, path, "Created deck");
        Ok((deck_id, decks))
    }

    async fn rename_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        new_path: &str,
    ) -> Result<Vec<Deck>, RememberItError> {
        self.mutate(session, tracker, || self.web.rename_deck(deck_id, new_path))
            .await
    }

    async fn remove_deck(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
    ) -> Result<Vec<Deck>, RememberItError> {
        self.mutate(session, tracker, || self.web.remove_deck(deck_id))
            .await
    }

    async fn add_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        deck_id: DeckId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError> {
        let tags = card.tags.unwrap_or_default();
        let edit = self.create_edit(deck_id, card.front, card.back, tags, None);
        self.mutate(session, tracker, || async move { self.web.add_or_update(&edit).await })
            .await
    }

    async fn update_card(
        &self,
        session: &Session,
        tracker: &StateTracker,
        note_id: NoteId,
        card: CardContent<'_>,
    ) -> Result<Vec<Deck>, RememberItError> {
        // The editor replaces tags wholesale.
        let edit = update_edit(note_id, card.front, card.back, card.tags.unwrap_or_default());
        self.mutate(session, tracker, || async move { self.web.add_or_update(&edit).await })
            .await
    }

    async fn upsert(
        &self,
        session: &Session,
        tracker: &StateTracker,
        batch: UpsertBatch<'_>,
    ) -> Result<(UpsertReport, Vec<Deck>), RememberItError> {
        let current = self.full_sync(session, tracker).await?;
        let existing = current
            .iter()
            .find(|deck| deck.id == batch.deck_id)
            .map(|deck| deck.cards.clone())
            .unwrap_or_default();

        let actions = plan_upsert(&existing, batch.cards, batch.replace);
        let report = UpsertReport::from_actions(&actions);
        if report.is_noop() {
            info!(%report, "Upsert found nothing to change");
            return Ok((report, current));
        }

        let edits: Vec<NoteEdit> = actions
            .iter()
            .filter_map(|action| match action {
                UpsertAction::Insert { front, back, tags } => Some(self.create_edit(
                    batch.deck_id,
                    front,
                    back,
                    tags,
                    batch.note_type_id,
                )),
                UpsertAction::Update {
                    note_id,
                    front,
                    back,
                    tags,
                } => Some(update_edit(*note_id, front, back, tags)),
                UpsertAction::Skip { .. } | UpsertAction::Duplicate { .. } => None,
            })
            .collect();

        let decks = self
            .mutate(session, tracker, || async move {
                for edit in &edits {
                    self.web.add_or_update(edit).await?;
                }
                Ok(())
            })
            .await?;
        info!(%report, "Applied upsert");
        Ok((report, decks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_query_excludes_children() {
        assert_eq!(deck_query("Spanish"), r#"deck:"Spanish" -deck:"Spanish::*""#);
    }

    #[test]
    fn test_deck_query_escapes_quotes() {
        assert_eq!(deck_query(r#"My "best""#), r#"deck:"My \"best\"" -deck:"My \"best\"::*""#);
    }
}
