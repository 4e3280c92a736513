//! Sync orchestrator
//!
//! Owns the session, the deck cache and the state machine, and runs every
//! operation through the configured [`SyncStrategy`].
//!
//! ## Invariants
//!
//! - Operations that need the network fail with `NotLoggedIn` before any
//!   request when no session is held.
//! - The cache is only replaced with the complete result of a successful
//!   operation; a failure leaves the previous cache in place.
//! - After a successful mutation the cache holds what the server returned
//!   on the follow-up read, never a locally patched copy.

use std::sync::Arc;

use rememberit_core::config::StrategyKind;
use rememberit_core::domain::{
    normalize_deck_path, Deck, DeckCollection, DeckDocument, DeckId, NoteId, NoteTypeId, Session,
};
use rememberit_core::ports::ISyncTransport;
use rememberit_core::usecases::UpsertReport;
use rememberit_core::RememberItError;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{DeckCache, DeckRef};
use crate::state::{StateTracker, SyncState};
use crate::strategy::{CardContent, SyncStrategy, UpsertBatch};

/// Options for [`SyncOrchestrator::upsert_deck`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOptions {
    /// Deck to target instead of the document's `name`
    pub deck_name: Option<String>,
    /// Note type for inserted notes
    pub note_type_id: Option<NoteTypeId>,
    /// Rewrite notes matched by id even when unchanged
    pub replace: bool,
}

pub struct SyncOrchestrator {
    transport: Arc<dyn ISyncTransport>,
    strategy: Arc<dyn SyncStrategy>,
    session: RwLock<Option<Session>>,
    cache: RwLock<DeckCache>,
    tracker: StateTracker,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with no session
    ///
    /// # Arguments
    /// * `transport` - Used for login whichever strategy is selected
    /// * `strategy` - Carries out reads and mutations
    pub fn new(transport: Arc<dyn ISyncTransport>, strategy: Arc<dyn SyncStrategy>) -> Self {
        Self {
            transport,
            strategy,
            session: RwLock::new(None),
            cache: RwLock::new(DeckCache::default()),
            tracker: StateTracker::new(),
        }
    }

    /// Starts from a previously persisted session
    #[must_use]
    pub fn with_session(mut self, session: Option<Session>) -> Self {
        if let Some(session) = session {
            *self.session.get_mut() = Some(session);
            self.cache.get_mut().clear();
            self.mark_authenticated();
        }
        self
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub fn state(&self) -> SyncState {
        self.tracker.current()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn session_key(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.hkey.clone())
    }

    /// Adopt a session obtained elsewhere (e.g. loaded from settings)
    pub async fn restore_session(&self, session: Session) {
        *self.session.write().await = Some(session);
        self.cache.write().await.clear();
        self.mark_authenticated();
    }

    /// Walk from `LoggedOut` to `Authenticated` for an adopted session
    fn mark_authenticated(&self) {
        self.tracker.reset();
        for target in [SyncState::Authenticating, SyncState::Authenticated] {
            if let Err(e) = self.tracker.advance(target) {
                warn!(error = %e, "Rejected session state transition");
                return;
            }
        }
    }

    /// Exchange credentials for a session key and keep it
    ///
    /// # Errors
    ///
    /// `Authentication` when the credentials are rejected or no key comes
    /// back; transport errors tagged with the auth phase.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, RememberItError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(RememberItError::InvalidInput(
                "username and password are required".to_string(),
            ));
        }
        if self.tracker.advance(SyncState::Authenticating).is_err() {
            self.tracker.reset();
            self.tracker.advance(SyncState::Authenticating)?;
        }

        match self.transport.login(username, password).await {
            Ok(session) => {
                *self.session.write().await = Some(session.clone());
                self.cache.write().await.clear();
                self.tracker.advance(SyncState::Authenticated)?;
                info!(endpoint = %session.endpoint, "Logged in");
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.settle().await;
                Err(e)
            }
        }
    }

    /// Forget the session and the cached decks
    pub async fn logout(&self) {
        *self.session.write().await = None;
        self.cache.write().await.clear();
        self.tracker.reset();
        info!("Logged out");
    }

    /// Same as [`logout`](Self::logout); persisted state is the caller's
    pub async fn reset(&self) {
        self.logout().await;
    }

    /// Download everything and replace the cache
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> Result<DeckCollection, RememberItError> {
        let session = self.require_session().await?;
        let result = self.strategy.full_sync(&session, &self.tracker).await;
        self.finish(result).await
    }

    /// Cached decks, syncing first only when the cache is empty
    pub async fn decks(&self) -> Result<DeckCollection, RememberItError> {
        {
            let cache = self.cache.read().await;
            if !cache.is_empty() {
                return Ok(cache.to_collection());
            }
        }
        self.sync().await
    }

    /// Look up one deck in the cache, syncing first if it is empty
    ///
    /// # Errors
    ///
    /// `NotFound` naming the lookup key.
    pub async fn deck(&self, reference: DeckRef<'_>) -> Result<Deck, RememberItError> {
        self.ensure_loaded().await?;
        self.cache
            .read()
            .await
            .resolve(&reference)
            .cloned()
            .ok_or_else(|| RememberItError::NotFound(format!("deck '{}'", reference.describe())))
    }

    /// Snapshot of the cache without syncing
    pub async fn cached_decks(&self) -> DeckCollection {
        self.cache.read().await.to_collection()
    }

    /// Whether the cache order list and map agree
    pub async fn cache_is_consistent(&self) -> bool {
        self.cache.read().await.is_consistent()
    }

    /// Create a deck (and missing parents) and return it
    #[tracing::instrument(skip(self))]
    pub async fn create_deck(&self, name: &str) -> Result<Deck, RememberItError> {
        let path = normalize_deck_path(name)?;
        let session = self.require_session().await?;
        self.ensure_loaded().await?;

        let (deck_id, decks) = match self.strategy.create_deck(&session, &self.tracker, &path).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e).await),
        };
        self.replace_cache(decks).await;
        self.cached(DeckRef::Id(deck_id), &path).await
    }

    /// Rename a deck, keeping its id
    #[tracing::instrument(skip(self, reference), fields(deck = %reference.describe()))]
    pub async fn rename_deck(
        &self,
        reference: DeckRef<'_>,
        new_name: &str,
    ) -> Result<Deck, RememberItError> {
        let new_path = normalize_deck_path(new_name)?;
        let session = self.require_session().await?;
        let deck = self.deck(reference).await?;

        let result = self
            .strategy
            .rename_deck(&session, &self.tracker, deck.id, &new_path)
            .await;
        self.finish(result).await?;
        self.cached(DeckRef::Id(deck.id), &new_path).await
    }

    /// Remove a deck with its subdecks and cards
    #[tracing::instrument(skip(self, reference), fields(deck = %reference.describe()))]
    pub async fn remove_deck(&self, reference: DeckRef<'_>) -> Result<(), RememberItError> {
        let session = self.require_session().await?;
        let deck = self.deck(reference).await?;

        let result = self
            .strategy
            .remove_deck(&session, &self.tracker, deck.id)
            .await;
        self.finish(result).await?;
        Ok(())
    }

    /// Add one card and return the refreshed deck
    #[tracing::instrument(skip(self, reference, front, back), fields(deck = %reference.describe()))]
    pub async fn add_card(
        &self,
        reference: DeckRef<'_>,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<Deck, RememberItError> {
        let session = self.require_session().await?;
        let deck = self.deck(reference).await?;

        let card = CardContent { front, back, tags };
        let result = self
            .strategy
            .add_card(&session, &self.tracker, deck.id, card)
            .await;
        self.finish(result).await?;
        self.cached(DeckRef::Id(deck.id), &deck.path).await
    }

    /// Overwrite a card's fields
    ///
    /// `tags` of `None` keeps the current tags where the strategy allows it.
    #[tracing::instrument(skip(self, front, back))]
    pub async fn update_card(
        &self,
        note_id: NoteId,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<(), RememberItError> {
        let session = self.require_session().await?;
        self.ensure_loaded().await?;

        let card = CardContent { front, back, tags };
        let result = self
            .strategy
            .update_card(&session, &self.tracker, note_id, card)
            .await;
        self.finish(result).await?;
        Ok(())
    }

    /// Bring a deck in line with an import document
    ///
    /// The target deck is found by the document's `deck_id`, then by name
    /// (`options.deck_name` overriding the document), and created when it
    /// does not exist and a name is available.
    #[tracing::instrument(skip(self, document, options), fields(deck = %document.name, cards = document.cards.len()))]
    pub async fn upsert_deck(
        &self,
        document: &DeckDocument,
        options: &UpsertOptions,
    ) -> Result<(Deck, UpsertReport), RememberItError> {
        let session = self.require_session().await?;
        self.ensure_loaded().await?;

        let name = options
            .deck_name
            .as_deref()
            .unwrap_or(document.name.as_str())
            .trim()
            .to_string();
        let deck = self.upsert_target(document.deck_id, &name).await?;

        let batch = UpsertBatch {
            deck_id: deck.id,
            cards: &document.cards,
            replace: options.replace,
            note_type_id: options.note_type_id,
        };
        let (report, decks) = match self.strategy.upsert(&session, &self.tracker, batch).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e).await),
        };
        self.replace_cache(decks).await;
        let deck = self.cached(DeckRef::Id(deck.id), &deck.path).await?;
        info!(deck_id = %deck.id, %report, "Upsert complete");
        Ok((deck, report))
    }

    async fn upsert_target(&self, deck_id: Option<DeckId>, name: &str) -> Result<Deck, RememberItError> {
        if let Some(id) = deck_id {
            if let Some(deck) = self.cache.read().await.by_id(id).cloned() {
                return Ok(deck);
            }
        }
        if name.is_empty() {
            return Err(match deck_id {
                Some(id) => RememberItError::NotFound(format!("deck '{id}'")),
                None => RememberItError::InvalidInput(
                    "import document needs a deck name or deck_id".to_string(),
                ),
            });
        }
        let path = normalize_deck_path(name)?;
        let found = self
            .cache
            .read()
            .await
            .resolve(&DeckRef::Key(&path))
            .cloned();
        match found {
            Some(deck) => Ok(deck),
            None => {
                info!(path = %path, "Upsert target missing, creating it");
                self.create_deck(&path).await
            }
        }
    }

    async fn require_session(&self) -> Result<Session, RememberItError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(RememberItError::NotLoggedIn)
    }

    async fn ensure_loaded(&self) -> Result<(), RememberItError> {
        if self.cache.read().await.is_empty() {
            self.sync().await?;
        }
        Ok(())
    }

    /// Deck from the refreshed cache, by id, then by the path it should have
    async fn cached(&self, reference: DeckRef<'_>, path: &str) -> Result<Deck, RememberItError> {
        let cache = self.cache.read().await;
        cache
            .resolve(&reference)
            .or_else(|| cache.resolve(&DeckRef::Key(path)))
            .cloned()
            .ok_or_else(|| RememberItError::NotFound(format!("deck '{path}'")))
    }

    async fn finish(
        &self,
        result: Result<Vec<Deck>, RememberItError>,
    ) -> Result<DeckCollection, RememberItError> {
        match result {
            Ok(decks) => {
                self.replace_cache(decks).await;
                Ok(self.cache.read().await.to_collection())
            }
            Err(e) => Err(self.fail(e).await),
        }
    }

    async fn replace_cache(&self, decks: Vec<Deck>) {
        let fresh = DeckCache::from_decks(decks);
        *self.cache.write().await = fresh;
    }

    async fn fail(&self, error: RememberItError) -> RememberItError {
        warn!(state = %self.tracker.current(), error = %error, "Sync operation failed");
        self.settle().await;
        error
    }

    async fn settle(&self) {
        let has_session = self.session.read().await.is_some();
        let has_cache = !self.cache.read().await.is_empty();
        self.tracker.settle(has_session, has_cache);
    }
}
