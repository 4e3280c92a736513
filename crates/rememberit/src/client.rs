//! Async client
//!
//! [`RememberItClient`] ties the settings file to a [`SyncOrchestrator`]
//! built for the configured strategy. Login and logout rewrite the settings
//! file so the next process starts where this one stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rememberit_ankiweb::web_client::local_minutes_west_of_utc;
use rememberit_ankiweb::{
    AnkiWebSyncTransport, SyncClient, SyncClientConfig, WebServiceClient, WebServiceConfig,
};
use rememberit_collection::package::write_package;
use rememberit_core::config::{Settings, StrategyKind};
use rememberit_core::domain::{Deck, DeckCollection, DeckDocument, NoteId, NoteTypeId, Session};
use rememberit_core::ports::{ISyncTransport, SystemClock};
use rememberit_core::usecases::UpsertReport;
use rememberit_core::RememberItError;
use rememberit_sync::{
    CollectionSwapStrategy, DeckRef, SyncOrchestrator, SyncState, SyncStrategy, UpsertOptions,
    WebServiceStrategy,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, RememberItError>;

/// Client for one AnkiWeb account
pub struct RememberItClient {
    orchestrator: SyncOrchestrator,
    settings: Mutex<Settings>,
    settings_path: PathBuf,
}

impl RememberItClient {
    /// Open the client described by the default settings file
    pub fn open() -> Result<Self> {
        Self::open_at(&Settings::default_path())
    }

    /// Open the client described by the settings file at `path`
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the file does not parse or fails validation.
    pub fn open_at(path: &Path) -> Result<Self> {
        let settings = Settings::load(path)?;
        let problems = settings.validate();
        if !problems.is_empty() {
            let joined = problems
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RememberItError::InvalidInput(format!(
                "{}: {joined}",
                path.display()
            )));
        }
        Self::from_settings(settings, path)
    }

    /// Build the AnkiWeb adapters and strategy named by `settings`
    pub fn from_settings(settings: Settings, settings_path: impl Into<PathBuf>) -> Result<Self> {
        let settings_path = settings_path.into();
        let sync_client = SyncClient::new(SyncClientConfig::from_settings(&settings))?;
        let transport: Arc<dyn ISyncTransport> = Arc::new(AnkiWebSyncTransport::new(sync_client));
        let note_type_id = settings.note_type_id.map(NoteTypeId::new);

        let strategy: Arc<dyn SyncStrategy> = match settings.strategy {
            StrategyKind::CollectionSwap => Arc::new(
                CollectionSwapStrategy::new(Arc::clone(&transport), Arc::new(SystemClock))
                    .with_note_type(note_type_id)
                    .with_local_copy(Settings::collection_path_for(&settings_path)),
            ),
            StrategyKind::WebService => {
                let web = WebServiceClient::new(WebServiceConfig::from_settings(&settings))?;
                Arc::new(
                    WebServiceStrategy::new(Arc::new(web), local_minutes_west_of_utc())
                        .with_note_type(note_type_id),
                )
            }
        };
        debug!(strategy = %settings.strategy, settings = %settings_path.display(), "Client configured");
        Ok(Self::with_parts(settings, settings_path, transport, strategy))
    }

    /// Assemble a client from explicit adapters
    pub fn with_parts(
        settings: Settings,
        settings_path: impl Into<PathBuf>,
        transport: Arc<dyn ISyncTransport>,
        strategy: Arc<dyn SyncStrategy>,
    ) -> Self {
        let orchestrator = SyncOrchestrator::new(transport, strategy).with_session(settings.session());
        Self {
            orchestrator,
            settings: Mutex::new(settings),
            settings_path: settings_path.into(),
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Where the collection swap strategy keeps its local copy
    pub fn collection_path(&self) -> PathBuf {
        Settings::collection_path_for(&self.settings_path)
    }

    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.orchestrator.strategy_kind()
    }

    pub fn state(&self) -> SyncState {
        self.orchestrator.state()
    }

    /// Log in and persist the session key
    ///
    /// Missing arguments fall back to the credentials in the settings file.
    pub async fn login(&self, email: Option<&str>, password: Option<&str>) -> Result<Session> {
        let (email, password) = {
            let settings = self.settings.lock().await;
            (
                email.map_or_else(|| settings.email.clone(), str::to_string),
                password.map_or_else(|| settings.password.clone(), str::to_string),
            )
        };
        if email.trim().is_empty() || password.is_empty() {
            return Err(RememberItError::InvalidInput(
                "email and password are required; pass them or set them in the settings file"
                    .to_string(),
            ));
        }

        let session = self.orchestrator.login(email.trim(), &password).await?;
        let mut settings = self.settings.lock().await;
        settings.store_session(&session);
        settings.save(&self.settings_path)?;
        info!(settings = %self.settings_path.display(), "Session saved");
        Ok(session)
    }

    /// Forget the session here and in the settings file
    pub async fn logout(&self) -> Result<()> {
        self.orchestrator.logout().await;
        let mut settings = self.settings.lock().await;
        settings.clear_session();
        settings.save(&self.settings_path)
    }

    pub async fn get_session_key(&self) -> Option<String> {
        self.orchestrator.session_key().await
    }

    /// Log out and delete the settings file and the local collection copy
    pub async fn reset(&self) -> Result<()> {
        self.orchestrator.reset().await;
        *self.settings.lock().await = Settings::default();
        for path in [self.settings_path.clone(), self.collection_path()] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RememberItError::Store {
                        path,
                        message: e.to_string(),
                    })
                }
            }
        }
        info!("Local state reset");
        Ok(())
    }

    /// Fetch every deck from the server, replacing the cache
    pub async fn sync(&self) -> Result<DeckCollection> {
        self.orchestrator.sync().await
    }

    /// Cached decks, syncing only when nothing is cached yet
    pub async fn decks(&self) -> Result<DeckCollection> {
        self.orchestrator.decks().await
    }

    /// One deck by path, name or id
    pub async fn deck(&self, key: &str) -> Result<Deck> {
        self.orchestrator
            .deck(DeckRef::Key(key))
            .await
            .map_err(|e| e.with_lookup_key(key))
    }

    pub async fn create_deck(&self, name: &str) -> Result<Deck> {
        self.orchestrator.create_deck(name).await
    }

    pub async fn rename_deck(&self, deck: DeckRef<'_>, new_name: &str) -> Result<Deck> {
        let key = deck.describe();
        self.orchestrator
            .rename_deck(deck, new_name)
            .await
            .map_err(|e| e.with_lookup_key(&key))
    }

    pub async fn remove_deck(&self, deck: DeckRef<'_>) -> Result<()> {
        let key = deck.describe();
        self.orchestrator
            .remove_deck(deck)
            .await
            .map_err(|e| e.with_lookup_key(&key))
    }

    /// Add a card and return the deck as the server now has it
    pub async fn add_card(
        &self,
        deck: DeckRef<'_>,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<Deck> {
        let key = deck.describe();
        self.orchestrator
            .add_card(deck, front, back, tags)
            .await
            .map_err(|e| e.with_lookup_key(&key))
    }

    pub async fn update_card(
        &self,
        note_id: NoteId,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<()> {
        self.orchestrator
            .update_card(note_id, front, back, tags)
            .await
            .map_err(|e| e.with_lookup_key(&note_id.to_string()))
    }

    pub async fn upsert_deck(
        &self,
        document: &DeckDocument,
        options: &UpsertOptions,
    ) -> Result<(Deck, UpsertReport)> {
        self.orchestrator.upsert_deck(document, options).await
    }

    /// Upsert the deck described by a JSON import file
    pub async fn import_deck(
        &self,
        path: &Path,
        options: &UpsertOptions,
    ) -> Result<(Deck, UpsertReport)> {
        let document = DeckDocument::load(path)?;
        info!(path = %path.display(), cards = document.cards.len(), "Importing deck");
        self.upsert_deck(&document, options).await
    }

    /// Write a deck in the import format so it can be edited and loaded back
    pub async fn export_deck(&self, key: &str, path: &Path) -> Result<PathBuf> {
        let deck = self.deck(key).await?;
        let written = deck.to_document().save_json(path)?;
        info!(deck = %deck.path, path = %written.display(), "Exported deck");
        Ok(written)
    }

    /// Write a deck as an `.apkg` package for the desktop importer
    ///
    /// A directory `path` receives `<deck name>.apkg`. Scheduling state is
    /// not carried over; every card arrives new.
    pub async fn export_apkg(&self, key: &str, path: &Path) -> Result<PathBuf> {
        let deck = self.deck(key).await?;
        let target = if path.is_dir() {
            path.join(format!("{}.apkg", deck.to_document().file_stem()))
        } else {
            path.to_path_buf()
        };
        write_package(&deck, Arc::new(SystemClock), &target).await?;
        Ok(target)
    }

    /// Snapshot of the deck cache without touching the network
    pub async fn cached_decks(&self) -> DeckCollection {
        self.orchestrator.cached_decks().await
    }
}
