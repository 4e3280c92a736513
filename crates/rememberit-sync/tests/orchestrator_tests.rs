//! Orchestrator tests over the collection swap strategy
//!
//! The remote side is an in-memory transport holding a collection file
//! built with the collection fixture builder. It counts every call so tests
//! can assert which network steps happened.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rememberit_collection::testing::CollectionBuilder;
use rememberit_collection::{CollectionStore, SchemaGeneration};
use rememberit_core::domain::{CardDocument, DeckDocument, DeckId, NoteId, Session};
use rememberit_core::ports::{FixedClock, ISyncTransport};
use rememberit_core::{Phase, RememberItError};
use rememberit_sync::{CollectionSwapStrategy, DeckRef, SyncOrchestrator, SyncState, UpsertOptions};

// ============================================================================
// Test helpers
// ============================================================================

const NOW_MS: i64 = 1_800_000_000_000;

#[derive(Default)]
struct FakeRemote {
    collection: Mutex<Vec<u8>>,
    logins: AtomicUsize,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    reject_login: AtomicBool,
    fail_upload: AtomicBool,
}

impl FakeRemote {
    async fn with(builder: CollectionBuilder) -> Arc<Self> {
        let bytes = builder.build().await.expect("Failed to build collection");
        Arc::new(Self {
            collection: Mutex::new(bytes),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
            + self.downloads.load(Ordering::SeqCst)
            + self.uploads.load(Ordering::SeqCst)
    }

    fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Open the remote collection for inspection
    async fn store(&self) -> CollectionStore {
        let bytes = self.collection.lock().unwrap().clone();
        CollectionStore::open(&bytes, Arc::new(FixedClock::new(NOW_MS)))
            .await
            .unwrap()
    }
}

#[async_trait]
impl ISyncTransport for FakeRemote {
    async fn login(&self, username: &str, password: &str) -> Result<Session, RememberItError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if self.reject_login.load(Ordering::SeqCst) || password != "secret" {
            return Err(RememberItError::Authentication("bad credentials".into()));
        }
        Ok(Session::new(
            "hk-test",
            "https://sync.example.net/",
            Some(username.to_string()),
        ))
    }

    async fn download_collection(&self, _session: &Session) -> Result<Vec<u8>, RememberItError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.collection.lock().unwrap().clone())
    }

    async fn upload_collection(
        &self,
        _session: &Session,
        collection: Vec<u8>,
    ) -> Result<(), RememberItError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(RememberItError::Transport {
                phase: Phase::Upload,
                message: "connection reset".into(),
            });
        }
        *self.collection.lock().unwrap() = collection;
        Ok(())
    }
}

fn orchestrator(remote: &Arc<FakeRemote>) -> SyncOrchestrator {
    let transport: Arc<dyn ISyncTransport> = remote.clone();
    let strategy = CollectionSwapStrategy::new(transport.clone(), Arc::new(FixedClock::new(NOW_MS)));
    SyncOrchestrator::new(transport, Arc::new(strategy))
}

async fn logged_in(remote: &Arc<FakeRemote>) -> SyncOrchestrator {
    let orchestrator = orchestrator(remote);
    orchestrator.login("me@example.com", "secret").await.unwrap();
    orchestrator
}

fn document(name: &str, cards: &[(&str, &str)]) -> DeckDocument {
    DeckDocument {
        name: name.to_string(),
        deck_id: None,
        cards: cards
            .iter()
            .map(|(front, back)| CardDocument::new(*front, *back))
            .collect(),
    }
}

async fn note_count(remote: &FakeRemote) -> usize {
    remote
        .store()
        .await
        .list_cards()
        .await
        .unwrap()
        .values()
        .map(Vec::len)
        .sum()
}

// ============================================================================
// Session handling
// ============================================================================

#[tokio::test]
async fn test_sync_without_session_makes_no_network_call() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = orchestrator(&remote);

    let err = orchestrator.sync().await.unwrap_err();
    assert!(matches!(err, RememberItError::NotLoggedIn));
    let err = orchestrator.create_deck("Spanish").await.unwrap_err();
    assert!(matches!(err, RememberItError::NotLoggedIn));
    assert_eq!(remote.calls(), 0);
    assert_eq!(orchestrator.state(), SyncState::LoggedOut);
}

#[tokio::test]
async fn test_login_stores_session() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = orchestrator(&remote);

    let session = orchestrator.login("me@example.com", "secret").await.unwrap();
    assert_eq!(session.hkey, "hk-test");
    assert_eq!(orchestrator.session_key().await.as_deref(), Some("hk-test"));
    assert_eq!(orchestrator.state(), SyncState::Authenticated);
}

#[tokio::test]
async fn test_failed_login_keeps_logged_out() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = orchestrator(&remote);

    let err = orchestrator.login("me@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, RememberItError::Authentication(_)));
    assert!(orchestrator.session().await.is_none());
    assert_eq!(orchestrator.state(), SyncState::LoggedOut);
}

#[tokio::test]
async fn test_empty_credentials_rejected_locally() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = orchestrator(&remote);
    let err = orchestrator.login("", "secret").await.unwrap_err();
    assert!(matches!(err, RememberItError::InvalidInput(_)));
    assert_eq!(remote.calls(), 0);
}

#[tokio::test]
async fn test_logout_clears_session_and_cache() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;
    orchestrator.sync().await.unwrap();
    assert!(!orchestrator.cached_decks().await.is_empty());

    orchestrator.logout().await;
    assert!(orchestrator.session().await.is_none());
    assert!(orchestrator.cached_decks().await.is_empty());
    assert_eq!(orchestrator.state(), SyncState::LoggedOut);
    assert!(matches!(orchestrator.decks().await, Err(RememberItError::NotLoggedIn)));
}

#[tokio::test]
async fn test_restored_session_is_used() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let session = Session::new("hk-saved", "https://sync.example.net/", None);
    let orchestrator = orchestrator(&remote).with_session(Some(session));

    assert_eq!(orchestrator.state(), SyncState::Authenticated);
    orchestrator.sync().await.unwrap();
    assert_eq!(remote.logins.load(Ordering::SeqCst), 0);
    assert_eq!(remote.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_restore_session_after_sync_reauthenticates() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;
    orchestrator.sync().await.unwrap();
    assert_eq!(orchestrator.state(), SyncState::CollectionLoaded);

    orchestrator
        .restore_session(Session::new("hk-other", "https://sync.example.net/", None))
        .await;
    assert_eq!(orchestrator.state(), SyncState::Authenticated);
    assert_eq!(orchestrator.session_key().await.as_deref(), Some("hk-other"));
    assert!(orchestrator.cached_decks().await.is_empty());
}

// ============================================================================
// Reads and the cache
// ============================================================================

#[tokio::test]
async fn test_sync_lists_decks_with_cards() {
    for generation in [SchemaGeneration::Legacy, SchemaGeneration::Tables] {
        let remote = FakeRemote::with(
            CollectionBuilder::new(generation)
                .deck(10, "Spanish")
                .deck(11, "Spanish::Verbs")
                .note(100, 10, "hola", "hello")
                .note(200, 11, "comer", "to eat"),
        )
        .await;
        let orchestrator = logged_in(&remote).await;

        let decks = orchestrator.sync().await.unwrap();
        let paths: Vec<&str> = decks.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["Spanish", "Spanish::Verbs"]);
        let spanish = decks.get("Spanish").unwrap();
        assert_eq!(spanish.cards.len(), 1);
        assert_eq!(spanish.cards[0].front, "hola");
        assert_eq!(spanish.counts.total_including_children, 2);
        assert_eq!(orchestrator.state(), SyncState::CollectionLoaded);
        assert!(orchestrator.cache_is_consistent().await);
    }
}

#[tokio::test]
async fn test_decks_uses_cache_once_populated() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    orchestrator.decks().await.unwrap();
    orchestrator.decks().await.unwrap();
    orchestrator.deck(DeckRef::Key("Spanish")).await.unwrap();
    assert_eq!(remote.downloads.load(Ordering::SeqCst), 1);

    orchestrator.sync().await.unwrap();
    assert_eq!(remote.downloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_deck_is_not_found_with_key() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    match orchestrator.deck(DeckRef::Key("French")).await {
        Err(RememberItError::NotFound(message)) => assert!(message.contains("French")),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_download_failure_keeps_previous_cache() {
    struct FailingDownload(Arc<FakeRemote>, AtomicBool);

    #[async_trait]
    impl ISyncTransport for FailingDownload {
        async fn login(&self, u: &str, p: &str) -> Result<Session, RememberItError> {
            self.0.login(u, p).await
        }
        async fn download_collection(&self, s: &Session) -> Result<Vec<u8>, RememberItError> {
            if self.1.load(Ordering::SeqCst) {
                return Err(RememberItError::Transport {
                    phase: Phase::Download,
                    message: "timed out".into(),
                });
            }
            self.0.download_collection(s).await
        }
        async fn upload_collection(&self, s: &Session, c: Vec<u8>) -> Result<(), RememberItError> {
            self.0.upload_collection(s, c).await
        }
    }

    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let transport = Arc::new(FailingDownload(remote.clone(), AtomicBool::new(false)));
    let strategy = CollectionSwapStrategy::new(transport.clone(), Arc::new(FixedClock::new(NOW_MS)));
    let orchestrator = SyncOrchestrator::new(transport.clone(), Arc::new(strategy));
    orchestrator.login("me@example.com", "secret").await.unwrap();
    orchestrator.sync().await.unwrap();

    transport.1.store(true, Ordering::SeqCst);
    let err = orchestrator.sync().await.unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Download));
    assert_eq!(orchestrator.cached_decks().await.len(), 1);
    assert_eq!(orchestrator.state(), SyncState::CollectionLoaded);
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn test_create_deck_then_add_card() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = logged_in(&remote).await;

    let deck = orchestrator.create_deck("Spanish").await.unwrap();
    assert_eq!(deck.path, "Spanish");
    let deck = orchestrator
        .add_card(DeckRef::Id(deck.id), "hello", "hola", None)
        .await
        .unwrap();
    assert_eq!(deck.cards.len(), 1);

    let decks = orchestrator.sync().await.unwrap();
    let named: Vec<_> = decks.iter().filter(|d| d.name == "Spanish").collect();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].cards.len(), 1);
    assert_eq!(named[0].cards[0].front, "hello");
    assert_eq!(named[0].cards[0].back, "hola");
    assert_eq!(remote.uploads(), 2);
}

#[tokio::test]
async fn test_create_existing_deck_does_not_upload() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    let deck = orchestrator.create_deck("spanish").await.unwrap();
    assert_eq!(deck.id, DeckId::new(10));
    assert_eq!(remote.uploads(), 0);
}

#[tokio::test]
async fn test_rename_then_lookup() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Old")).await;
    let orchestrator = logged_in(&remote).await;

    let before = orchestrator.deck(DeckRef::Key("Old")).await.unwrap();
    let renamed = orchestrator.rename_deck(DeckRef::Key("Old"), "New").await.unwrap();
    assert_eq!(renamed.id, before.id);

    let after = orchestrator.deck(DeckRef::Key("New")).await.unwrap();
    assert_eq!(after.id, before.id);
    assert!(matches!(
        orchestrator.deck(DeckRef::Key("Old")).await,
        Err(RememberItError::NotFound(_))
    ));
    assert!(orchestrator.cache_is_consistent().await);
}

#[tokio::test]
async fn test_rename_by_deck_value_and_by_id() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Legacy).deck(10, "Old")).await;
    let orchestrator = logged_in(&remote).await;

    let deck = orchestrator.deck(DeckRef::Key("Old")).await.unwrap();
    let renamed = orchestrator.rename_deck(DeckRef::Deck(&deck), "Middle").await.unwrap();
    assert_eq!(renamed.path, "Middle");
    let renamed = orchestrator.rename_deck(DeckRef::Key("10"), "Last").await.unwrap();
    assert_eq!(renamed.path, "Last");
    assert_eq!(renamed.id, DeckId::new(10));
}

#[tokio::test]
async fn test_remove_deck() {
    let remote = FakeRemote::with(
        CollectionBuilder::new(SchemaGeneration::Tables)
            .deck(10, "Spanish")
            .deck(20, "French")
            .note(100, 10, "hola", "hello"),
    )
    .await;
    let orchestrator = logged_in(&remote).await;

    orchestrator.remove_deck(DeckRef::Key("Spanish")).await.unwrap();
    let decks = orchestrator.decks().await.unwrap();
    assert!(decks.get("Spanish").is_none());
    assert!(decks.get("French").is_some());
    assert_eq!(note_count(&remote).await, 0);
    assert!(orchestrator.cache_is_consistent().await);
}

#[tokio::test]
async fn test_update_card() {
    let remote = FakeRemote::with(
        CollectionBuilder::new(SchemaGeneration::Tables)
            .deck(10, "Spanish")
            .note(100, 10, "hola", "hello")
            .tagged("greeting"),
    )
    .await;
    let orchestrator = logged_in(&remote).await;

    orchestrator
        .update_card(NoteId::new(100), "hola", "hi", None)
        .await
        .unwrap();
    let deck = orchestrator.deck(DeckRef::Key("Spanish")).await.unwrap();
    assert_eq!(deck.cards[0].back, "hi");
    assert_eq!(deck.cards[0].tags, "greeting");
}

#[tokio::test]
async fn test_update_missing_note_is_not_found() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    let err = orchestrator
        .update_card(NoteId::new(999), "a", "b", None)
        .await
        .unwrap_err();
    assert!(matches!(err, RememberItError::NotFound(_)));
    assert_eq!(remote.uploads(), 0);
    assert_eq!(orchestrator.state(), SyncState::CollectionLoaded);
}

#[tokio::test]
async fn test_upload_failure_leaves_remote_and_cache_untouched() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;
    orchestrator.sync().await.unwrap();
    remote.fail_upload.store(true, Ordering::SeqCst);

    let err = orchestrator
        .add_card(DeckRef::Key("Spanish"), "hola", "hello", None)
        .await
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Upload));
    assert_eq!(note_count(&remote).await, 0);
    let cached = orchestrator.cached_decks().await;
    assert!(cached.get("Spanish").unwrap().cards.is_empty());
    assert_eq!(orchestrator.state(), SyncState::CollectionLoaded);
}

// ============================================================================
// Bulk upsert
// ============================================================================

#[tokio::test]
async fn test_upsert_update_by_front() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables)).await;
    let orchestrator = logged_in(&remote).await;
    let options = UpsertOptions::default();

    let (_, report) = orchestrator
        .upsert_deck(&document("D", &[("Q", "A1")]), &options)
        .await
        .unwrap();
    assert_eq!(report.inserted, 1);

    let (deck, report) = orchestrator
        .upsert_deck(&document("D", &[("Q", "A2")]), &options)
        .await
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(deck.cards.len(), 1);
    assert_eq!(deck.cards[0].front, "Q");
    assert_eq!(deck.cards[0].back, "A2");
}

#[tokio::test]
async fn test_upsert_twice_is_idempotent() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Legacy).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;
    let doc = document("Spanish", &[("hola", "hello"), ("adios", "goodbye")]);

    orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    let uploads = remote.uploads();
    let count = note_count(&remote).await;

    let (deck, report) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(report.skipped, 2);
    assert!(report.is_noop());
    assert_eq!(remote.uploads(), uploads);
    assert_eq!(note_count(&remote).await, count);
    assert_eq!(deck.cards.len(), 2);
}

#[tokio::test]
async fn test_upsert_dedups_within_batch() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;
    let doc = document("Spanish", &[("hola", "hello"), ("hola", "hello")]);

    let (deck, report) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(deck.cards.len(), 1);
}

#[tokio::test]
async fn test_upsert_by_note_id_and_replace() {
    let remote = FakeRemote::with(
        CollectionBuilder::new(SchemaGeneration::Tables)
            .deck(10, "Spanish")
            .note(100, 10, "hola", "hello"),
    )
    .await;
    let orchestrator = logged_in(&remote).await;

    let mut doc = document("Spanish", &[("buenas", "hi")]);
    doc.cards[0].note_id = Some(NoteId::new(100));
    let (deck, report) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(deck.cards.len(), 1);
    assert_eq!(deck.cards[0].front, "buenas");

    let (_, report) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(report.skipped, 1);

    let forced = UpsertOptions {
        replace: true,
        ..UpsertOptions::default()
    };
    let uploads = remote.uploads();
    let (_, report) = orchestrator.upsert_deck(&doc, &forced).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(remote.uploads(), uploads + 1);
}

#[tokio::test]
async fn test_upsert_targets_deck_id_then_name_override() {
    let remote = FakeRemote::with(
        CollectionBuilder::new(SchemaGeneration::Tables)
            .deck(10, "Spanish")
            .deck(20, "French"),
    )
    .await;
    let orchestrator = logged_in(&remote).await;

    let mut doc = document("ignored", &[("bonjour", "hello")]);
    doc.deck_id = Some(DeckId::new(20));
    let (deck, _) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(deck.path, "French");

    let doc = document("French", &[("hola", "hello")]);
    let options = UpsertOptions {
        deck_name: Some("Spanish".into()),
        ..UpsertOptions::default()
    };
    let (deck, _) = orchestrator.upsert_deck(&doc, &options).await.unwrap();
    assert_eq!(deck.id, DeckId::new(10));
}

#[tokio::test]
async fn test_upsert_creates_missing_deck() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    let doc = document("Lang::German", &[("hallo", "hello")]);
    let (deck, report) = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap();
    assert_eq!(deck.path, "Lang::German");
    assert_eq!(report.inserted, 1);
    let decks = orchestrator.decks().await.unwrap();
    assert!(decks.get("Lang").is_some());
    assert!(orchestrator.cache_is_consistent().await);
}

#[tokio::test]
async fn test_upsert_without_name_or_id_rejected() {
    let remote = FakeRemote::with(CollectionBuilder::new(SchemaGeneration::Tables).deck(10, "Spanish")).await;
    let orchestrator = logged_in(&remote).await;

    let doc = document("  ", &[("a", "b")]);
    let err = orchestrator.upsert_deck(&doc, &UpsertOptions::default()).await.unwrap_err();
    assert!(matches!(err, RememberItError::InvalidInput(_)));
}
