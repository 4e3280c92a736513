//! Blocking wrapper
//!
//! Each call runs to completion before returning. Where the calling thread
//! is free, the call runs on it; where the caller declares that its thread
//! drives an event loop, the call runs on a worker thread and the caller
//! waits for it. Errors come back as the async client returned them and a
//! panic on the worker is resumed on the caller.

use std::future::Future;
use std::path::{Path, PathBuf};

use rememberit_core::domain::{Deck, DeckCollection, DeckDocument, NoteId, Session};
use rememberit_core::usecases::UpsertReport;
use rememberit_core::RememberItError;
use rememberit_sync::{DeckRef, SyncState, UpsertOptions};
use tokio::runtime::{Builder, Runtime};

use crate::client::RememberItClient;

type Result<T> = std::result::Result<T, RememberItError>;

/// What the calling thread is already doing, as declared by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostEnvironment {
    /// The thread may be blocked directly
    #[default]
    Plain,
    /// The thread drives a cooperative event loop (notebook kernel, async
    /// runtime) that must not be re-entered
    CooperativeLoop,
}

/// [`RememberItClient`] behind a call-and-wait interface
pub struct BlockingClient {
    client: RememberItClient,
    runtime: Runtime,
    host: HostEnvironment,
}

impl BlockingClient {
    /// Wrap `client`
    ///
    /// # Errors
    ///
    /// Fails only if the I/O runtime cannot be created.
    pub fn new(client: RememberItClient, host: HostEnvironment) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            client,
            runtime,
            host,
        })
    }

    pub fn client(&self) -> &RememberItClient {
        &self.client
    }

    pub fn host(&self) -> HostEnvironment {
        self.host
    }

    fn run<T, Fut>(&self, call: Fut) -> T
    where
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        match self.host {
            HostEnvironment::Plain => self.runtime.block_on(call),
            HostEnvironment::CooperativeLoop => std::thread::scope(|scope| {
                let worker = scope.spawn(move || self.runtime.block_on(call));
                match worker.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        self.client.state()
    }

    pub fn login(&self, email: Option<&str>, password: Option<&str>) -> Result<Session> {
        self.run(self.client.login(email, password))
    }

    pub fn logout(&self) -> Result<()> {
        self.run(self.client.logout())
    }

    pub fn get_session_key(&self) -> Option<String> {
        self.run(self.client.get_session_key())
    }

    pub fn reset(&self) -> Result<()> {
        self.run(self.client.reset())
    }

    pub fn sync(&self) -> Result<DeckCollection> {
        self.run(self.client.sync())
    }

    pub fn decks(&self) -> Result<DeckCollection> {
        self.run(self.client.decks())
    }

    pub fn deck(&self, key: &str) -> Result<Deck> {
        self.run(self.client.deck(key))
    }

    pub fn create_deck(&self, name: &str) -> Result<Deck> {
        self.run(self.client.create_deck(name))
    }

    pub fn rename_deck(&self, deck: DeckRef<'_>, new_name: &str) -> Result<Deck> {
        self.run(self.client.rename_deck(deck, new_name))
    }

    pub fn remove_deck(&self, deck: DeckRef<'_>) -> Result<()> {
        self.run(self.client.remove_deck(deck))
    }

    pub fn add_card(
        &self,
        deck: DeckRef<'_>,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<Deck> {
        self.run(self.client.add_card(deck, front, back, tags))
    }

    pub fn update_card(
        &self,
        note_id: NoteId,
        front: &str,
        back: &str,
        tags: Option<&str>,
    ) -> Result<()> {
        self.run(self.client.update_card(note_id, front, back, tags))
    }

    pub fn upsert_deck(
        &self,
        document: &DeckDocument,
        options: &UpsertOptions,
    ) -> Result<(Deck, UpsertReport)> {
        self.run(self.client.upsert_deck(document, options))
    }

    pub fn import_deck(&self, path: &Path, options: &UpsertOptions) -> Result<(Deck, UpsertReport)> {
        self.run(self.client.import_deck(path, options))
    }

    pub fn export_deck(&self, key: &str, path: &Path) -> Result<PathBuf> {
        self.run(self.client.export_deck(key, path))
    }

    pub fn export_apkg(&self, key: &str, path: &Path) -> Result<PathBuf> {
        self.run(self.client.export_apkg(key, path))
    }
}
