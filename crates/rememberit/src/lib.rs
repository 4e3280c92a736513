//! RememberIt - Anki decks and cards through AnkiWeb
//!
//! Provides:
//! - [`RememberItClient`], the async client over a persisted settings file
//! - [`BlockingClient`], a call-and-wait wrapper for synchronous hosts
//!
//! ## Example
//!
//! ```no_run
//! use rememberit::{DeckRef, RememberItClient};
//!
//! # async fn demo() -> Result<(), rememberit::RememberItError> {
//! let client = RememberItClient::open()?;
//! client.login(Some("me@example.com"), Some("secret")).await?;
//! let deck = client.create_deck("Spanish::Verbs").await?;
//! client.add_card(DeckRef::Id(deck.id), "comer", "to eat", None).await?;
//! for deck in client.decks().await?.iter() {
//!     println!("{} ({} cards)", deck.path, deck.cards.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod client;

pub use blocking::{BlockingClient, HostEnvironment};
pub use client::RememberItClient;

pub use rememberit_core::config::{Settings, StrategyKind};
pub use rememberit_core::domain::{
    Card, CardDocument, Deck, DeckCollection, DeckDocument, DeckId, NoteId, NoteTypeId, Session,
};
pub use rememberit_core::usecases::UpsertReport;
pub use rememberit_core::{Phase, RememberItError};
pub use rememberit_sync::{DeckRef, SyncState, UpsertOptions};
