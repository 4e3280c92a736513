//! RememberIt Sync - Sync orchestration
//!
//! Provides:
//! - The login / download / mutate / upload state machine
//! - An ordered deck cache with key lookup
//! - Interchangeable sync strategies selected at construction time
//!
//! ## Modules
//!
//! - [`orchestrator`] - Session, cache and operation entry points
//! - [`strategy`] - The strategy trait
//! - [`collection_swap`] - Full download, SQLite mutation, full upload
//! - [`web_service`] - Legacy cookie-authenticated web endpoints
//! - [`cache`] - Deck cache
//! - [`state`] - State machine

pub mod cache;
pub mod collection_swap;
pub mod orchestrator;
pub mod state;
pub mod strategy;
pub mod web_service;

pub use cache::{DeckCache, DeckRef};
pub use collection_swap::{CollectionSwapStrategy, Outcome};
pub use orchestrator::{SyncOrchestrator, UpsertOptions};
pub use state::{StateTracker, SyncState};
pub use strategy::{CardContent, SyncStrategy, UpsertBatch};
pub use web_service::WebServiceStrategy;
