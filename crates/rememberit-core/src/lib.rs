//! RememberIt Core - Domain model and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Session`, `Deck`, `Card`, `DeckNode`, the import document
//! - **Error kinds** - `RememberItError` with a phase tag for network failures
//! - **Port definitions** - `ISyncTransport`, `IWebService`, `Clock`
//! - **Use cases** - bulk upsert planning
//! - **Settings** - the persisted JSON settings file
//!
//! Adapter crates implement the ports; the sync crate drives them.

pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;

pub use domain::errors::{Phase, RememberItError, Result};
