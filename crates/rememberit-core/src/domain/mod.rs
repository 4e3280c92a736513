//! Domain entities
//!
//! - Newtypes for deck, note, card and note type identifiers
//! - Decks, cards and the server's deck tree
//! - The deck import/export document
//! - The authenticated session
//! - Error kinds shared by every crate

pub mod deck;
pub mod document;
pub mod errors;
pub mod newtypes;
pub mod session;

// Re-export commonly used types
pub use deck::{
    leaf_name, normalize_deck_path, split_front_back, Card, Deck, DeckCollection, DeckCounts,
    DeckNode, PATH_SEPARATOR,
};
pub use document::{CardDocument, DeckDocument};
pub use errors::{DomainError, Phase, RememberItError, Result};
pub use newtypes::*;
pub use session::{normalize_endpoint, Session};
