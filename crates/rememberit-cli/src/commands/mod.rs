//! Subcommands
//!
//! Every command opens the client from the settings file (or `--config`),
//! runs one facade operation and prints the result.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use rememberit::{Deck, RememberItClient, Settings, UpsertReport};
use serde_json::{json, Value};

use crate::output::{OutputFormat, OutputFormatter};

pub mod auth;
pub mod card;
pub mod deck;
pub mod decks;
pub mod load;
pub mod sync;

/// Global options shared by every command
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub config: Option<PathBuf>,
}

impl Context {
    pub fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Settings::default_path)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        self.format.formatter()
    }

    pub fn open_client(&self) -> Result<RememberItClient> {
        let path = self.settings_path();
        RememberItClient::open_at(&path)
            .with_context(|| format!("Failed to open settings at {}", path.display()))
    }
}

/// One-line summary of a deck
pub fn deck_line(deck: &Deck) -> String {
    format!(
        "{}  [{}]  {} cards (new {}, learn {}, review {})",
        deck.path,
        deck.id,
        deck.cards.len(),
        deck.counts.new,
        deck.counts.learn,
        deck.counts.review
    )
}

pub fn deck_json(deck: &Deck, with_cards: bool) -> Value {
    let mut value = json!({
        "id": deck.id,
        "name": deck.name,
        "path": deck.path,
        "level": deck.level,
        "counts": deck.counts,
        "card_count": deck.cards.len(),
    });
    if with_cards {
        value["cards"] = json!(deck.cards);
    }
    value
}

pub fn report_json(report: &UpsertReport) -> Value {
    json!({
        "inserted": report.inserted,
        "updated": report.updated,
        "skipped": report.skipped,
        "duplicates": report.duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rememberit::{Card, DeckId, NoteId};

    fn sample_deck() -> Deck {
        let mut deck = Deck::new(DeckId::new(42), "Lang::Spanish");
        deck.cards.push(Card::new(Some(NoteId::new(7)), "hola", "hello"));
        deck.counts.new = 1;
        deck
    }

    #[test]
    fn test_deck_line() {
        assert_eq!(
            deck_line(&sample_deck()),
            "Lang::Spanish  [42]  1 cards (new 1, learn 0, review 0)"
        );
    }

    #[test]
    fn test_deck_json_cards_are_optional() {
        let deck = sample_deck();
        let brief = deck_json(&deck, false);
        assert_eq!(brief["path"], "Lang::Spanish");
        assert_eq!(brief["card_count"], 1);
        assert!(brief.get("cards").is_none());

        let full = deck_json(&deck, true);
        assert_eq!(full["cards"][0]["front"], "hola");
    }

    #[test]
    fn test_settings_path_prefers_flag() {
        let ctx = Context {
            format: OutputFormat::Human,
            config: Some(PathBuf::from("/tmp/rk.json")),
        };
        assert_eq!(ctx.settings_path(), PathBuf::from("/tmp/rk.json"));
    }
}
