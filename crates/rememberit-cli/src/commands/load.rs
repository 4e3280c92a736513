//! Load command - Create or update a deck from a JSON document
//!
//! The document format is
//! `{"name": "...", "cards": [{"front": "...", "back": "...", "tags": "...", "note_id": 1}]}`.
//! Running the same document twice changes nothing the second time.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use rememberit::{NoteTypeId, UpsertOptions};
use serde_json::json;

use super::{deck_json, report_json, Context};

#[derive(Debug, Args)]
pub struct LoadCommand {
    /// JSON document to load
    pub path: PathBuf,

    /// Target deck instead of the document's name
    #[arg(long)]
    pub deck: Option<String>,

    /// Note type for new cards
    #[arg(long)]
    pub note_type: Option<NoteTypeId>,

    /// Rewrite cards matched by note id even when unchanged
    #[arg(long)]
    pub replace: bool,
}

impl LoadCommand {
    pub fn options(&self) -> UpsertOptions {
        UpsertOptions {
            deck_name: self.deck.clone(),
            note_type_id: self.note_type,
            replace: self.replace,
        }
    }

    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        let (deck, report) = client
            .import_deck(&self.path, &self.options())
            .await
            .with_context(|| format!("Failed to load {}", self.path.display()))?;

        if ctx.format.is_json() {
            fmt.print_json(&json!({
                "deck": deck_json(&deck, false),
                "report": report_json(&report),
            }));
        } else {
            fmt.success(&format!("{}: {report}", deck.path));
            fmt.info(&format!("{} cards in deck", deck.cards.len()));
        }
        Ok(())
    }
}
