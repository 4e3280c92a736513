//! Card commands - Add and Update
//!
//! Front and back are stored verbatim; HTML is passed through untouched.

use anyhow::{Context as _, Result};
use clap::Subcommand;
use rememberit::{DeckRef, NoteId};
use serde_json::json;

use super::{deck_json, Context};

#[derive(Debug, Subcommand)]
pub enum CardCommand {
    /// Add a card to a deck
    Add {
        /// Deck path, name or id
        deck: String,
        front: String,
        back: String,
        /// Space-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Overwrite the fields of an existing card
    Update {
        /// Note id as shown by `rememberit deck show`
        note_id: NoteId,
        front: String,
        back: String,
        /// Replacement tags; current tags are kept when omitted
        #[arg(long)]
        tags: Option<String>,
    },
}

impl CardCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        match self {
            CardCommand::Add {
                deck,
                front,
                back,
                tags,
            } => {
                let updated = client
                    .add_card(DeckRef::Key(deck), front, back, tags.as_deref())
                    .await
                    .with_context(|| format!("Failed to add card to '{deck}'"))?;
                if ctx.format.is_json() {
                    fmt.print_json(&deck_json(&updated, true));
                } else {
                    fmt.success(&format!(
                        "Added card to '{}' ({} cards)",
                        updated.path,
                        updated.cards.len()
                    ));
                }
            }
            CardCommand::Update {
                note_id,
                front,
                back,
                tags,
            } => {
                client
                    .update_card(*note_id, front, back, tags.as_deref())
                    .await
                    .with_context(|| format!("Failed to update note {note_id}"))?;
                if ctx.format.is_json() {
                    fmt.print_json(&json!({ "updated": note_id }));
                } else {
                    fmt.success(&format!("Updated note {note_id}"));
                }
            }
        }
        Ok(())
    }
}
