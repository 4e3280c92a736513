//! Deck commands - Create, Rename, Remove, Show and Export
//!
//! Decks are named by path (`Lang::Spanish`), by leaf name or by id.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Subcommand, ValueEnum};
use rememberit::DeckRef;

use super::{deck_json, deck_line, Context};

#[derive(Debug, Subcommand)]
pub enum DeckCommand {
    /// Create a deck, with any missing parents
    Create {
        /// Deck path, e.g. "Lang::Spanish"
        name: String,
    },
    /// Rename a deck; its id is kept
    Rename {
        /// Current path, name or id
        deck: String,
        /// New path
        new_name: String,
    },
    /// Remove a deck with its subdecks and cards
    Remove {
        /// Path, name or id
        deck: String,
    },
    /// Show a deck and its cards
    Show {
        /// Path, name or id
        deck: String,
    },
    /// Write a deck as a JSON document that `rememberit load` accepts, or
    /// as an `.apkg` package for the desktop importer
    Export {
        /// Path, name or id
        deck: String,
        /// Output file; a directory gets `<deck name>.json` or `.apkg`
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
}

/// File format for `deck export`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Apkg,
}

impl DeckCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        match self {
            DeckCommand::Create { name } => {
                let deck = client
                    .create_deck(name)
                    .await
                    .with_context(|| format!("Failed to create deck '{name}'"))?;
                if ctx.format.is_json() {
                    fmt.print_json(&deck_json(&deck, false));
                } else {
                    fmt.success(&format!("Deck ready: {}", deck_line(&deck)));
                }
            }
            DeckCommand::Rename { deck, new_name } => {
                let renamed = client
                    .rename_deck(DeckRef::Key(deck), new_name)
                    .await
                    .with_context(|| format!("Failed to rename deck '{deck}'"))?;
                if ctx.format.is_json() {
                    fmt.print_json(&deck_json(&renamed, false));
                } else {
                    fmt.success(&format!("Renamed '{deck}' to '{}'", renamed.path));
                }
            }
            DeckCommand::Remove { deck } => {
                client
                    .remove_deck(DeckRef::Key(deck))
                    .await
                    .with_context(|| format!("Failed to remove deck '{deck}'"))?;
                fmt.success(&format!("Removed deck '{deck}'"));
            }
            DeckCommand::Show { deck } => {
                let found = client.deck(deck).await?;
                if ctx.format.is_json() {
                    fmt.print_json(&deck_json(&found, true));
                } else {
                    fmt.success(&deck_line(&found));
                    for card in &found.cards {
                        let id = card.id.map(|id| id.to_string()).unwrap_or_default();
                        fmt.info(&format!("[{id}] {} -> {}", card.front, card.back));
                    }
                }
            }
            DeckCommand::Export {
                deck,
                output,
                format,
            } => {
                let written = match format {
                    ExportFormat::Json => client.export_deck(deck, output).await,
                    ExportFormat::Apkg => client.export_apkg(deck, output).await,
                }
                .with_context(|| format!("Failed to export deck '{deck}'"))?;
                fmt.success(&format!("Exported '{deck}' to {}", written.display()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(subcommand)]
        command: DeckCommand,
    }

    #[test]
    fn test_export_format_defaults_to_json() {
        let parsed = Harness::parse_from(["deck", "export", "Spanish"]);
        match parsed.command {
            DeckCommand::Export { format, output, .. } => {
                assert_eq!(format, ExportFormat::Json);
                assert_eq!(output, PathBuf::from("."));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_export_format_apkg() {
        let parsed = Harness::parse_from(["deck", "export", "Spanish", "--format", "apkg", "-o", "out"]);
        assert!(matches!(
            parsed.command,
            DeckCommand::Export {
                format: ExportFormat::Apkg,
                ..
            }
        ));
    }
}
