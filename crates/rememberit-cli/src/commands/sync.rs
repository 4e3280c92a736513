//! Sync command - Download every deck from AnkiWeb
//!
//! Always fetches from the server; `rememberit decks` reuses what this
//! process already has.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

use super::{deck_json, deck_line, Context};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Include cards in the output
    #[arg(long)]
    pub cards: bool,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        let decks = client.sync().await.context("Sync failed")?;
        info!(decks = decks.len(), "Synced");

        if ctx.format.is_json() {
            let list: Vec<Value> = decks.iter().map(|d| deck_json(d, self.cards)).collect();
            fmt.print_json(&Value::Array(list));
            return Ok(());
        }

        let cards: usize = decks.iter().map(|d| d.cards.len()).sum();
        fmt.success(&format!("Synced {} decks, {} cards", decks.len(), cards));
        for deck in decks.iter() {
            fmt.info(&deck_line(deck));
        }
        Ok(())
    }
}
