//! Decks command - List decks as a Markdown table

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;

use super::{deck_json, Context};

#[derive(Debug, Args)]
pub struct DecksCommand {
    /// Include cards in JSON output
    #[arg(long)]
    pub cards: bool,
}

impl DecksCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;
        let decks = client.decks().await.context("Failed to list decks")?;

        if ctx.format.is_json() {
            let list: Vec<Value> = decks.iter().map(|d| deck_json(d, self.cards)).collect();
            fmt.print_json(&Value::Array(list));
        } else if decks.is_empty() {
            fmt.info("No decks");
        } else {
            fmt.block(&decks.markdown());
        }
        Ok(())
    }
}
