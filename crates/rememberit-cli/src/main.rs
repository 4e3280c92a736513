//! RememberIt CLI - Manage Anki decks and cards through AnkiWeb
//!
//! Provides commands for:
//! - Logging in and out of AnkiWeb
//! - Listing and syncing decks
//! - Creating, renaming, removing and exporting decks (JSON or `.apkg`)
//! - Adding and updating cards
//! - Loading decks from JSON documents

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, card::CardCommand, deck::DeckCommand, decks::DecksCommand,
    load::LoadCommand, sync::SyncCommand, Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "rememberit", version, about = "Manage Anki flashcards through AnkiWeb")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Session commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Download every deck from AnkiWeb
    Sync(SyncCommand),
    /// List decks
    Decks(DecksCommand),
    /// Manage a single deck
    #[command(subcommand)]
    Deck(DeckCommand),
    /// Add or update cards
    #[command(subcommand)]
    Card(CardCommand),
    /// Create or update a deck from a JSON document
    Load(LoadCommand),
}

/// Log level for `-v` repetitions when `RUST_LOG` is unset
fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        config: cli.config,
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Sync(cmd) => cmd.execute(&ctx).await,
        Commands::Decks(cmd) => cmd.execute(&ctx).await,
        Commands::Deck(cmd) => cmd.execute(&ctx).await,
        Commands::Card(cmd) => cmd.execute(&ctx).await,
        Commands::Load(cmd) => cmd.execute(&ctx).await,
    }
}
