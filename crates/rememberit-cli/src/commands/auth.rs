//! Auth commands - Login, Logout, Status and Reset
//!
//! Provides the `rememberit auth` subcommands:
//! 1. `login`  - Exchanges email and password for a session key and saves it
//!    to the settings file. Missing flags fall back to the stored credentials.
//! 2. `logout` - Forgets the session key; credentials stay in the file.
//! 3. `status` - Shows the account, endpoint and strategy without any request.
//! 4. `reset`  - Deletes the settings file and the local collection copy.

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use serde_json::json;
use tracing::info;

use super::Context;

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Log in to AnkiWeb and store the session key
    Login {
        /// AnkiWeb account email
        #[arg(long)]
        email: Option<String>,
        /// AnkiWeb password
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session key
    Logout,
    /// Show the stored session
    Status,
    /// Delete all local state
    Reset {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            AuthCommand::Login { email, password } => {
                Self::execute_login(ctx, email.as_deref(), password.as_deref()).await
            }
            AuthCommand::Logout => Self::execute_logout(ctx).await,
            AuthCommand::Status => Self::execute_status(ctx).await,
            AuthCommand::Reset { yes } => Self::execute_reset(ctx, *yes).await,
        }
    }

    async fn execute_login(ctx: &Context, email: Option<&str>, password: Option<&str>) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        let session = client.login(email, password).await.context("Login failed")?;
        info!(endpoint = %session.endpoint, "Logged in");

        if ctx.format.is_json() {
            fmt.print_json(&json!({
                "logged_in": true,
                "username": session.username,
                "endpoint": session.endpoint,
            }));
        } else {
            fmt.success(&format!(
                "Logged in as {}",
                session.username.as_deref().unwrap_or("(unknown)")
            ));
            fmt.info(&format!("Session saved to {}", client.settings_path().display()));
        }
        Ok(())
    }

    async fn execute_logout(ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;

        if client.get_session_key().await.is_none() {
            fmt.info("Not logged in. Nothing to log out.");
            return Ok(());
        }
        client.logout().await.context("Failed to update settings")?;
        fmt.success("Logged out");
        Ok(())
    }

    async fn execute_status(ctx: &Context) -> Result<()> {
        let fmt = ctx.formatter();
        let client = ctx.open_client()?;
        let settings = client.settings().await;
        let logged_in = client.get_session_key().await.is_some();
        let collection = client.collection_path();

        if ctx.format.is_json() {
            fmt.print_json(&json!({
                "logged_in": logged_in,
                "email": settings.email,
                "endpoint": settings.endpoint(),
                "strategy": settings.strategy.to_string(),
                "settings_path": client.settings_path(),
                "local_collection": collection.exists().then_some(&collection),
            }));
            return Ok(());
        }

        if logged_in {
            fmt.success(&format!("Logged in as {}", display_or_unset(&settings.email)));
        } else {
            fmt.info("Not logged in");
            fmt.info("Run 'rememberit auth login --email <EMAIL> --password <PASSWORD>'");
        }
        fmt.info(&format!("Endpoint:   {}", settings.endpoint()));
        fmt.info(&format!("Strategy:   {}", settings.strategy));
        fmt.info(&format!("Settings:   {}", client.settings_path().display()));
        if collection.exists() {
            fmt.info(&format!("Collection: {}", collection.display()));
        }
        Ok(())
    }

    async fn execute_reset(ctx: &Context, yes: bool) -> Result<()> {
        let fmt = ctx.formatter();
        if !yes {
            bail!("Reset deletes the settings file and local collection; pass --yes to confirm");
        }
        let client = ctx.open_client()?;
        client.reset().await.context("Failed to delete local state")?;
        fmt.success("Local state removed");
        Ok(())
    }
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() {
        "(unset)"
    } else {
        value
    }
}
