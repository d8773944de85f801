//! Margin CLI - capture highlights and drive the Notion sync queue
//!
//! Every command works on the local database; `margin sync run` pushes
//! queued edits to the connected Notion page.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands, NotionCommands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::archive::run_archive;
use crate::commands::common::{resolve_db_path, CommandContext};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::notion::{run_connect, run_disconnect};
use crate::commands::sync::{run_sync, run_sync_entries, run_sync_retry, run_sync_status};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("margin_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = CommandContext::new(resolve_db_path(cli.db_path)?, &cli.user)?;

    match cli.command {
        Commands::Add {
            text,
            html,
            source,
            author,
        } => run_add(&text, html, source, author, &ctx).await?,
        Commands::List {
            limit,
            archived,
            json,
        } => run_list(limit, archived, json, &ctx).await?,
        Commands::Edit { id, text, html } => run_edit(&id, text.as_deref(), html, &ctx).await?,
        Commands::Delete { id } => run_delete(&id, &ctx).await?,
        Commands::Archive { id, undo } => run_archive(&id, undo, &ctx).await?,
        Commands::Notion { command } => match command {
            NotionCommands::Connect { token, root } => run_connect(&token, &root, &ctx).await?,
            NotionCommands::Disconnect => run_disconnect(&ctx).await?,
        },
        Commands::Sync { command } => match command {
            SyncCommands::Run {
                all,
                batch_size,
                api_url,
            } => run_sync(all, batch_size, api_url, &ctx).await?,
            SyncCommands::Status { json } => run_sync_status(json, &ctx).await?,
            SyncCommands::Entries {
                status,
                limit,
                json,
            } => run_sync_entries(status, limit, json, &ctx).await?,
            SyncCommands::Retry => run_sync_retry(&ctx).await?,
        },
    }

    Ok(())
}
