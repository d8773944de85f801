use std::path::PathBuf;

use clap::{Parser, Subcommand};
use margin_core::SyncStatus;

#[derive(Parser)]
#[command(name = "margin")]
#[command(about = "Capture highlights and mirror them into Notion")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// User the highlights belong to
    #[arg(long, global = true, env = "MARGIN_USER", default_value = "local")]
    pub user: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture a new highlight
    #[command(alias = "new")]
    Add {
        /// Highlight text (stdin or $EDITOR when omitted)
        text: Vec<String>,
        /// Formatted HTML version of the text
        #[arg(long)]
        html: Option<String>,
        /// Book, article or URL the highlight came from
        #[arg(long)]
        source: Option<String>,
        /// Author of the source
        #[arg(long)]
        author: Option<String>,
    },
    /// List recent highlights
    List {
        /// Number of highlights to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Include archived highlights
        #[arg(long)]
        archived: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a highlight's text
    Edit {
        /// Highlight ID or unique ID prefix
        id: String,
        /// Replacement text ($EDITOR when omitted)
        #[arg(long)]
        text: Option<String>,
        /// Replacement HTML
        #[arg(long)]
        html: Option<String>,
    },
    /// Delete a highlight and remove it from Notion
    Delete {
        /// Highlight ID or unique ID prefix
        id: String,
    },
    /// Take a highlight out of review (its Notion copy stays)
    Archive {
        /// Highlight ID or unique ID prefix
        id: String,
        /// Restore instead of archiving
        #[arg(long)]
        undo: bool,
    },
    /// Manage the Notion integration
    Notion {
        #[command(subcommand)]
        command: NotionCommands,
    },
    /// Inspect and drive the Notion sync queue
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(Subcommand)]
pub enum NotionCommands {
    /// Store the integration token and target page
    Connect {
        /// Notion integration token
        #[arg(long, env = "NOTION_TOKEN", hide_env_values = true)]
        token: String,
        /// Page (or block) ID highlights are appended under
        #[arg(long, value_name = "BLOCK_ID")]
        root: String,
    },
    /// Remove the integration; queued entries complete without syncing
    Disconnect,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Process due queue entries
    Run {
        /// Keep going until nothing is due
        #[arg(long)]
        all: bool,
        /// Entries claimed per batch
        #[arg(long, default_value = "10")]
        batch_size: usize,
        /// Notion API base URL
        #[arg(long, env = "NOTION_API_URL", value_name = "URL")]
        api_url: Option<String>,
    },
    /// Show queue counts per status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent queue entries
    Entries {
        /// Only entries in this status
        #[arg(long, value_parser = parse_status)]
        status: Option<SyncStatus>,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Give failed entries a fresh retry budget
    Retry,
}

fn parse_status(value: &str) -> Result<SyncStatus, String> {
    value.parse::<SyncStatus>().map_err(|error| error.to_string())
}
