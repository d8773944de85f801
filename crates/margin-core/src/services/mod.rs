//! Application services shared by the API and CLI.

mod highlights;

use std::path::Path;
use std::sync::Arc;

use crate::db::Database;
use crate::Result;

pub use highlights::{EnqueueOutcome, HighlightChange, HighlightService};

/// Open (or create) the database file, creating parent directories as needed.
pub async fn open_database(path: impl AsRef<Path>) -> Result<Arc<Database>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), "Opening database");
    Ok(Arc::new(Database::open(path).await?))
}
