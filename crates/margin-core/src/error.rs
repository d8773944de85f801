//! Error types for margin-core

use std::time::Duration;

use thiserror::Error;

use crate::notion::RemoteError;

/// Result type alias using margin-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in margin-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Notion API call failed
    #[error("Notion error: {0}")]
    Remote(#[from] RemoteError),

    /// No run in the Notion page matched the highlight's fingerprint
    #[error("Highlight not found in Notion page: {0}")]
    HighlightNotFound(String),
}

impl Error {
    /// How long Notion asked us to wait before trying again, if it said.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Remote(RemoteError::RateLimited { retry_after_secs }) => {
                retry_after_secs.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}
