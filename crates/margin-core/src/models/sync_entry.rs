//! Sync queue entry model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::codec;
use crate::error::Error;

use super::{ContentBlock, HighlightId};

/// A unique identifier for a sync queue entry, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncEntryId(Uuid);

impl SyncEntryId {
    /// Create a new unique entry ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Remote mutation requested by a local edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Add,
    Update,
    Delete,
}

impl SyncOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown sync operation '{other}'"))),
        }
    }
}

/// Queue entry lifecycle: `pending -> processing -> completed | pending | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Highlight content carried by a queue entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub text: String,
    pub html: Option<String>,
}

impl SyncPayload {
    pub fn new(text: impl Into<String>, html: Option<String>) -> Self {
        Self {
            text: text.into(),
            html,
        }
    }

    /// Blocks this payload renders to; HTML wins over plain text when it has content.
    #[must_use]
    pub fn blocks(&self) -> Vec<ContentBlock> {
        if let Some(html) = self.html.as_deref().map(str::trim).filter(|html| !html.is_empty()) {
            let blocks = codec::encode(html);
            if !blocks.iter().all(ContentBlock::is_sentinel) {
                return blocks;
            }
        }
        codec::encode_plain(&self.text)
    }
}

/// A persisted request to mirror one local edit into Notion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub id: SyncEntryId,
    pub user_id: String,
    /// Absent when the highlight row was already gone at enqueue time
    pub highlight_id: Option<HighlightId>,
    pub operation: SyncOperation,
    /// Content to write (add/update) or to remove (delete)
    pub payload: SyncPayload,
    /// Pre-edit content used to relocate the run (update only)
    pub original: Option<SyncPayload>,
    pub status: SyncStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Earliest retry time (Unix ms)
    pub next_retry_at: Option<i64>,
    pub error_message: Option<String>,
    /// An earlier attempt may already have written to the Notion page
    pub remote_written: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub processed_at: Option<i64>,
}

/// Queue entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub const fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub(crate) fn add(&mut self, status: SyncStatus, count: u64) {
        match status {
            SyncStatus::Pending => self.pending += count,
            SyncStatus::Processing => self.processing += count,
            SyncStatus::Completed => self.completed += count,
            SyncStatus::Failed => self.failed += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKind, TextRun};

    #[test]
    fn operation_and_status_parse_round_trip() {
        for op in [SyncOperation::Add, SyncOperation::Update, SyncOperation::Delete] {
            assert_eq!(op.as_str().parse::<SyncOperation>().unwrap(), op);
        }
        for status in [
            SyncStatus::Pending,
            SyncStatus::Processing,
            SyncStatus::Completed,
            SyncStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("archived".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn payload_prefers_html() {
        let payload = SyncPayload::new("Hello world", Some("Hello <b>world</b>".to_string()));
        let blocks = payload.blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].runs[1], TextRun::bold("world"));
    }

    #[test]
    fn payload_falls_back_to_text() {
        let payload = SyncPayload::new("Buy milk", Some("  ".to_string()));
        let blocks = payload.blocks();
        assert_eq!(blocks, vec![ContentBlock::text(BlockKind::Paragraph, "Buy milk")]);
    }

    #[test]
    fn payload_with_empty_markup_uses_text() {
        let payload = SyncPayload::new("Buy milk", Some("<p> </p>".to_string()));
        assert_eq!(
            payload.blocks(),
            vec![ContentBlock::text(BlockKind::Paragraph, "Buy milk")]
        );
    }

    #[test]
    fn status_counts_total() {
        let mut counts = StatusCounts::default();
        counts.add(SyncStatus::Pending, 2);
        counts.add(SyncStatus::Failed, 1);
        assert_eq!(counts.total(), 3);
    }
}
