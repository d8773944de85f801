//! Data models for Margin

mod block;
mod highlight;
mod integration;
mod sync_entry;

pub use block::{BlockKind, ContentBlock, TextRun};
pub use highlight::{Highlight, HighlightDraft, HighlightId};
pub use integration::NotionIntegration;
pub use sync_entry::{StatusCounts, SyncEntry, SyncEntryId, SyncOperation, SyncPayload, SyncStatus};
