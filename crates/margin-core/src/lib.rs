//! margin-core - Core library for Margin
//!
//! This crate contains the highlight models, the libSQL storage layer, the
//! rich-content codec, the Notion block client, and the durable sync queue
//! that mirrors local highlight edits into a Notion page.

pub mod codec;
pub mod db;
pub mod error;
pub mod models;
pub mod notion;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Highlight, HighlightId, SyncEntry, SyncEntryId, SyncOperation, SyncStatus};
