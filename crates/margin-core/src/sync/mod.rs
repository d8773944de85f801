//! Notion sync engine
//!
//! Local edits land in the durable queue; [`SyncWorker`] drains it by
//! locating each highlight's run in the Notion page and rewriting it.

pub mod backoff;
pub mod flatten;
pub mod locator;
pub mod reconcile;
mod worker;

pub use backoff::backoff;
pub use flatten::{fetch_document, flatten_for_sync, flatten_with_children, FlatBlock};
pub use locator::{locate, Fingerprint, LocatedRun, MatchKind};
pub use reconcile::{apply_add, apply_delete, apply_update, ChangeSummary, WriteProgress};
pub use worker::{
    ApiFactory, BatchReport, NotionClientFactory, SharedApiFactory, SyncWorker, WorkerConfig,
    DEFAULT_BATCH_SIZE, DEFAULT_STALE_AFTER,
};
