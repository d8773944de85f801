//! Database layer for Margin

mod connection;
mod highlight_repository;
mod integration_repository;
mod migrations;
mod queue_repository;

pub use connection::Database;
pub use highlight_repository::{HighlightRepository, LibSqlHighlightRepository};
pub use integration_repository::{IntegrationRepository, LibSqlIntegrationRepository};
pub use queue_repository::{
    LibSqlQueueRepository, NewSyncEntry, QueueRepository, DEFAULT_MAX_RETRIES,
};
