//! Queue worker: claims due entries and applies them to Notion.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::db::{
    Database, HighlightRepository, IntegrationRepository, LibSqlHighlightRepository,
    LibSqlIntegrationRepository, LibSqlQueueRepository, QueueRepository,
};
use crate::error::{Error, Result};
use crate::models::{NotionIntegration, SyncEntry, SyncOperation};
use crate::notion::{BlockApi, NotionClient, NotionConfig, RemoteError};
use crate::util::unix_millis_now;

use super::backoff::retry_at;
use super::reconcile::{apply_add, apply_delete, apply_update, ChangeSummary, WriteProgress};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

const NOT_CONFIGURED_NOTE: &str = "Notion integration not configured; nothing to sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Maximum entries claimed per cycle
    pub batch_size: usize,
    /// How long an entry may sit in `processing` before it is handed out again
    pub stale_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Builds the block API used for one user's integration.
pub trait ApiFactory: Send + Sync {
    fn client_for(
        &self,
        integration: &NotionIntegration,
    ) -> std::result::Result<Arc<dyn BlockApi>, RemoteError>;
}

/// Talks to the real Notion API with each integration's token.
#[derive(Debug, Clone, Default)]
pub struct NotionClientFactory {
    config: NotionConfig,
}

impl NotionClientFactory {
    pub const fn new(config: NotionConfig) -> Self {
        Self { config }
    }
}

impl ApiFactory for NotionClientFactory {
    fn client_for(
        &self,
        integration: &NotionIntegration,
    ) -> std::result::Result<Arc<dyn BlockApi>, RemoteError> {
        Ok(Arc::new(NotionClient::new(
            &self.config,
            &integration.access_token,
        )?))
    }
}

/// Hands every integration the same API; for tests and local tooling.
#[derive(Clone)]
pub struct SharedApiFactory(pub Arc<dyn BlockApi>);

impl ApiFactory for SharedApiFactory {
    fn client_for(
        &self,
        _integration: &NotionIntegration,
    ) -> std::result::Result<Arc<dyn BlockApi>, RemoteError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Outcome of one processing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Entries applied and marked completed
    pub processed: usize,
    /// Entries whose attempt failed (rescheduled or terminal)
    pub failed: usize,
    /// Entries claimed by another worker, or completed without a configured integration
    pub skipped: usize,
    /// Entries selected this cycle
    pub total: usize,
}

enum Outcome {
    Applied(ChangeSummary),
    NotConfigured,
}

/// Cycle time that keeps running with the wall clock.
///
/// Queue transitions are stamped with [`CycleClock::now`] at the moment they
/// happen, not with the time the cycle started.
#[derive(Debug, Clone, Copy)]
struct CycleClock {
    offset_ms: i64,
}

impl CycleClock {
    fn starting_at(now: i64) -> Self {
        Self {
            offset_ms: now.saturating_sub(unix_millis_now()),
        }
    }

    fn now(self) -> i64 {
        unix_millis_now().saturating_add(self.offset_ms)
    }
}

pub struct SyncWorker {
    db: Arc<Database>,
    factory: Arc<dyn ApiFactory>,
    config: WorkerConfig,
}

impl SyncWorker {
    pub fn new(db: Arc<Database>, factory: Arc<dyn ApiFactory>, config: WorkerConfig) -> Self {
        Self {
            db,
            factory,
            config,
        }
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run one cycle against the current time.
    pub async fn process_batch(&self) -> Result<BatchReport> {
        self.process_due(unix_millis_now()).await
    }

    /// Run one cycle as if the clock read `now` (Unix ms) when it started.
    pub async fn process_due(&self, now: i64) -> Result<BatchReport> {
        let clock = CycleClock::starting_at(now);
        let queue = LibSqlQueueRepository::new(self.db.connection());
        let stale_after_ms = i64::try_from(self.config.stale_after.as_millis()).unwrap_or(i64::MAX);

        let reset = queue.reset_stale(now, stale_after_ms).await?;
        if reset > 0 {
            tracing::warn!(count = reset, "Reset stale sync entries to pending");
        }

        let entries = queue.select_eligible(now, self.config.batch_size).await?;
        let mut report = BatchReport {
            total: entries.len(),
            ..BatchReport::default()
        };

        for selected in entries {
            let Some(entry) = queue.claim(&selected.id, now, clock.now()).await? else {
                tracing::debug!(entry_id = %selected.id, "Sync entry claimed elsewhere");
                report.skipped += 1;
                continue;
            };

            let mut progress = WriteProgress::default();
            match self.apply(&entry, &mut progress).await {
                Ok(Outcome::Applied(summary)) => {
                    queue.mark_completed(&entry.id, None, clock.now()).await?;
                    tracing::info!(
                        entry_id = %entry.id,
                        operation = %entry.operation,
                        appended = summary.appended,
                        patched = summary.patched,
                        deleted = summary.deleted,
                        "Synced highlight to Notion"
                    );
                    report.processed += 1;
                }
                Ok(Outcome::NotConfigured) => {
                    queue
                        .mark_completed(&entry.id, Some(NOT_CONFIGURED_NOTE), clock.now())
                        .await?;
                    tracing::warn!(
                        entry_id = %entry.id,
                        user_id = %entry.user_id,
                        "No Notion integration; completing sync entry without changes"
                    );
                    report.skipped += 1;
                }
                Err(error) => {
                    if progress.reached_page && !entry.remote_written {
                        queue.mark_remote_written(&entry.id, clock.now()).await?;
                    }
                    record_failure(&queue, &entry, &error, clock.now()).await?;
                    report.failed += 1;
                }
            }
        }

        if report.total > 0 {
            tracing::info!(
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                total = report.total,
                "Sync cycle finished"
            );
        }
        Ok(report)
    }

    async fn apply(&self, entry: &SyncEntry, progress: &mut WriteProgress) -> Result<Outcome> {
        let conn = self.db.connection();
        let Some(integration) = LibSqlIntegrationRepository::new(conn)
            .get(&entry.user_id)
            .await?
        else {
            return Ok(Outcome::NotConfigured);
        };

        let api = self.factory.client_for(&integration)?;
        let root = integration.root_block_id.as_str();

        let summary = match entry.operation {
            SyncOperation::Add => {
                apply_add(
                    api.as_ref(),
                    root,
                    &entry.payload,
                    entry.remote_written,
                    progress,
                )
                .await?
            }
            SyncOperation::Update => {
                let current = match entry.highlight_id {
                    Some(id) => LibSqlHighlightRepository::new(conn)
                        .get(&entry.user_id, &id)
                        .await?
                        .map(|highlight| highlight.payload()),
                    None => None,
                };
                let current = current.unwrap_or_else(|| entry.payload.clone());
                apply_update(api.as_ref(), root, entry.original.as_ref(), &current).await?
            }
            SyncOperation::Delete => apply_delete(api.as_ref(), root, &entry.payload).await?,
        };

        Ok(Outcome::Applied(summary))
    }
}

async fn record_failure(
    queue: &LibSqlQueueRepository<'_>,
    entry: &SyncEntry,
    error: &Error,
    now: i64,
) -> Result<()> {
    let retry_count = entry.retry_count.saturating_add(1);
    let message = error.to_string();
    let message = message.as_str();

    if retry_count < entry.max_retries {
        let next_retry_at = retry_at(now, retry_count, error.retry_after());
        queue
            .mark_retry(&entry.id, retry_count, next_retry_at, message, now)
            .await?;
        tracing::warn!(
            entry_id = %entry.id,
            operation = %entry.operation,
            retry_count,
            next_retry_at,
            error = message,
            "Sync attempt failed; rescheduled"
        );
    } else {
        queue
            .mark_failed(&entry.id, retry_count, message, now)
            .await?;
        tracing::error!(
            entry_id = %entry.id,
            operation = %entry.operation,
            retry_count,
            error = message,
            "Sync entry failed permanently"
        );
    }
    Ok(())
}
