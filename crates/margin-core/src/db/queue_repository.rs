//! Durable sync queue repository
//!
//! Every state transition is a single conditional UPDATE, so several workers
//! can share the table without in-process locks: whoever's UPDATE changes the
//! row owns the transition.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{
    HighlightId, StatusCounts, SyncEntry, SyncEntryId, SyncOperation, SyncPayload, SyncStatus,
};
use libsql::{params, Connection};

/// Retry cap applied when an entry doesn't set one
pub const DEFAULT_MAX_RETRIES: u32 = 5;

const ENTRY_COLUMNS: &str = "id, user_id, highlight_id, operation, text, html, original_text, \
     original_html, status, retry_count, max_retries, next_retry_at, error_message, created_at, \
     updated_at, processed_at, remote_written";

/// Rows a worker may pick up once the clock reads the bound parameter.
const ELIGIBLE: &str = "retry_count < max_retries
     AND (
         (status = 'pending' AND retry_count = 0 AND next_retry_at IS NULL)
         OR (status IN ('pending', 'failed') AND next_retry_at IS NOT NULL AND next_retry_at <= ?)
     )";

/// A sync request before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSyncEntry {
    pub user_id: String,
    pub highlight_id: Option<HighlightId>,
    pub operation: SyncOperation,
    pub payload: SyncPayload,
    pub original: Option<SyncPayload>,
    pub max_retries: u32,
}

impl NewSyncEntry {
    pub fn new(
        user_id: impl Into<String>,
        highlight_id: Option<HighlightId>,
        operation: SyncOperation,
        payload: SyncPayload,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            highlight_id,
            operation,
            payload,
            original: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Pre-edit content, used by updates to find the run to replace
    #[must_use]
    pub fn with_original(mut self, original: SyncPayload) -> Self {
        self.original = Some(original);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Trait for sync queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Persist a request, coalescing into a pending add/update for the same highlight
    async fn enqueue(&self, entry: NewSyncEntry) -> Result<SyncEntry>;

    async fn get(&self, id: &SyncEntryId) -> Result<Option<SyncEntry>>;

    /// Return entries stuck in `processing` since before `now - stale_after_ms` to `pending`.
    /// Their abandoned attempt may have written to Notion, so they are flagged as such.
    async fn reset_stale(&self, now: i64, stale_after_ms: i64) -> Result<u64>;

    /// Up to `limit` entries ready to run at `now`, oldest first
    async fn select_eligible(&self, now: i64, limit: usize) -> Result<Vec<SyncEntry>>;

    /// Move an entry that is still eligible at `due` to `processing`, stamped `now`.
    ///
    /// Returns the claimed row as it stands after the transition, or `None`
    /// when another worker claimed or rescheduled it first.
    async fn claim(&self, id: &SyncEntryId, due: i64, now: i64) -> Result<Option<SyncEntry>>;

    /// Record that an attempt may have written to Notion before it failed
    async fn mark_remote_written(&self, id: &SyncEntryId, now: i64) -> Result<()>;

    /// Terminal success; `note` records why nothing was done, if applicable
    async fn mark_completed(&self, id: &SyncEntryId, note: Option<&str>, now: i64) -> Result<()>;

    /// Back to `pending` after a failed attempt
    async fn mark_retry(
        &self,
        id: &SyncEntryId,
        retry_count: u32,
        next_retry_at: i64,
        error: &str,
        now: i64,
    ) -> Result<()>;

    /// Terminal failure once the retry cap is reached
    async fn mark_failed(&self, id: &SyncEntryId, retry_count: u32, error: &str, now: i64)
        -> Result<()>;

    /// Entry counts per status, for one user or the whole queue
    async fn status_counts(&self, user_id: Option<&str>) -> Result<StatusCounts>;

    /// The user's entries, newest first
    async fn list_entries(
        &self,
        user_id: &str,
        status: Option<SyncStatus>,
        limit: usize,
    ) -> Result<Vec<SyncEntry>>;

    /// Give the user's failed entries a fresh retry budget
    async fn requeue_failed(&self, user_id: &str, now: i64) -> Result<u64>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<SyncEntry> {
        let id: String = row.get(0)?;
        let highlight_id: Option<String> = row.get(2)?;
        let operation: String = row.get(3)?;
        let original_text: Option<String> = row.get(6)?;
        let original_html: Option<String> = row.get(7)?;
        let status: String = row.get(8)?;

        Ok(SyncEntry {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid sync entry id '{id}'")))?,
            user_id: row.get(1)?,
            highlight_id: highlight_id
                .map(|value| {
                    value
                        .parse::<HighlightId>()
                        .map_err(|_| Error::Database(format!("invalid highlight id '{value}'")))
                })
                .transpose()?,
            operation: operation.parse()?,
            payload: SyncPayload::new(row.get::<String>(4)?, row.get(5)?),
            original: original_text.map(|text| SyncPayload::new(text, original_html)),
            status: status.parse()?,
            retry_count: count_from_db(row.get(9)?),
            max_retries: count_from_db(row.get(10)?),
            next_retry_at: row.get(11)?,
            error_message: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            processed_at: row.get(15)?,
            remote_written: row.get::<i64>(16)? != 0,
        })
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn require(&self, id: &SyncEntryId) -> Result<SyncEntry> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sync entry {id}")))
    }

    /// Overwrite the payload of the oldest pending entry for the same key.
    async fn coalesce(&self, entry: &NewSyncEntry, now: i64) -> Result<Option<SyncEntryId>> {
        let Some(highlight_id) = entry.highlight_id else {
            return Ok(None);
        };

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM sync_queue
                 WHERE user_id = ? AND highlight_id = ? AND operation = ? AND status = 'pending'
                   AND remote_written = 0
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1",
                params![
                    entry.user_id.as_str(),
                    highlight_id.as_str(),
                    entry.operation.as_str()
                ],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let existing: String = row.get(0)?;

        // A worker may claim the row between the SELECT and this UPDATE.
        let changed = self
            .conn
            .execute(
                "UPDATE sync_queue SET text = ?, html = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending' AND remote_written = 0",
                params![
                    entry.payload.text.as_str(),
                    entry.payload.html.clone(),
                    now,
                    existing.as_str()
                ],
            )
            .await?;

        if changed == 0 {
            return Ok(None);
        }
        existing
            .parse()
            .map(Some)
            .map_err(|_| Error::Database(format!("invalid sync entry id '{existing}'")))
    }
}

fn count_from_db(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn enqueue(&self, entry: NewSyncEntry) -> Result<SyncEntry> {
        let now = chrono::Utc::now().timestamp_millis();

        if matches!(entry.operation, SyncOperation::Add | SyncOperation::Update) {
            if let Some(existing) = self.coalesce(&entry, now).await? {
                tracing::debug!(
                    entry_id = %existing,
                    operation = %entry.operation,
                    "Coalesced sync request into pending entry"
                );
                return self.require(&existing).await;
            }
        }

        let id = SyncEntryId::new();
        let (original_text, original_html) = entry
            .original
            .map_or((None, None), |original| (Some(original.text), original.html));

        self.conn
            .execute(
                "INSERT INTO sync_queue (
                     id, user_id, highlight_id, operation, text, html, original_text, original_html,
                     status, retry_count, max_retries, created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?)",
                params![
                    id.as_str(),
                    entry.user_id,
                    entry.highlight_id.map(|highlight_id| highlight_id.as_str()),
                    entry.operation.as_str(),
                    entry.payload.text,
                    entry.payload.html,
                    original_text,
                    original_html,
                    i64::from(entry.max_retries),
                    now,
                    now
                ],
            )
            .await?;

        self.require(&id).await
    }

    async fn get(&self, id: &SyncEntryId) -> Result<Option<SyncEntry>> {
        let entries = self
            .query_entries(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE id = ?"),
                [id.as_str()],
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn reset_stale(&self, now: i64, stale_after_ms: i64) -> Result<u64> {
        let reset = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = 'pending', remote_written = 1, updated_at = ?
                 WHERE status = 'processing' AND updated_at < ?",
                params![now, now.saturating_sub(stale_after_ms)],
            )
            .await?;
        Ok(reset)
    }

    async fn select_eligible(&self, now: i64, limit: usize) -> Result<Vec<SyncEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue
                 WHERE {ELIGIBLE}
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?"
            ),
            params![now, limit as i64],
        )
        .await
    }

    async fn claim(&self, id: &SyncEntryId, due: i64, now: i64) -> Result<Option<SyncEntry>> {
        let claimed = self
            .query_entries(
                &format!(
                    "UPDATE sync_queue SET status = 'processing', updated_at = ?
                     WHERE id = ? AND {ELIGIBLE}
                     RETURNING {ENTRY_COLUMNS}"
                ),
                params![now, id.as_str(), due],
            )
            .await?;
        Ok(claimed.into_iter().next())
    }

    async fn mark_remote_written(&self, id: &SyncEntryId, now: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue SET remote_written = 1, updated_at = ? WHERE id = ?",
                params![now, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: &SyncEntryId, note: Option<&str>, now: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'completed', error_message = ?, next_retry_at = NULL,
                     processed_at = ?, updated_at = ?
                 WHERE id = ?",
                params![note, now, now, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn mark_retry(
        &self,
        id: &SyncEntryId,
        retry_count: u32,
        next_retry_at: i64,
        error: &str,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'pending', retry_count = ?, next_retry_at = ?, error_message = ?,
                     updated_at = ?
                 WHERE id = ?",
                params![
                    i64::from(retry_count),
                    next_retry_at,
                    error,
                    now,
                    id.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &SyncEntryId,
        retry_count: u32,
        error: &str,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'failed', retry_count = ?, next_retry_at = NULL, error_message = ?,
                     processed_at = ?, updated_at = ?
                 WHERE id = ?",
                params![i64::from(retry_count), error, now, now, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn status_counts(&self, user_id: Option<&str>) -> Result<StatusCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM sync_queue
                 WHERE ? IS NULL OR user_id = ?
                 GROUP BY status",
                params![user_id, user_id],
            )
            .await?;

        let mut counts = StatusCounts::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.add(status.parse()?, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn list_entries(
        &self,
        user_id: &str,
        status: Option<SyncStatus>,
        limit: usize,
    ) -> Result<Vec<SyncEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue
                 WHERE user_id = ? AND (? IS NULL OR status = ?)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?"
            ),
            params![
                user_id,
                status.map(SyncStatus::as_str),
                status.map(SyncStatus::as_str),
                limit as i64
            ],
        )
        .await
    }

    async fn requeue_failed(&self, user_id: &str, now: i64) -> Result<u64> {
        let requeued = self
            .conn
            .execute(
                "UPDATE sync_queue
                 SET status = 'pending', retry_count = 0, next_retry_at = NULL,
                     error_message = NULL, processed_at = NULL, updated_at = ?
                 WHERE user_id = ? AND status = 'failed'",
                params![now, user_id],
            )
            .await?;
        Ok(requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn update_request(highlight_id: HighlightId, text: &str, original: &str) -> NewSyncEntry {
        NewSyncEntry::new(
            "u",
            Some(highlight_id),
            SyncOperation::Update,
            SyncPayload::new(text, None),
        )
        .with_original(SyncPayload::new(original, None))
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp_millis() + 3_600_000
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_starts_pending() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let entry = repo
            .enqueue(NewSyncEntry::new(
                "u",
                Some(HighlightId::new()),
                SyncOperation::Add,
                SyncPayload::new("Hello", Some("Hello <b>world</b>".to_string())),
            ))
            .await
            .unwrap();

        assert_eq!(entry.status, SyncStatus::Pending);
        assert_eq!(entry.retry_count, 0);
        assert_eq!(entry.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(entry.payload.html.as_deref(), Some("Hello <b>world</b>"));
        assert!(entry.original.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_update_is_coalesced_keeping_oldest_original() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let highlight_id = HighlightId::new();

        let first = repo
            .enqueue(update_request(highlight_id, "B", "A"))
            .await
            .unwrap();
        let second = repo
            .enqueue(update_request(highlight_id, "C", "B"))
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.payload.text, "C");
        assert_eq!(second.original.unwrap().text, "A");
        assert_eq!(repo.status_counts(None).await.unwrap().total(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_processing_entry_is_not_coalesced() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let highlight_id = HighlightId::new();

        let first = repo
            .enqueue(update_request(highlight_id, "B", "A"))
            .await
            .unwrap();
        assert!(repo.claim(&first.id, 1, 1).await.unwrap().is_some());

        let second = repo
            .enqueue(update_request(highlight_id, "C", "B"))
            .await
            .unwrap();

        assert_ne!(second.id, first.id);
        assert_eq!(second.original.unwrap().text, "B");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deletes_are_never_coalesced() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let highlight_id = HighlightId::new();

        for _ in 0..2 {
            repo.enqueue(NewSyncEntry::new(
                "u",
                Some(highlight_id),
                SyncOperation::Delete,
                SyncPayload::new("gone", None),
            ))
            .await
            .unwrap();
        }

        assert_eq!(repo.status_counts(Some("u")).await.unwrap().pending, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_succeeds_exactly_once() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let entry = repo
            .enqueue(update_request(HighlightId::new(), "B", "A"))
            .await
            .unwrap();

        let claimed = repo.claim(&entry.id, 10, 10).await.unwrap().unwrap();
        assert_eq!(claimed.status, SyncStatus::Processing);
        assert_eq!(claimed.updated_at, 10);
        assert!(repo.claim(&entry.id, 11, 11).await.unwrap().is_none());
        assert_eq!(repo.get(&entry.id).await.unwrap().unwrap().status, SyncStatus::Processing);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_eligibility_respects_backoff_and_cap() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let now = chrono::Utc::now().timestamp_millis();

        let fresh = repo
            .enqueue(update_request(HighlightId::new(), "fresh", "f"))
            .await
            .unwrap();
        let waiting = repo
            .enqueue(update_request(HighlightId::new(), "waiting", "w"))
            .await
            .unwrap();
        let due = repo
            .enqueue(update_request(HighlightId::new(), "due", "d"))
            .await
            .unwrap();
        let capped = repo
            .enqueue(update_request(HighlightId::new(), "capped", "c").with_max_retries(1))
            .await
            .unwrap();

        repo.mark_retry(&waiting.id, 1, far_future(), "boom", now)
            .await
            .unwrap();
        repo.mark_retry(&due.id, 1, now - 1, "boom", now).await.unwrap();
        repo.mark_failed(&capped.id, 1, "boom", now).await.unwrap();

        let eligible = repo.select_eligible(now, 10).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![fresh.id, due.id]);

        assert!(repo.claim(&capped.id, now, now).await.unwrap().is_none());
        assert!(repo.claim(&waiting.id, now, now).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_select_eligible_honours_limit_and_order() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let mut created = Vec::new();
        for index in 0..3 {
            let entry = repo
                .enqueue(update_request(HighlightId::new(), &format!("t{index}"), "o"))
                .await
                .unwrap();
            created.push(entry.id);
        }

        let now = chrono::Utc::now().timestamp_millis();
        let eligible = repo.select_eligible(now, 2).await.unwrap();
        let ids: Vec<_> = eligible.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, created[..2].to_vec());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_stale_only_touches_old_processing_rows() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let old = repo
            .enqueue(update_request(HighlightId::new(), "old", "o"))
            .await
            .unwrap();
        let recent = repo
            .enqueue(update_request(HighlightId::new(), "recent", "r"))
            .await
            .unwrap();
        repo.claim(&old.id, 1_000, 1_000).await.unwrap();
        repo.claim(&recent.id, 200_000, 200_000).await.unwrap();

        let reset = repo.reset_stale(250_000, 120_000).await.unwrap();
        assert_eq!(reset, 1);
        let old = repo.get(&old.id).await.unwrap().unwrap();
        assert_eq!(old.status, SyncStatus::Pending);
        assert!(old.remote_written);
        assert_eq!(
            repo.get(&recent.id).await.unwrap().unwrap().status,
            SyncStatus::Processing
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_completion_and_failure_are_recorded() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let done = repo
            .enqueue(update_request(HighlightId::new(), "done", "d"))
            .await
            .unwrap();
        let broken = repo
            .enqueue(update_request(HighlightId::new(), "broken", "b"))
            .await
            .unwrap();

        repo.mark_completed(&done.id, None, 42).await.unwrap();
        repo.mark_failed(&broken.id, 5, "Highlight not found", 43)
            .await
            .unwrap();

        let done = repo.get(&done.id).await.unwrap().unwrap();
        assert_eq!(done.status, SyncStatus::Completed);
        assert_eq!(done.processed_at, Some(42));

        let broken = repo.get(&broken.id).await.unwrap().unwrap();
        assert_eq!(broken.status, SyncStatus::Failed);
        assert_eq!(broken.retry_count, 5);
        assert_eq!(broken.error_message.as_deref(), Some("Highlight not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_counts_and_requeue() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let failed = repo
            .enqueue(update_request(HighlightId::new(), "x", "y"))
            .await
            .unwrap();
        repo.enqueue(update_request(HighlightId::new(), "p", "q"))
            .await
            .unwrap();
        repo.mark_failed(&failed.id, 5, "boom", 1).await.unwrap();

        let counts = repo.status_counts(Some("u")).await.unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                processing: 0,
                completed: 0,
                failed: 1,
            }
        );
        assert_eq!(repo.status_counts(Some("other")).await.unwrap().total(), 0);

        assert_eq!(repo.requeue_failed("u", 2).await.unwrap(), 1);
        let requeued = repo.get(&failed.id).await.unwrap().unwrap();
        assert_eq!(requeued.status, SyncStatus::Pending);
        assert_eq!(requeued.retry_count, 0);
        assert!(requeued.error_message.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_entries_filters_by_status() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());

        let first = repo
            .enqueue(update_request(HighlightId::new(), "a", "a0"))
            .await
            .unwrap();
        repo.enqueue(update_request(HighlightId::new(), "b", "b0"))
            .await
            .unwrap();
        repo.mark_completed(&first.id, None, 5).await.unwrap();

        let all = repo.list_entries("u", None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].payload.text, "b");

        let completed = repo
            .list_entries("u", Some(SyncStatus::Completed), 10)
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_refuses_entry_rescheduled_after_it_was_read() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let now = chrono::Utc::now().timestamp_millis();
        repo.enqueue(update_request(HighlightId::new(), "B", "A"))
            .await
            .unwrap();

        let snapshot = repo.select_eligible(now, 10).await.unwrap().remove(0);

        let other = repo.claim(&snapshot.id, now, now).await.unwrap().unwrap();
        repo.mark_retry(&other.id, 1, now + 3_600_000, "boom", now)
            .await
            .unwrap();

        assert!(repo.claim(&snapshot.id, now, now).await.unwrap().is_none());
        let entry = repo.get(&snapshot.id).await.unwrap().unwrap();
        assert_eq!(entry.status, SyncStatus::Pending);
        assert_eq!(entry.retry_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_returns_current_retry_count() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let now = chrono::Utc::now().timestamp_millis();
        let entry = repo
            .enqueue(update_request(HighlightId::new(), "B", "A"))
            .await
            .unwrap();

        repo.claim(&entry.id, now, now).await.unwrap().unwrap();
        repo.mark_retry(&entry.id, 2, now - 1, "boom", now)
            .await
            .unwrap();

        let claimed = repo.claim(&entry.id, now, now).await.unwrap().unwrap();
        assert_eq!(claimed.retry_count, 2);
        assert_eq!(claimed.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_written_entries_are_not_coalesced() {
        let db = setup().await;
        let repo = LibSqlQueueRepository::new(db.connection());
        let highlight_id = HighlightId::new();
        let add = |text: &str| {
            NewSyncEntry::new(
                "u",
                Some(highlight_id),
                SyncOperation::Add,
                SyncPayload::new(text, None),
            )
        };

        let first = repo.enqueue(add("draft")).await.unwrap();
        repo.claim(&first.id, 1, 1).await.unwrap();
        repo.mark_remote_written(&first.id, 2).await.unwrap();
        repo.mark_retry(&first.id, 1, 3, "timeout", 3).await.unwrap();

        let second = repo.enqueue(add("final")).await.unwrap();

        assert_ne!(second.id, first.id);
        assert!(!second.remote_written);
        let first = repo.get(&first.id).await.unwrap().unwrap();
        assert!(first.remote_written);
        assert_eq!(first.payload.text, "draft");
    }
}
