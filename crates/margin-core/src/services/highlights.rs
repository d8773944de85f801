//! Local highlight edits and the sync requests they produce.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;

use crate::db::{
    Database, HighlightRepository, IntegrationRepository, LibSqlHighlightRepository,
    LibSqlIntegrationRepository, LibSqlQueueRepository, NewSyncEntry, QueueRepository,
    DEFAULT_MAX_RETRIES,
};
use crate::models::{Highlight, HighlightDraft, HighlightId, SyncEntryId, SyncOperation};
use crate::Result;

/// What happened to the sync request for a local edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "entry_id", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Queued(SyncEntryId),
    /// The user has no Notion integration
    NotConfigured,
    /// Nothing mirrored to Notion changed
    Unchanged,
    /// The request could not be stored; the local edit still succeeded
    Failed,
}

/// A saved highlight plus the fate of its sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightChange {
    pub highlight: Highlight,
    pub sync: EnqueueOutcome,
}

/// Highlight CRUD that keeps the Notion mirror queue in step.
///
/// Sync problems never fail a local edit: they are logged and reported
/// through [`EnqueueOutcome`].
#[derive(Clone)]
pub struct HighlightService {
    db: Arc<Database>,
    max_retries: u32,
    wake: Option<Arc<Notify>>,
}

impl HighlightService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            max_retries: DEFAULT_MAX_RETRIES,
            wake: None,
        }
    }

    /// Retry cap stamped on new queue entries.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Notified after every successful enqueue.
    #[must_use]
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn highlights(&self) -> LibSqlHighlightRepository<'_> {
        LibSqlHighlightRepository::new(self.db.connection())
    }

    pub async fn get(&self, user_id: &str, id: &HighlightId) -> Result<Option<Highlight>> {
        self.highlights().get(user_id, id).await
    }

    pub async fn list(
        &self,
        user_id: &str,
        include_archived: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Highlight>> {
        self.highlights()
            .list(user_id, include_archived, limit, offset)
            .await
    }

    pub async fn create(&self, user_id: &str, draft: HighlightDraft) -> Result<HighlightChange> {
        let highlight = self.highlights().create(user_id, draft).await?;
        let sync = self
            .enqueue(NewSyncEntry::new(
                user_id,
                Some(highlight.id),
                SyncOperation::Add,
                highlight.payload(),
            ))
            .await;
        Ok(HighlightChange { highlight, sync })
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &HighlightId,
        draft: HighlightDraft,
    ) -> Result<HighlightChange> {
        let repo = self.highlights();
        let before = repo
            .get(user_id, id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("highlight {id}")))?;
        let highlight = repo.update(user_id, id, draft).await?;

        let original = before.payload();
        let payload = highlight.payload();
        let sync = if original == payload {
            EnqueueOutcome::Unchanged
        } else {
            self.enqueue(
                NewSyncEntry::new(user_id, Some(highlight.id), SyncOperation::Update, payload)
                    .with_original(original),
            )
            .await
        };
        Ok(HighlightChange { highlight, sync })
    }

    /// Hard-delete a highlight and queue removal of its Notion run.
    pub async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<EnqueueOutcome> {
        let repo = self.highlights();
        let existing = repo
            .get(user_id, id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("highlight {id}")))?;
        repo.delete(user_id, id).await?;

        Ok(self
            .enqueue(NewSyncEntry::new(
                user_id,
                Some(existing.id),
                SyncOperation::Delete,
                existing.payload(),
            ))
            .await)
    }

    /// Archiving only affects review; the Notion copy stays.
    pub async fn set_archived(
        &self,
        user_id: &str,
        id: &HighlightId,
        archived: bool,
    ) -> Result<Highlight> {
        self.highlights().set_archived(user_id, id, archived).await
    }

    /// Queue a request unless the user has no integration. Never fails.
    async fn enqueue(&self, entry: NewSyncEntry) -> EnqueueOutcome {
        let user_id = entry.user_id.clone();
        let operation = entry.operation;

        match self.try_enqueue(entry.with_max_retries(self.max_retries)).await {
            Ok(Some(entry_id)) => {
                tracing::debug!(%entry_id, %operation, "Queued Notion sync");
                if let Some(wake) = &self.wake {
                    wake.notify_one();
                }
                EnqueueOutcome::Queued(entry_id)
            }
            Ok(None) => {
                tracing::debug!(%user_id, %operation, "Notion not configured; skipping sync");
                EnqueueOutcome::NotConfigured
            }
            Err(error) => {
                tracing::error!(%user_id, %operation, %error, "Failed to queue Notion sync");
                EnqueueOutcome::Failed
            }
        }
    }

    async fn try_enqueue(&self, entry: NewSyncEntry) -> Result<Option<SyncEntryId>> {
        let conn = self.db.connection();
        if LibSqlIntegrationRepository::new(conn)
            .get(&entry.user_id)
            .await?
            .is_none()
        {
            return Ok(None);
        }
        let queued = LibSqlQueueRepository::new(conn).enqueue(entry).await?;
        Ok(Some(queued.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;
    use pretty_assertions::assert_eq;

    async fn setup(configured: bool) -> HighlightService {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        if configured {
            LibSqlIntegrationRepository::new(db.connection())
                .upsert("u", "secret", "page")
                .await
                .unwrap();
        }
        HighlightService::new(db)
    }

    async fn queued(service: &HighlightService) -> Vec<crate::models::SyncEntry> {
        LibSqlQueueRepository::new(service.database().connection())
            .list_entries("u", None, 50)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_without_integration_is_not_configured() {
        let service = setup(false).await;
        let change = service
            .create("u", HighlightDraft::text("Hello"))
            .await
            .unwrap();

        assert_eq!(change.sync, EnqueueOutcome::NotConfigured);
        assert!(queued(&service).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_queues_add() {
        let service = setup(true).await;
        let change = service
            .create("u", HighlightDraft::text("Hello"))
            .await
            .unwrap();

        let entries = queued(&service).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(change.sync, EnqueueOutcome::Queued(entries[0].id));
        assert_eq!(entries[0].operation, SyncOperation::Add);
        assert_eq!(entries[0].highlight_id, Some(change.highlight.id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_records_original_content() {
        let service = setup(true).await;
        let created = service
            .create("u", HighlightDraft::text("Buy milk"))
            .await
            .unwrap();
        service
            .update("u", &created.highlight.id, HighlightDraft::text("Buy oat milk"))
            .await
            .unwrap();

        let update = queued(&service)
            .await
            .into_iter()
            .find(|entry| entry.operation == SyncOperation::Update)
            .unwrap();
        assert_eq!(update.payload.text, "Buy oat milk");
        assert_eq!(update.original.unwrap().text, "Buy milk");
        assert_eq!(update.status, SyncStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn metadata_only_update_is_not_synced() {
        let service = setup(true).await;
        let created = service
            .create("u", HighlightDraft::text("Same"))
            .await
            .unwrap();

        let draft = HighlightDraft {
            source: Some("A book".to_string()),
            ..HighlightDraft::text("Same")
        };
        let change = service
            .update("u", &created.highlight.id, draft)
            .await
            .unwrap();

        assert_eq!(change.sync, EnqueueOutcome::Unchanged);
        assert_eq!(change.highlight.source.as_deref(), Some("A book"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_queues_removal_of_last_content() {
        let service = setup(true).await;
        let created = service
            .create("u", HighlightDraft::text("Gone soon"))
            .await
            .unwrap();

        let outcome = service.delete("u", &created.highlight.id).await.unwrap();

        assert!(matches!(outcome, EnqueueOutcome::Queued(_)));
        assert!(service.get("u", &created.highlight.id).await.unwrap().is_none());
        let delete = queued(&service)
            .await
            .into_iter()
            .find(|entry| entry.operation == SyncOperation::Delete)
            .unwrap();
        assert_eq!(delete.payload.text, "Gone soon");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_wakes_listener() {
        let wake = Arc::new(Notify::new());
        let service = setup(true).await.with_wake(Arc::clone(&wake));

        service
            .create("u", HighlightDraft::text("ping"))
            .await
            .unwrap();

        // notify_one stores a permit when nobody is waiting yet.
        tokio::time::timeout(std::time::Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_highlight_is_not_found() {
        let service = setup(true).await;
        let result = service
            .update("u", &HighlightId::new(), HighlightDraft::text("x"))
            .await;
        assert!(matches!(result, Err(crate::Error::NotFound(_))));
    }
}
