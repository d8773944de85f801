use std::sync::Arc;
use std::time::Duration;

use margin_core::sync::SyncWorker;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs the sync worker on a fixed interval and shortly after local edits.
pub struct SyncScheduler {
    worker: Arc<SyncWorker>,
    wake: Arc<Notify>,
    interval: Duration,
    debounce: Duration,
}

impl SyncScheduler {
    pub const fn new(
        worker: Arc<SyncWorker>,
        wake: Arc<Notify>,
        interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            worker,
            wake,
            interval,
            debounce,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = self.interval.as_secs(),
                debounce_ms = u64::try_from(self.debounce.as_millis()).unwrap_or(u64::MAX),
                "Sync scheduler started"
            );

            loop {
                let trigger = tokio::select! {
                    _ = ticker.tick() => "interval",
                    () = self.wake.notified() => {
                        // Let a burst of edits settle into one pass.
                        tokio::time::sleep(self.debounce).await;
                        "enqueue"
                    }
                };
                self.run_once(trigger).await;
            }
        })
    }

    async fn run_once(&self, trigger: &'static str) {
        match self.worker.process_batch().await {
            Ok(report) if report.total > 0 => tracing::info!(
                trigger,
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                total = report.total,
                "Sync pass finished"
            ),
            Ok(_) => tracing::debug!(trigger, "Sync pass found nothing due"),
            Err(error) => tracing::error!(trigger, error = %error, "Sync pass failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use margin_core::db::{Database, IntegrationRepository, LibSqlIntegrationRepository};
    use margin_core::models::HighlightDraft;
    use margin_core::notion::memory::InMemoryNotion;
    use margin_core::notion::BlockApi;
    use margin_core::services::HighlightService;
    use margin_core::sync::{SharedApiFactory, WorkerConfig};

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_wakes_the_scheduler() {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        LibSqlIntegrationRepository::new(db.connection())
            .upsert("user-1", "secret_test", "root")
            .await
            .unwrap();
        let notion = Arc::new(InMemoryNotion::new("root"));
        let api: Arc<dyn BlockApi> = notion.clone();
        let worker = Arc::new(SyncWorker::new(
            Arc::clone(&db),
            Arc::new(SharedApiFactory(api)),
            WorkerConfig::default(),
        ));

        let wake = Arc::new(Notify::new());
        let handle = SyncScheduler::new(
            worker,
            Arc::clone(&wake),
            Duration::from_secs(3_600),
            Duration::from_millis(10),
        )
        .spawn();

        // Let the immediate first tick pass before editing.
        tokio::time::sleep(Duration::from_millis(50)).await;

        HighlightService::new(Arc::clone(&db))
            .with_wake(wake)
            .create("user-1", HighlightDraft::text("Woken up"))
            .await
            .unwrap();

        let mut synced = false;
        for _ in 0..100 {
            if notion.block_count() == 2 {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(synced, "scheduler never ran after the enqueue");
    }
}
