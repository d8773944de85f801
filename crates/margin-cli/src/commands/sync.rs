use std::sync::Arc;

use margin_core::db::{
    IntegrationRepository, LibSqlIntegrationRepository, LibSqlQueueRepository, QueueRepository,
};
use margin_core::notion::NotionConfig;
use margin_core::services::open_database;
use margin_core::sync::{BatchReport, NotionClientFactory, SyncWorker, WorkerConfig};
use margin_core::util::unix_millis_now;
use margin_core::SyncStatus;

use crate::commands::common::{
    format_sync_entry_lines, sync_entry_to_item, CommandContext, SyncEntryItem,
};
use crate::error::CliError;

const MAX_BATCH_SIZE: usize = 100;
/// Upper bound on batches for `sync run --all`.
const MAX_BATCHES: usize = 1_000;

pub async fn run_sync(
    all: bool,
    batch_size: usize,
    api_url: Option<String>,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(CliError::Config(format!(
            "--batch-size must be in [1, {MAX_BATCH_SIZE}]"
        )));
    }

    let db = open_database(&ctx.db_path).await?;
    if LibSqlIntegrationRepository::new(db.connection())
        .get(&ctx.user)
        .await?
        .is_none()
    {
        return Err(CliError::NotionNotConfigured);
    }

    let mut notion = NotionConfig::default();
    if let Some(api_url) = api_url {
        notion.api_url = api_url.trim_end_matches('/').to_string();
    }
    let worker = SyncWorker::new(
        db,
        Arc::new(NotionClientFactory::new(notion)),
        WorkerConfig {
            batch_size,
            ..WorkerConfig::default()
        },
    );

    let mut totals = BatchReport::default();
    for _ in 0..MAX_BATCHES {
        let report = worker.process_batch().await?;
        totals.processed += report.processed;
        totals.failed += report.failed;
        totals.skipped += report.skipped;
        totals.total += report.total;
        if !all || report.total == 0 {
            break;
        }
    }

    println!(
        "Sync finished: {} processed, {} failed, {} skipped",
        totals.processed, totals.failed, totals.skipped
    );
    Ok(())
}

pub async fn run_sync_status(as_json: bool, ctx: &CommandContext) -> Result<(), CliError> {
    let db = open_database(&ctx.db_path).await?;
    let counts = LibSqlQueueRepository::new(db.connection())
        .status_counts(Some(&ctx.user))
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("pending     {}", counts.pending);
    println!("processing  {}", counts.processing);
    println!("completed   {}", counts.completed);
    println!("failed      {}", counts.failed);
    Ok(())
}

pub async fn run_sync_entries(
    status: Option<SyncStatus>,
    limit: usize,
    as_json: bool,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    let db = open_database(&ctx.db_path).await?;
    let entries = LibSqlQueueRepository::new(db.connection())
        .list_entries(&ctx.user, status, limit)
        .await?;

    if as_json {
        let json_items = entries
            .iter()
            .map(sync_entry_to_item)
            .collect::<Vec<SyncEntryItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync entries recorded.");
        return Ok(());
    }

    for line in format_sync_entry_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_retry(ctx: &CommandContext) -> Result<(), CliError> {
    let db = open_database(&ctx.db_path).await?;
    let requeued = LibSqlQueueRepository::new(db.connection())
        .requeue_failed(&ctx.user, unix_millis_now())
        .await?;

    println!("Requeued {requeued} failed entries");
    Ok(())
}
