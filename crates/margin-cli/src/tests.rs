use clap::Parser;
use margin_core::db::{LibSqlQueueRepository, QueueRepository};
use margin_core::models::HighlightDraft;
use margin_core::services::open_database;
use margin_core::{SyncOperation, SyncStatus};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::archive::run_archive;
use crate::commands::common::{
    default_editor, format_relative_time, format_sync_entry_lines, normalize_content,
    normalize_highlight_identifier, resolve_highlight, text_preview, CommandContext,
};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::notion::{run_connect, run_disconnect};
use crate::commands::sync::{run_sync, run_sync_retry};
use crate::error::CliError;

fn test_context() -> (TempDir, CommandContext) {
    let dir = tempfile::tempdir().unwrap();
    let ctx = CommandContext::new(dir.path().join("margin.db"), "tester").unwrap();
    (dir, ctx)
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello  "), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn highlight_identifier_cannot_be_blank() {
    assert!(matches!(
        normalize_highlight_identifier("   "),
        Err(CliError::EmptyHighlightId)
    ));
    assert_eq!(normalize_highlight_identifier(" 0190 ").unwrap(), "0190");
}

#[test]
fn default_editor_is_defined() {
    assert!(!default_editor().is_empty());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn text_preview_truncates_with_ellipsis() {
    let preview = text_preview("This is a very long sentence that should be shortened", 20);
    assert_eq!(preview, "This is a very lo...");
}

#[test]
fn blank_user_is_rejected() {
    assert!(CommandContext::new("margin.db".into(), "  ").is_err());
}

#[test]
fn parses_sync_entries_status_filter() {
    let cli = Cli::try_parse_from(["margin", "--user", "ana", "sync", "entries", "--status", "failed"])
        .unwrap();
    assert_eq!(cli.user, "ana");
    let Commands::Sync {
        command: SyncCommands::Entries { status, limit, .. },
    } = cli.command
    else {
        panic!("expected `sync entries`");
    };
    assert_eq!(status, Some(SyncStatus::Failed));
    assert_eq!(limit, 20);

    assert!(Cli::try_parse_from(["margin", "sync", "entries", "--status", "stuck"]).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_highlight_accepts_unique_prefix() {
    let (_dir, ctx) = test_context();
    let service = ctx.service().await.unwrap();
    let first = service
        .create(&ctx.user, HighlightDraft::text("first"))
        .await
        .unwrap()
        .highlight;
    let second = service
        .create(&ctx.user, HighlightDraft::text("second"))
        .await
        .unwrap()
        .highlight;

    let full = second.id.as_str();
    let unique = &full[..full.len() - 1];
    let resolved = resolve_highlight(unique, &service, &ctx.user).await.unwrap();
    assert_eq!(resolved.id, second.id);

    let first_id = first.id.as_str();
    let shared = &first_id[..4];
    let err = resolve_highlight(shared, &service, &ctx.user)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::AmbiguousHighlightId(_)));

    let err = resolve_highlight("ffffffff", &service, &ctx.user)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::HighlightNotFound(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn edits_queue_sync_entries_once_connected() {
    let (_dir, ctx) = test_context();
    run_connect("secret_abc", "page-1", &ctx).await.unwrap();

    run_add(&["Buy".to_string(), "milk".to_string()], None, None, None, &ctx)
        .await
        .unwrap();
    let service = ctx.service().await.unwrap();
    let highlight = service.list(&ctx.user, false, 10, 0).await.unwrap().remove(0);
    assert_eq!(highlight.text, "Buy milk");

    let prefix = highlight.id.as_str();
    run_edit(&prefix, Some("Buy oat milk"), None, &ctx)
        .await
        .unwrap();
    run_archive(&prefix, false, &ctx).await.unwrap();
    run_delete(&prefix, &ctx).await.unwrap();

    let db = open_database(&ctx.db_path).await.unwrap();
    let mut operations = LibSqlQueueRepository::new(db.connection())
        .list_entries(&ctx.user, None, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.operation)
        .collect::<Vec<_>>();
    operations.sort_by_key(|operation| operation.as_str());
    assert_eq!(
        operations,
        vec![SyncOperation::Add, SyncOperation::Delete, SyncOperation::Update]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_with_new_text_drops_stale_markup() {
    let (_dir, ctx) = test_context();
    let service = ctx.service().await.unwrap();
    let highlight = service
        .create(
            &ctx.user,
            HighlightDraft::text("Hello world").with_html("Hello <b>world</b>"),
        )
        .await
        .unwrap()
        .highlight;

    run_edit(&highlight.id.as_str(), Some("Goodbye"), None, &ctx)
        .await
        .unwrap();

    let updated = service.get(&ctx.user, &highlight.id).await.unwrap().unwrap();
    assert_eq!(updated.text, "Goodbye");
    assert_eq!(updated.html, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_run_requires_connection() {
    let (_dir, ctx) = test_context();
    let err = run_sync(false, 10, None, &ctx).await.unwrap_err();
    assert!(matches!(err, CliError::NotionNotConfigured));

    run_connect("secret_abc", "page-1", &ctx).await.unwrap();
    run_disconnect(&ctx).await.unwrap();
    let err = run_sync(false, 10, None, &ctx).await.unwrap_err();
    assert!(matches!(err, CliError::NotionNotConfigured));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_run_rejects_bad_batch_size() {
    let (_dir, ctx) = test_context();
    let err = run_sync(false, 0, None, &ctx).await.unwrap_err();
    assert!(matches!(err, CliError::Config(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn retry_requeues_failed_entries() {
    let (_dir, ctx) = test_context();
    run_connect("secret_abc", "page-1", &ctx).await.unwrap();
    let service = ctx.service().await.unwrap();
    service
        .create(&ctx.user, HighlightDraft::text("Doomed"))
        .await
        .unwrap();

    let db = open_database(&ctx.db_path).await.unwrap();
    let queue = LibSqlQueueRepository::new(db.connection());
    let entry = queue.list_entries(&ctx.user, None, 1).await.unwrap().remove(0);
    queue.claim(&entry.id, 1, 1).await.unwrap().unwrap();
    queue
        .mark_failed(&entry.id, 5, "Notion error: unauthorized", 2)
        .await
        .unwrap();

    let failed = queue
        .list_entries(&ctx.user, Some(SyncStatus::Failed), 10)
        .await
        .unwrap();
    let lines = format_sync_entry_lines(&failed);
    assert!(lines[0].contains("tries=5/5"));
    assert!(lines[0].contains("error=Notion error: unauthorized"));

    run_sync_retry(&ctx).await.unwrap();
    let entry = queue.get(&entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, SyncStatus::Pending);
    assert_eq!(entry.retry_count, 0);
}
