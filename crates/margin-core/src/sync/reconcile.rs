//! Apply one local edit to the Notion page.
//!
//! Each operation reads what it needs, then issues its remote calls in
//! sequence. The first remote failure aborts the operation; retries start
//! over from a fresh read of the page.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::models::{ContentBlock, SyncPayload};
use crate::notion::{BlockApi, RemoteBlock, RemoteError, MAX_APPEND_BATCH};

use super::flatten::{fetch_document, flatten_for_sync, FlatBlock};
use super::locator::{exact_final_run, locate, Fingerprint, LocatedRun, MatchKind};

/// Remote calls made by one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Blocks created, nested ones included
    pub appended: usize,
    pub patched: usize,
    /// Top-level blocks deleted; their descendants go with them
    pub deleted: usize,
}

/// Whether an operation issued an append that may have reached the page.
///
/// Stays `false` only while every append either was never sent or was
/// refused outright by Notion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteProgress {
    pub reached_page: bool,
}

/// Append `blocks` in chunks of at most [`MAX_APPEND_BATCH`], keeping order.
async fn append_chunked(
    api: &dyn BlockApi,
    parent_id: &str,
    blocks: &[ContentBlock],
    after: Option<&str>,
    progress: &mut WriteProgress,
) -> std::result::Result<Vec<RemoteBlock>, RemoteError> {
    let mut created: Vec<RemoteBlock> = Vec::with_capacity(blocks.len());

    for chunk in blocks.chunks(MAX_APPEND_BATCH) {
        let anchor = created.last().map(|block| block.id.as_str()).or(after);
        let batch = match api.append_children(parent_id, chunk, anchor).await {
            Ok(batch) => batch,
            Err(error) => {
                if !error.is_rejection() {
                    progress.reached_page = true;
                }
                return Err(error);
            }
        };
        progress.reached_page = true;
        if batch.len() != chunk.len() {
            return Err(RemoteError::InvalidPayload(format!(
                "append returned {} blocks, expected {}",
                batch.len(),
                chunk.len()
            )));
        }
        created.extend(batch);
    }

    Ok(created)
}

/// Append block trees under `parent_id`, then each level of nested children
/// under the ids Notion assigned to their parents.
pub async fn append_tree(
    api: &dyn BlockApi,
    parent_id: &str,
    blocks: &[ContentBlock],
    after: Option<&str>,
    progress: &mut WriteProgress,
) -> std::result::Result<Vec<RemoteBlock>, RemoteError> {
    let created = append_chunked(api, parent_id, blocks, after, progress).await?;

    let mut pending: VecDeque<(String, &[ContentBlock])> = blocks
        .iter()
        .zip(&created)
        .filter(|(block, _)| !block.children.is_empty())
        .map(|(block, remote)| (remote.id.clone(), block.children.as_slice()))
        .collect();

    while let Some((parent, children)) = pending.pop_front() {
        let nested = append_chunked(api, &parent, children, None, progress).await?;
        for (child, remote) in children.iter().zip(&nested) {
            if !child.children.is_empty() {
                pending.push_back((remote.id.clone(), child.children.as_slice()));
            }
        }
    }

    Ok(created)
}

fn content_blocks(payload: &SyncPayload) -> Result<(Vec<ContentBlock>, Fingerprint)> {
    let blocks = payload.blocks();
    let fingerprint = Fingerprint::of_blocks(&blocks);
    if fingerprint.is_empty() {
        return Err(Error::InvalidInput(
            "highlight has no text to sync".to_string(),
        ));
    }
    Ok((blocks, fingerprint))
}

/// Append the highlight and its terminating sentinel to the end of the page.
///
/// With `resume` set, an earlier attempt at this add may have written to the
/// page: an identical final run is taken as its result and only a missing
/// sentinel is added. `progress` records whether this attempt wrote anything.
pub async fn apply_add(
    api: &dyn BlockApi,
    root_id: &str,
    payload: &SyncPayload,
    resume: bool,
    progress: &mut WriteProgress,
) -> Result<ChangeSummary> {
    let (mut blocks, fingerprint) = content_blocks(payload)?;

    if resume {
        let document = fetch_document(api, root_id).await?;
        if let Some(run) = exact_final_run(&document, &fingerprint) {
            if run.sentinel_after.is_some() {
                tracing::debug!("Highlight already present; skipping add");
                return Ok(ChangeSummary::default());
            }
            if let Some(last) = run.top_level().last() {
                append_tree(
                    api,
                    root_id,
                    &[ContentBlock::sentinel()],
                    Some(last.id()),
                    progress,
                )
                .await?;
                return Ok(ChangeSummary {
                    appended: 1,
                    ..ChangeSummary::default()
                });
            }
        }
    }

    blocks.push(ContentBlock::sentinel());
    append_tree(api, root_id, &blocks, None, progress).await?;

    Ok(ChangeSummary {
        appended: flatten_for_sync(&blocks).len(),
        ..ChangeSummary::default()
    })
}

/// Find a run left half-patched by an earlier in-place update.
///
/// Patches go front to back, so such a run holds the first `k` blocks of
/// `current` followed by the rest of `original`.
fn locate_half_patched(
    document: &[FlatBlock],
    original: &[ContentBlock],
    current: &[ContentBlock],
) -> Option<LocatedRun> {
    let flat = |blocks: &[ContentBlock]| blocks.iter().all(|block| block.children.is_empty());
    if original.len() != current.len() || original.len() < 2 || !flat(original) || !flat(current) {
        return None;
    }

    (1..current.len()).find_map(|split| {
        let texts = current[..split]
            .iter()
            .chain(&original[split..])
            .map(ContentBlock::plain_text);
        locate(document, &Fingerprint::from_texts(texts))
            .ok()
            .filter(|run| run.kind == MatchKind::Exact)
    })
}

/// Replace the run holding `original` (or, failing that, `current`) with `current`.
pub async fn apply_update(
    api: &dyn BlockApi,
    root_id: &str,
    original: Option<&SyncPayload>,
    current: &SyncPayload,
) -> Result<ChangeSummary> {
    let (blocks, current_fingerprint) = content_blocks(current)?;
    let document = fetch_document(api, root_id).await?;

    let located = match original {
        Some(original) => {
            let original_blocks = original.blocks();
            locate(&document, &Fingerprint::of_blocks(&original_blocks))
                .or_else(|_| locate(&document, &current_fingerprint))
                .or_else(|error| {
                    locate_half_patched(&document, &original_blocks, &blocks).ok_or(error)
                })
        }
        None => locate(&document, &current_fingerprint),
    };
    let run = located?;

    if run.kind == MatchKind::Exact && run.same_shape(&blocks) {
        for (node, block) in run.blocks.iter().zip(&blocks) {
            api.update_block(node.id(), block).await?;
        }
        return Ok(ChangeSummary {
            patched: blocks.len(),
            ..ChangeSummary::default()
        });
    }

    let old_ids: Vec<String> = run.top_level().map(|node| node.id().to_string()).collect();
    let appended = flatten_for_sync(&blocks).len();
    let mut progress = WriteProgress::default();

    if let Some(before) = &run.sentinel_before {
        for id in &old_ids {
            api.delete_block(id).await?;
        }
        append_tree(api, root_id, &blocks, Some(before.id()), &mut progress).await?;
    } else {
        let last = old_ids
            .last()
            .ok_or_else(|| Error::HighlightNotFound("matched run has no blocks".to_string()))?;
        append_tree(api, root_id, &blocks, Some(last.as_str()), &mut progress).await?;
        for id in &old_ids {
            api.delete_block(id).await?;
        }
    }

    Ok(ChangeSummary {
        appended,
        patched: 0,
        deleted: old_ids.len(),
    })
}

/// Remove the run holding `payload` and one of its sentinels, preferring the one after it.
pub async fn apply_delete(
    api: &dyn BlockApi,
    root_id: &str,
    payload: &SyncPayload,
) -> Result<ChangeSummary> {
    let (_, fingerprint) = content_blocks(payload)?;
    let document = fetch_document(api, root_id).await?;
    let run = locate(&document, &fingerprint)?;

    let mut deleted = 0;
    for node in run.top_level() {
        api.delete_block(node.id()).await?;
        deleted += 1;
    }

    if let Some(sentinel) = run.sentinel_after.as_ref().or(run.sentinel_before.as_ref()) {
        api.delete_block(sentinel.id()).await?;
        deleted += 1;
    }

    Ok(ChangeSummary {
        deleted,
        ..ChangeSummary::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockKind, TextRun};
    use crate::notion::memory::{ApiCall, InMemoryNotion};
    use pretty_assertions::assert_eq;

    fn para(text: &str) -> ContentBlock {
        ContentBlock::text(BlockKind::Paragraph, text)
    }

    fn text_payload(text: &str) -> SyncPayload {
        SyncPayload::new(text, None)
    }

    async fn add(
        notion: &InMemoryNotion,
        payload: &SyncPayload,
        resume: bool,
    ) -> Result<ChangeSummary> {
        apply_add(notion, "root", payload, resume, &mut WriteProgress::default()).await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_appends_blocks_and_sentinel() {
        let notion = InMemoryNotion::new("root");
        let payload = SyncPayload::new("Hello world", Some("Hello <b>world</b>".to_string()));

        let summary = add(&notion, &payload, false).await.unwrap();

        assert_eq!(summary.appended, 2);
        assert_eq!(
            notion.document(),
            vec![
                ContentBlock::new(
                    BlockKind::Paragraph,
                    vec![TextRun::plain("Hello "), TextRun::bold("world")]
                ),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_appends_nested_children_under_created_parents() {
        let notion = InMemoryNotion::new("root");
        let payload = SyncPayload::new(
            "one two",
            Some("<ul><li>one<ul><li>two</li></ul></li></ul>".to_string()),
        );

        add(&notion, &payload, false).await.unwrap();

        assert_eq!(
            notion.document(),
            vec![
                ContentBlock::text(BlockKind::BulletedListItem, "one").with_children(vec![
                    ContentBlock::text(BlockKind::BulletedListItem, "two")
                ]),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn large_adds_are_chunked_in_order() {
        let notion = InMemoryNotion::new("root");
        let text: String = (0..150).map(|index| format!("line {index}\n")).collect();

        add(&notion, &text_payload(&text), false).await.unwrap();

        let document = notion.document();
        assert_eq!(document.len(), 151);
        assert_eq!(document[0], para("line 0"));
        assert_eq!(document[149], para("line 149"));
        assert!(document[150].is_sentinel());
        assert_eq!(notion.call_count(ApiCall::AppendChildren), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retried_add_does_not_duplicate() {
        let notion = InMemoryNotion::new("root");
        let payload = text_payload("Only once");

        add(&notion, &payload, false).await.unwrap();
        let summary = add(&notion, &payload, true).await.unwrap();

        assert_eq!(summary, ChangeSummary::default());
        assert_eq!(notion.document(), vec![para("Only once"), ContentBlock::sentinel()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn retried_add_completes_missing_sentinel() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("earlier"), ContentBlock::sentinel(), para("Half done")]);

        let summary = add(&notion, &text_payload("Half done"), true).await.unwrap();

        assert_eq!(summary.appended, 1);
        assert_eq!(
            notion.document(),
            vec![
                para("earlier"),
                ContentBlock::sentinel(),
                para("Half done"),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_rejects_empty_content() {
        let notion = InMemoryNotion::new("root");
        let result = add(&notion, &text_payload("  "), false).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(notion.block_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn same_shape_update_patches_in_place() {
        let notion = InMemoryNotion::new("root");
        let ids = notion.seed(&[para("Buy milk"), ContentBlock::sentinel()]);

        let summary = apply_update(
            &notion,
            "root",
            Some(&text_payload("Buy milk")),
            &text_payload("Buy oat milk"),
        )
        .await
        .unwrap();

        assert_eq!(summary.patched, 1);
        assert_eq!(notion.top_level_ids(), ids);
        assert_eq!(notion.document(), vec![para("Buy oat milk"), ContentBlock::sentinel()]);
        assert_eq!(notion.call_count(ApiCall::DeleteBlock), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reshaped_update_recreates_run_after_preceding_sentinel() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[
            para("first"),
            ContentBlock::sentinel(),
            para("Buy milk"),
            ContentBlock::sentinel(),
        ]);

        let summary = apply_update(
            &notion,
            "root",
            Some(&text_payload("Buy milk")),
            &text_payload("Buy milk\nand eggs"),
        )
        .await
        .unwrap();

        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.appended, 2);
        assert_eq!(
            notion.document(),
            vec![
                para("first"),
                ContentBlock::sentinel(),
                para("Buy milk"),
                para("and eggs"),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_of_first_run_inserts_before_deleting() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[
            para("Buy milk"),
            ContentBlock::sentinel(),
            para("second"),
            ContentBlock::sentinel(),
        ]);

        apply_update(
            &notion,
            "root",
            Some(&text_payload("Buy milk")),
            &SyncPayload::new("Buy milk", Some("<blockquote>Buy milk</blockquote>".to_string())),
        )
        .await
        .unwrap();

        assert_eq!(
            notion.document(),
            vec![
                ContentBlock::text(BlockKind::Quote, "Buy milk"),
                ContentBlock::sentinel(),
                para("second"),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tolerant_match_recreates_instead_of_patching() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("Hello"), para("world"), ContentBlock::sentinel()]);

        let summary = apply_update(
            &notion,
            "root",
            Some(&text_payload("Hello world")),
            &text_payload("Hello there"),
        )
        .await
        .unwrap();

        assert_eq!(summary.patched, 0);
        assert_eq!(summary.deleted, 2);
        assert_eq!(notion.document(), vec![para("Hello there"), ContentBlock::sentinel()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_falls_back_to_current_content() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("Already new"), ContentBlock::sentinel()]);

        let summary = apply_update(
            &notion,
            "root",
            Some(&text_payload("Old text")),
            &text_payload("Already new"),
        )
        .await
        .unwrap();

        assert_eq!(summary.patched, 1);
        assert_eq!(notion.document(), vec![para("Already new"), ContentBlock::sentinel()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_without_any_match_fails() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("Something else"), ContentBlock::sentinel()]);

        let result = apply_update(
            &notion,
            "root",
            Some(&text_payload("Old")),
            &text_payload("New"),
        )
        .await;

        assert!(matches!(result, Err(Error::HighlightNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_run_and_following_sentinel() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[
            para("keep"),
            ContentBlock::sentinel(),
            ContentBlock::text(BlockKind::BulletedListItem, "drop")
                .with_children(vec![ContentBlock::text(BlockKind::BulletedListItem, "nested")]),
            ContentBlock::sentinel(),
            para("also keep"),
            ContentBlock::sentinel(),
        ]);

        let payload = SyncPayload::new(
            "drop nested",
            Some("<ul><li>drop<ul><li>nested</li></ul></li></ul>".to_string()),
        );
        let summary = apply_delete(&notion, "root", &payload).await.unwrap();

        assert_eq!(summary.deleted, 2);
        assert_eq!(
            notion.document(),
            vec![
                para("keep"),
                ContentBlock::sentinel(),
                para("also keep"),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_matches_text_regardless_of_block_kind() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[
            ContentBlock::text(BlockKind::Heading2, "Chapter one"),
            para("It was dark."),
            ContentBlock::sentinel(),
        ]);

        apply_delete(&notion, "root", &text_payload("Chapter one\nIt was dark."))
            .await
            .unwrap();

        assert_eq!(notion.block_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_of_unterminated_run_takes_preceding_sentinel() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("keep"), ContentBlock::sentinel(), para("tail")]);

        apply_delete(&notion, "root", &text_payload("tail"))
            .await
            .unwrap();

        assert_eq!(notion.document(), vec![para("keep")]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_failure_aborts_operation() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("Buy milk"), ContentBlock::sentinel()]);
        notion.fail_next(ApiCall::UpdateBlock, 502, "service_unavailable");

        let result = apply_update(
            &notion,
            "root",
            Some(&text_payload("Buy milk")),
            &text_payload("Buy oat milk"),
        )
        .await;

        assert!(matches!(result, Err(Error::Remote(RemoteError::Api { status: 502, .. }))));
        assert_eq!(notion.document(), vec![para("Buy milk"), ContentBlock::sentinel()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_add_of_repeated_text_appends_second_run() {
        let notion = InMemoryNotion::new("root");
        notion.seed(&[para("Buy milk"), ContentBlock::sentinel()]);
        let mut progress = WriteProgress::default();

        let summary = apply_add(&notion, "root", &text_payload("Buy milk"), false, &mut progress)
            .await
            .unwrap();

        assert_eq!(summary.appended, 2);
        assert!(progress.reached_page);
        assert_eq!(
            notion.document(),
            vec![
                para("Buy milk"),
                ContentBlock::sentinel(),
                para("Buy milk"),
                ContentBlock::sentinel(),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refused_append_reports_no_write() {
        let notion = InMemoryNotion::new("root");
        notion.fail_next(ApiCall::AppendChildren, 429, "rate_limited");
        let mut progress = WriteProgress::default();

        let result =
            apply_add(&notion, "root", &text_payload("Later"), false, &mut progress).await;

        assert!(result.is_err());
        assert!(!progress.reached_page);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_error_during_append_counts_as_possible_write() {
        let notion = InMemoryNotion::new("root");
        notion.fail_next(ApiCall::AppendChildren, 504, "gateway_timeout");
        let mut progress = WriteProgress::default();

        let result =
            apply_add(&notion, "root", &text_payload("Maybe"), false, &mut progress).await;

        assert!(result.is_err());
        assert!(progress.reached_page);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn half_patched_run_is_finished_on_retry() {
        let notion = InMemoryNotion::new("root");
        let ids = notion.seed(&[para("new one"), para("old two"), ContentBlock::sentinel()]);

        let summary = apply_update(
            &notion,
            "root",
            Some(&text_payload("old one\nold two")),
            &text_payload("new one\nnew two"),
        )
        .await
        .unwrap();

        assert_eq!(summary.patched, 2);
        assert_eq!(notion.top_level_ids(), ids);
        assert_eq!(
            notion.document(),
            vec![para("new one"), para("new two"), ContentBlock::sentinel()]
        );
    }
}
