//! In-process stand-in for the Notion block API.
//!
//! Keeps a block tree behind a mutex and honours the parts of the real
//! contract the sync engine relies on: pagination, `after` insertion,
//! cascading deletes, and 404s for blocks that no longer exist. Failures
//! can be injected per call for retry tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{BlockApi, ChildrenPage, RemoteBlock, RemoteContent, RemoteError, MAX_APPEND_BATCH};
use crate::models::ContentBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    ListChildren,
    AppendChildren,
    UpdateBlock,
    DeleteBlock,
}

#[derive(Debug)]
struct Node {
    content: RemoteContent,
}

#[derive(Debug)]
enum FailureKind {
    Api { status: u16, code: String },
    RateLimited { retry_after_secs: Option<u64> },
}

#[derive(Debug)]
struct InjectedFailure {
    call: ApiCall,
    kind: FailureKind,
}

#[derive(Debug)]
struct State {
    nodes: HashMap<String, Node>,
    children: HashMap<String, Vec<String>>,
    next_id: u64,
    page_size: usize,
    calls: HashMap<ApiCall, usize>,
    failures: VecDeque<InjectedFailure>,
    unreadable: HashSet<String>,
}

#[derive(Debug)]
pub struct InMemoryNotion {
    root_id: String,
    state: Mutex<State>,
}

impl InMemoryNotion {
    pub fn new(root_id: impl Into<String>) -> Self {
        let root_id = root_id.into();
        let mut children = HashMap::new();
        children.insert(root_id.clone(), Vec::new());

        Self {
            root_id,
            state: Mutex::new(State {
                nodes: HashMap::new(),
                children,
                next_id: 1,
                page_size: MAX_APPEND_BATCH,
                calls: HashMap::new(),
                failures: VecDeque::new(),
                unreadable: HashSet::new(),
            }),
        }
    }

    /// Serve `list_children` in pages of `page_size` (minimum 1).
    #[must_use]
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state().page_size = page_size.max(1);
        self
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append block trees at the end of the page. Returns the top-level ids.
    pub fn seed(&self, blocks: &[ContentBlock]) -> Vec<String> {
        let mut state = self.state();
        blocks
            .iter()
            .map(|block| state.seed_tree(&self.root_id, block))
            .collect()
    }

    /// Append a block type the codec does not model, optionally with children.
    pub fn seed_unsupported(&self, kind: &str, children: &[ContentBlock]) -> String {
        let mut state = self.state();
        let id = state.allocate_id();
        state.nodes.insert(
            id.clone(),
            Node {
                content: RemoteContent::Unsupported(kind.to_string()),
            },
        );
        state.children.insert(id.clone(), Vec::new());
        state
            .children
            .entry(self.root_id.clone())
            .or_default()
            .push(id.clone());
        for child in children {
            state.seed_tree(&id, child);
        }
        id
    }

    /// Supported blocks of the page as trees, in order. Unsupported blocks are omitted.
    pub fn document(&self) -> Vec<ContentBlock> {
        let state = self.state();
        state.tree(&self.root_id)
    }

    /// Ids of the page's top-level blocks, in order.
    pub fn top_level_ids(&self) -> Vec<String> {
        self.state()
            .children
            .get(&self.root_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of blocks on the page, at any depth.
    pub fn block_count(&self) -> usize {
        self.state().nodes.len()
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.state().nodes.contains_key(block_id)
    }

    /// Fail the next `call` with the given HTTP status and Notion error code.
    pub fn fail_next(&self, call: ApiCall, status: u16, code: &str) {
        self.state().failures.push_back(InjectedFailure {
            call,
            kind: FailureKind::Api {
                status,
                code: code.to_string(),
            },
        });
    }

    /// Answer the next `call` with a 429 carrying `retry_after_secs`.
    pub fn rate_limit_next(&self, call: ApiCall, retry_after_secs: Option<u64>) {
        self.state().failures.push_back(InjectedFailure {
            call,
            kind: FailureKind::RateLimited { retry_after_secs },
        });
    }

    /// Make `list_children` fail for one block.
    pub fn deny_children(&self, block_id: &str) {
        self.state().unreadable.insert(block_id.to_string());
    }

    pub fn call_count(&self, call: ApiCall) -> usize {
        self.state().calls.get(&call).copied().unwrap_or_default()
    }
}

impl State {
    fn allocate_id(&mut self) -> String {
        let id = format!("blk-{:04}", self.next_id);
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: ApiCall) -> Result<(), RemoteError> {
        *self.calls.entry(call).or_default() += 1;

        if let Some(position) = self.failures.iter().position(|failure| failure.call == call) {
            if let Some(failure) = self.failures.remove(position) {
                return Err(match failure.kind {
                    FailureKind::Api { status, code } => {
                        RemoteError::api(status, code, format!("injected failure for {call:?}"))
                    }
                    FailureKind::RateLimited { retry_after_secs } => {
                        RemoteError::RateLimited { retry_after_secs }
                    }
                });
            }
        }
        Ok(())
    }

    fn seed_tree(&mut self, parent_id: &str, block: &ContentBlock) -> String {
        let id = self.allocate_id();
        self.nodes.insert(
            id.clone(),
            Node {
                content: RemoteContent::Supported(without_children(block)),
            },
        );
        self.children.insert(id.clone(), Vec::new());
        self.children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());
        for child in &block.children {
            self.seed_tree(&id, child);
        }
        id
    }

    fn remote(&self, id: &str) -> Option<RemoteBlock> {
        let node = self.nodes.get(id)?;
        Some(RemoteBlock {
            id: id.to_string(),
            has_children: self.children.get(id).is_some_and(|kids| !kids.is_empty()),
            content: node.content.clone(),
        })
    }

    fn tree(&self, parent_id: &str) -> Vec<ContentBlock> {
        let Some(ids) = self.children.get(parent_id) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| match &self.nodes.get(id)?.content {
                RemoteContent::Supported(block) => {
                    Some(block.clone().with_children(self.tree(id)))
                }
                RemoteContent::Unsupported(_) => None,
            })
            .collect()
    }

    fn exists(&self, block_id: &str) -> bool {
        self.nodes.contains_key(block_id) || self.children.contains_key(block_id)
    }

    fn remove_subtree(&mut self, block_id: &str) {
        if let Some(kids) = self.children.remove(block_id) {
            for kid in kids {
                self.remove_subtree(&kid);
            }
        }
        self.nodes.remove(block_id);
    }
}

fn without_children(block: &ContentBlock) -> ContentBlock {
    ContentBlock::new(block.kind, block.runs.clone())
}

fn not_found(block_id: &str) -> RemoteError {
    RemoteError::api(
        404,
        "object_not_found",
        format!("Could not find block with ID: {block_id}."),
    )
}

#[async_trait]
impl BlockApi for InMemoryNotion {
    async fn list_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ChildrenPage, RemoteError> {
        let mut state = self.state();
        state.record(ApiCall::ListChildren)?;

        if state.unreadable.contains(block_id) {
            return Err(RemoteError::api(
                403,
                "restricted_resource",
                "Insufficient permissions for this block.",
            ));
        }

        let ids = state
            .children
            .get(block_id)
            .cloned()
            .ok_or_else(|| not_found(block_id))?;

        let start = match start_cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| {
                RemoteError::api(400, "validation_error", format!("bad cursor {cursor}"))
            })?,
            None => 0,
        };
        let end = (start + state.page_size).min(ids.len());
        let has_more = end < ids.len();

        Ok(ChildrenPage {
            results: ids
                .get(start..end)
                .unwrap_or_default()
                .iter()
                .filter_map(|id| state.remote(id))
                .collect(),
            next_cursor: has_more.then(|| end.to_string()),
            has_more,
        })
    }

    async fn append_children(
        &self,
        parent_id: &str,
        blocks: &[ContentBlock],
        after: Option<&str>,
    ) -> Result<Vec<RemoteBlock>, RemoteError> {
        let mut state = self.state();
        state.record(ApiCall::AppendChildren)?;

        if blocks.len() > MAX_APPEND_BATCH {
            return Err(RemoteError::api(
                400,
                "validation_error",
                format!("body.children.length should be ≤ {MAX_APPEND_BATCH}"),
            ));
        }
        if !state.exists(parent_id) {
            return Err(not_found(parent_id));
        }

        let siblings = state.children.get(parent_id).cloned().unwrap_or_default();
        let insert_at = match after {
            Some(after) => {
                siblings
                    .iter()
                    .position(|id| id == after)
                    .ok_or_else(|| {
                        RemoteError::api(
                            400,
                            "validation_error",
                            format!("Block {after} is not a child of {parent_id}."),
                        )
                    })?
                    + 1
            }
            None => siblings.len(),
        };

        let mut created = Vec::with_capacity(blocks.len());
        for block in blocks {
            let id = state.allocate_id();
            state.nodes.insert(
                id.clone(),
                Node {
                    content: RemoteContent::Supported(without_children(block)),
                },
            );
            state.children.insert(id.clone(), Vec::new());
            created.push(id);
        }

        let siblings = state.children.entry(parent_id.to_string()).or_default();
        siblings.splice(insert_at..insert_at, created.iter().cloned());

        Ok(created.iter().filter_map(|id| state.remote(id)).collect())
    }

    async fn update_block(
        &self,
        block_id: &str,
        block: &ContentBlock,
    ) -> Result<RemoteBlock, RemoteError> {
        let mut state = self.state();
        state.record(ApiCall::UpdateBlock)?;

        let node = state
            .nodes
            .get_mut(block_id)
            .ok_or_else(|| not_found(block_id))?;
        match &node.content {
            RemoteContent::Supported(existing) if existing.kind == block.kind => {}
            _ => {
                return Err(RemoteError::api(
                    400,
                    "validation_error",
                    format!("Block type cannot be changed to {:?}.", block.kind),
                ));
            }
        }
        node.content = RemoteContent::Supported(without_children(block));

        state.remote(block_id).ok_or_else(|| not_found(block_id))
    }

    async fn delete_block(&self, block_id: &str) -> Result<(), RemoteError> {
        let mut state = self.state();
        state.record(ApiCall::DeleteBlock)?;

        if !state.nodes.contains_key(block_id) {
            return Err(not_found(block_id));
        }

        for siblings in state.children.values_mut() {
            siblings.retain(|id| id != block_id);
        }
        state.remove_subtree(block_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockKind;
    use crate::notion::list_all_children;
    use pretty_assertions::assert_eq;

    fn paragraph(text: &str) -> ContentBlock {
        ContentBlock::text(BlockKind::Paragraph, text)
    }

    #[tokio::test]
    async fn paginates_children() {
        let notion = InMemoryNotion::new("root").with_page_size(2);
        notion.seed(&[paragraph("a"), paragraph("b"), paragraph("c")]);

        let first = notion.list_children("root", None).await.unwrap();
        assert_eq!(first.results.len(), 2);
        assert!(first.has_more);

        let all = list_all_children(&notion, "root").await.unwrap();
        let texts: Vec<_> = all.iter().map(RemoteBlock::plain_text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(notion.call_count(ApiCall::ListChildren), 3);
    }

    #[tokio::test]
    async fn appends_after_sibling() {
        let notion = InMemoryNotion::new("root");
        let ids = notion.seed(&[paragraph("a"), paragraph("c")]);

        notion
            .append_children("root", &[paragraph("b")], Some(&ids[0]))
            .await
            .unwrap();

        assert_eq!(
            notion.document(),
            vec![paragraph("a"), paragraph("b"), paragraph("c")]
        );
    }

    #[tokio::test]
    async fn append_ignores_nested_children() {
        let notion = InMemoryNotion::new("root");
        let nested = ContentBlock::text(BlockKind::BulletedListItem, "parent")
            .with_children(vec![ContentBlock::text(BlockKind::BulletedListItem, "child")]);

        let created = notion.append_children("root", &[nested], None).await.unwrap();

        assert!(!created[0].has_children);
        assert_eq!(notion.block_count(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_and_second_delete_is_not_found() {
        let notion = InMemoryNotion::new("root");
        let nested = ContentBlock::text(BlockKind::BulletedListItem, "parent")
            .with_children(vec![ContentBlock::text(BlockKind::BulletedListItem, "child")]);
        let ids = notion.seed(&[nested]);
        assert_eq!(notion.block_count(), 2);

        notion.delete_block(&ids[0]).await.unwrap();
        assert_eq!(notion.block_count(), 0);

        let error = notion.delete_block(&ids[0]).await.unwrap_err();
        assert!(matches!(error, RemoteError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn update_rejects_kind_change() {
        let notion = InMemoryNotion::new("root");
        let ids = notion.seed(&[paragraph("a")]);

        let error = notion
            .update_block(&ids[0], &ContentBlock::text(BlockKind::Quote, "a"))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let notion = InMemoryNotion::new("root");
        notion.fail_next(ApiCall::AppendChildren, 502, "bad_gateway");

        assert!(notion.append_children("root", &[paragraph("a")], None).await.is_err());
        assert!(notion.append_children("root", &[paragraph("a")], None).await.is_ok());
        assert_eq!(notion.call_count(ApiCall::AppendChildren), 2);
    }

    #[tokio::test]
    async fn unsupported_blocks_are_listed_but_not_documented() {
        let notion = InMemoryNotion::new("root");
        notion.seed_unsupported("image", &[]);
        notion.seed(&[paragraph("a")]);

        let listed = list_all_children(&notion, "root").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, RemoteContent::Unsupported("image".to_string()));
        assert_eq!(notion.document(), vec![paragraph("a")]);
    }
}
