//! Linear views over nested block trees.
//!
//! Notion only returns one level of children per request. The locator needs
//! every block in document order, so nested children are fetched and spliced
//! in directly after their parent.

use crate::models::ContentBlock;
use crate::notion::{list_all_children, BlockApi, RemoteBlock, RemoteError};

/// A remote block placed in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatBlock {
    pub block: RemoteBlock,
    /// 0 for blocks directly under the root
    pub depth: usize,
    /// `None` for top-level blocks
    pub parent_id: Option<String>,
}

impl FlatBlock {
    pub const fn is_top_level(&self) -> bool {
        self.depth == 0
    }

    /// Top-level empty paragraph: the boundary between highlight runs.
    pub fn is_sentinel(&self) -> bool {
        self.is_top_level() && self.block.is_sentinel()
    }

    pub fn id(&self) -> &str {
        &self.block.id
    }
}

/// Expand `roots` with their descendants, depth first.
///
/// A node whose children cannot be listed is logged and kept as a leaf.
pub async fn flatten_with_children(api: &dyn BlockApi, roots: Vec<RemoteBlock>) -> Vec<FlatBlock> {
    let mut flat = Vec::with_capacity(roots.len());
    let mut stack: Vec<FlatBlock> = roots
        .into_iter()
        .rev()
        .map(|block| FlatBlock {
            block,
            depth: 0,
            parent_id: None,
        })
        .collect();

    while let Some(mut node) = stack.pop() {
        if node.block.has_children {
            match list_all_children(api, &node.block.id).await {
                Ok(children) => {
                    stack.extend(children.into_iter().rev().map(|child| FlatBlock {
                        block: child,
                        depth: node.depth + 1,
                        parent_id: Some(node.block.id.clone()),
                    }));
                }
                Err(error) => {
                    tracing::warn!(
                        block_id = %node.block.id,
                        %error,
                        "Failed to fetch nested blocks; treating block as childless"
                    );
                    node.block.has_children = false;
                }
            }
        }
        flat.push(node);
    }

    flat
}

/// Fetch every block under `root_id` in document order.
pub async fn fetch_document(api: &dyn BlockApi, root_id: &str) -> Result<Vec<FlatBlock>, RemoteError> {
    let top_level = list_all_children(api, root_id).await?;
    Ok(flatten_with_children(api, top_level).await)
}

/// A locally built block in document order, children removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFlatBlock {
    pub block: ContentBlock,
    pub depth: usize,
}

/// Flatten a local tree the same way remote documents are flattened.
pub fn flatten_for_sync(blocks: &[ContentBlock]) -> Vec<LocalFlatBlock> {
    fn walk(blocks: &[ContentBlock], depth: usize, out: &mut Vec<LocalFlatBlock>) {
        for block in blocks {
            out.push(LocalFlatBlock {
                block: ContentBlock::new(block.kind, block.runs.clone()),
                depth,
            });
            walk(&block.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(blocks, 0, &mut out);
    out
}
