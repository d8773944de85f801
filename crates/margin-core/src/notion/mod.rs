//! Notion block API: the remote side of the sync engine.
//!
//! [`BlockApi`] is the seam between reconciliation logic and the network.
//! [`NotionClient`] talks to api.notion.com; [`memory::InMemoryNotion`]
//! emulates the same contract in-process.

mod client;
pub mod memory;
mod wire;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ContentBlock;

pub use client::{NotionClient, NotionConfig, DEFAULT_NOTION_API_URL, DEFAULT_NOTION_VERSION};

/// Maximum number of blocks Notion accepts in one append request.
pub const MAX_APPEND_BATCH: usize = 100;

/// Maximum characters in a single rich text object.
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Errors returned by the Notion API or the transport in front of it.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Notion HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Notion rate limit exceeded (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("Notion API error {code} ({status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Invalid Notion payload: {0}")]
    InvalidPayload(String),
}

impl RemoteError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Notion answered and refused the request, so nothing was written.
    ///
    /// Transport failures, unreadable responses and 5xx answers may follow a
    /// write that did land.
    pub const fn is_rejection(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status < 500,
            Self::Http(_) | Self::InvalidPayload(_) => false,
        }
    }
}

/// Content of a block read back from Notion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteContent {
    Supported(ContentBlock),
    /// A block type the codec does not model (image, divider, toggle, ...)
    Unsupported(String),
}

/// A block as returned by Notion. Children are never inlined; see `has_children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlock {
    pub id: String,
    pub has_children: bool,
    pub content: RemoteContent,
}

impl RemoteBlock {
    /// Top-level empty paragraph separating two highlight runs.
    pub fn is_sentinel(&self) -> bool {
        !self.has_children
            && matches!(&self.content, RemoteContent::Supported(block) if block.is_sentinel())
    }

    /// Visible text; unsupported blocks have none.
    pub fn plain_text(&self) -> String {
        match &self.content {
            RemoteContent::Supported(block) => block.plain_text(),
            RemoteContent::Unsupported(_) => String::new(),
        }
    }

    /// The block's content without children, if it is a supported kind.
    pub const fn block(&self) -> Option<&ContentBlock> {
        match &self.content {
            RemoteContent::Supported(block) => Some(block),
            RemoteContent::Unsupported(_) => None,
        }
    }
}

/// One page of a block's children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenPage {
    pub results: Vec<RemoteBlock>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Operations the sync engine consumes from Notion.
#[async_trait]
pub trait BlockApi: Send + Sync {
    /// List one page of `block_id`'s direct children.
    async fn list_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ChildrenPage, RemoteError>;

    /// Append `blocks` under `parent_id`, after the sibling `after` or at the end.
    ///
    /// Only the blocks themselves are created; their `children` are ignored and
    /// must be appended under the returned ids. Returns the created blocks in order.
    async fn append_children(
        &self,
        parent_id: &str,
        blocks: &[ContentBlock],
        after: Option<&str>,
    ) -> Result<Vec<RemoteBlock>, RemoteError>;

    /// Replace a block's text in place. The kind must match the existing block.
    async fn update_block(
        &self,
        block_id: &str,
        block: &ContentBlock,
    ) -> Result<RemoteBlock, RemoteError>;

    /// Delete a block and, with it, all of its descendants.
    async fn delete_block(&self, block_id: &str) -> Result<(), RemoteError>;
}

/// Fetch every direct child of `block_id`, following cursors.
pub async fn list_all_children(
    api: &dyn BlockApi,
    block_id: &str,
) -> Result<Vec<RemoteBlock>, RemoteError> {
    let mut blocks = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = api.list_children(block_id, cursor.as_deref()).await?;
        blocks.extend(page.results);
        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }

    Ok(blocks)
}
