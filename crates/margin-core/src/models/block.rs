//! Content block model shared by the codec, the Notion client, and the locator

use serde::{Deserialize, Serialize};

/// Block kinds that survive a round trip through Notion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    Quote,
    Code,
    BulletedListItem,
    NumberedListItem,
}

impl BlockKind {
    /// Heading kind for an HTML heading level; levels past 3 clamp to 3.
    #[must_use]
    pub const fn heading(level: u8) -> Self {
        match level {
            0 | 1 => Self::Heading1,
            2 => Self::Heading2,
            _ => Self::Heading3,
        }
    }

    /// Whether blocks of this kind may carry nested children.
    #[must_use]
    pub const fn is_list_item(self) -> bool {
        matches!(self, Self::BulletedListItem | Self::NumberedListItem)
    }
}

/// A span of text sharing one set of annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default)]
    pub link: Option<String>,
}

impl TextRun {
    /// Unannotated run
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Bold run
    #[must_use]
    pub fn bold(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: true,
            ..Self::default()
        }
    }

    /// Whether two runs carry identical annotations and link.
    #[must_use]
    pub fn same_style(&self, other: &Self) -> bool {
        self.bold == other.bold
            && self.italic == other.italic
            && self.underline == other.underline
            && self.strikethrough == other.strikethrough
            && self.code == other.code
            && self.link == other.link
    }
}

/// A typed node of the Notion rendering model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    #[serde(default)]
    pub runs: Vec<TextRun>,
    /// Nested blocks; only list items carry children
    #[serde(default)]
    pub children: Vec<ContentBlock>,
}

impl ContentBlock {
    /// Block of `kind` with the given runs and no children
    #[must_use]
    pub const fn new(kind: BlockKind, runs: Vec<TextRun>) -> Self {
        Self {
            kind,
            runs,
            children: Vec::new(),
        }
    }

    /// Block of `kind` holding one unannotated run
    #[must_use]
    pub fn text(kind: BlockKind, text: impl Into<String>) -> Self {
        Self::new(kind, vec![TextRun::plain(text)])
    }

    /// Empty paragraph separating highlight runs in the Notion page
    #[must_use]
    pub const fn sentinel() -> Self {
        Self::new(BlockKind::Paragraph, Vec::new())
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.children = children;
        self
    }

    /// An empty paragraph with no children.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.kind == BlockKind::Paragraph
            && self.children.is_empty()
            && self.runs.iter().all(|run| run.text.is_empty())
    }

    /// Visible text of this block, excluding children.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}
