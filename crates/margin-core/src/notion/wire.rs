//! JSON shapes exchanged with the Notion block endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{ChildrenPage, RemoteBlock, RemoteContent, RemoteError, MAX_RICH_TEXT_CHARS};
use crate::models::{BlockKind, ContentBlock, TextRun};

const CODE_LANGUAGE: &str = "plain text";

#[derive(Debug, Deserialize)]
pub(super) struct WireList {
    #[serde(default)]
    results: Vec<WireBlock>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl WireList {
    pub(super) fn into_page(self) -> ChildrenPage {
        ChildrenPage {
            results: self.results.into_iter().map(WireBlock::into_remote).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }

    pub(super) fn into_blocks(self) -> Vec<RemoteBlock> {
        self.results.into_iter().map(WireBlock::into_remote).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireBlock {
    id: String,
    #[serde(default)]
    has_children: bool,
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl WireBlock {
    pub(super) fn into_remote(mut self) -> RemoteBlock {
        let content = match kind_from_wire(&self.kind) {
            Some(kind) => {
                let body = self
                    .rest
                    .remove(&self.kind)
                    .and_then(|value| serde_json::from_value::<WireTextBody>(value).ok())
                    .unwrap_or_default();
                RemoteContent::Supported(ContentBlock::new(kind, runs_from_wire(body.rich_text)))
            }
            None => RemoteContent::Unsupported(self.kind),
        };

        RemoteBlock {
            id: self.id,
            has_children: self.has_children,
            content,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireTextBody {
    #[serde(default)]
    rich_text: Vec<WireRichText>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRichText {
    #[serde(rename = "type", default = "default_rich_text_type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<WireTextContent>,
    #[serde(default)]
    annotations: WireAnnotations,
    #[serde(default, skip_serializing)]
    plain_text: Option<String>,
    #[serde(default, skip_serializing)]
    href: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireTextContent {
    content: String,
    #[serde(default)]
    link: Option<WireLink>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireLink {
    url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
struct WireAnnotations {
    #[serde(default)]
    bold: bool,
    #[serde(default)]
    italic: bool,
    #[serde(default)]
    strikethrough: bool,
    #[serde(default)]
    underline: bool,
    #[serde(default)]
    code: bool,
    #[serde(default = "default_color")]
    color: String,
}

fn default_rich_text_type() -> String {
    "text".to_string()
}

fn default_color() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub(super) struct WireError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl WireError {
    pub(super) fn into_remote(self, status: u16) -> RemoteError {
        RemoteError::api(
            status,
            self.code.unwrap_or_else(|| "unknown".to_string()),
            self.message.unwrap_or_default(),
        )
    }
}

fn kind_from_wire(kind: &str) -> Option<BlockKind> {
    Some(match kind {
        "paragraph" => BlockKind::Paragraph,
        "heading_1" => BlockKind::Heading1,
        "heading_2" => BlockKind::Heading2,
        "heading_3" => BlockKind::Heading3,
        "quote" => BlockKind::Quote,
        "code" => BlockKind::Code,
        "bulleted_list_item" => BlockKind::BulletedListItem,
        "numbered_list_item" => BlockKind::NumberedListItem,
        _ => return None,
    })
}

pub(super) const fn kind_to_wire(kind: BlockKind) -> &'static str {
    match kind {
        BlockKind::Paragraph => "paragraph",
        BlockKind::Heading1 => "heading_1",
        BlockKind::Heading2 => "heading_2",
        BlockKind::Heading3 => "heading_3",
        BlockKind::Quote => "quote",
        BlockKind::Code => "code",
        BlockKind::BulletedListItem => "bulleted_list_item",
        BlockKind::NumberedListItem => "numbered_list_item",
    }
}

/// Convert rich text back into runs, merging the pieces a long run was split into.
fn runs_from_wire(rich_text: Vec<WireRichText>) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::with_capacity(rich_text.len());

    for item in rich_text {
        let (text, link) = match item.text {
            Some(content) => (content.content, content.link.map(|link| link.url)),
            None => (item.plain_text.unwrap_or_default(), None),
        };
        let run = TextRun {
            text,
            bold: item.annotations.bold,
            italic: item.annotations.italic,
            underline: item.annotations.underline,
            strikethrough: item.annotations.strikethrough,
            code: item.annotations.code,
            link: link.or(item.href),
        };

        match runs.last_mut() {
            Some(previous) if previous.same_style(&run) => previous.text.push_str(&run.text),
            _ => runs.push(run),
        }
    }

    runs
}

fn runs_to_wire(runs: &[TextRun]) -> Vec<WireRichText> {
    let mut rich_text = Vec::with_capacity(runs.len());

    for run in runs {
        for chunk in split_chars(&run.text, MAX_RICH_TEXT_CHARS) {
            rich_text.push(WireRichText {
                kind: default_rich_text_type(),
                text: Some(WireTextContent {
                    content: chunk.to_string(),
                    link: run.link.clone().map(|url| WireLink { url }),
                }),
                annotations: WireAnnotations {
                    bold: run.bold,
                    italic: run.italic,
                    strikethrough: run.strikethrough,
                    underline: run.underline,
                    code: run.code,
                    color: default_color(),
                },
                plain_text: None,
                href: None,
            });
        }
    }

    rich_text
}

fn split_chars(text: &str, max: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max {
            chunks.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&text[start..]);
    chunks
}

/// Type-specific body of a block (`{"rich_text": [...]}`), without children.
fn block_body(block: &ContentBlock) -> Value {
    let rich_text = runs_to_wire(&block.runs);
    if block.kind == BlockKind::Code {
        json!({ "rich_text": rich_text, "language": CODE_LANGUAGE })
    } else {
        json!({ "rich_text": rich_text })
    }
}

/// A block object for an append request. Children are not included.
pub(super) fn block_to_wire(block: &ContentBlock) -> Value {
    let kind = kind_to_wire(block.kind);
    let mut object = Map::new();
    object.insert("object".to_string(), json!("block"));
    object.insert("type".to_string(), json!(kind));
    object.insert(kind.to_string(), block_body(block));
    Value::Object(object)
}

/// Body for `PATCH /v1/blocks/{id}`.
pub(super) fn block_update_to_wire(block: &ContentBlock) -> Value {
    let mut object = Map::new();
    object.insert(kind_to_wire(block.kind).to_string(), block_body(block));
    Value::Object(object)
}
