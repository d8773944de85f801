//! Rich-content codec: HTML fragments <-> Notion-shaped content blocks.
//!
//! Encoding never fails. Markup the tree builder cannot make sense of
//! (an unterminated tag, an end tag with nothing open) degrades to a single
//! paragraph holding the tag-stripped text.

mod decode;
mod encode;
mod tokenizer;

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ContentBlock;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*(>|$)").expect("valid tag pattern"));

/// Convert an HTML fragment into content blocks.
///
/// Empty input yields a single empty paragraph.
pub fn encode(html: &str) -> Vec<ContentBlock> {
    encode::encode_html(html)
}

/// Convert plain text into paragraphs, one per non-blank line.
pub fn encode_plain(text: &str) -> Vec<ContentBlock> {
    encode::encode_plain_text(text)
}

/// Render content blocks back into an HTML fragment.
pub fn decode(blocks: &[ContentBlock]) -> String {
    decode::decode_blocks(blocks)
}

/// Remove every tag and decode entities.
pub fn strip_tags(html: &str) -> String {
    tokenizer::decode_entities(&TAG_PATTERN.replace_all(html, ""))
}
