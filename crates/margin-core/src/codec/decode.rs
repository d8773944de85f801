//! Content blocks -> HTML fragment

use crate::models::{BlockKind, ContentBlock, TextRun};

use super::tokenizer::{escape_attr, escape_text};

pub(super) fn decode_blocks(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    render_blocks(blocks, &mut out);
    out
}

fn render_blocks(blocks: &[ContentBlock], out: &mut String) {
    let mut index = 0;
    while index < blocks.len() {
        let kind = blocks[index].kind;
        if kind.is_list_item() {
            let tag = if kind == BlockKind::NumberedListItem { "ol" } else { "ul" };
            out.push('<');
            out.push_str(tag);
            out.push('>');
            while index < blocks.len() && blocks[index].kind == kind {
                render_list_item(&blocks[index], out);
                index += 1;
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        } else {
            render_block(&blocks[index], out);
            index += 1;
        }
    }
}

fn render_list_item(block: &ContentBlock, out: &mut String) {
    out.push_str("<li>");
    render_runs(&block.runs, out);
    render_blocks(&block.children, out);
    out.push_str("</li>");
}

fn render_block(block: &ContentBlock, out: &mut String) {
    let tag = match block.kind {
        BlockKind::Paragraph => "p",
        BlockKind::Heading1 => "h1",
        BlockKind::Heading2 => "h2",
        BlockKind::Heading3 => "h3",
        BlockKind::Quote => "blockquote",
        BlockKind::Code => {
            out.push_str("<pre><code>");
            out.push_str(&escape_text(&block.plain_text()));
            out.push_str("</code></pre>");
            return;
        }
        BlockKind::BulletedListItem | BlockKind::NumberedListItem => {
            render_list_item(block, out);
            return;
        }
    };

    out.push('<');
    out.push_str(tag);
    out.push('>');
    render_runs(&block.runs, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    // Only list items nest in Notion; anything else is rendered after its parent.
    render_blocks(&block.children, out);
}

fn render_runs(runs: &[TextRun], out: &mut String) {
    for run in runs {
        out.push_str(&render_run(run));
    }
}

/// Wrap one run; nesting from outermost is link > code > underline > strikethrough > italic > bold.
fn render_run(run: &TextRun) -> String {
    let mut html = escape_text(&run.text).replace('\n', "<br>");
    if run.bold {
        html = format!("<strong>{html}</strong>");
    }
    if run.italic {
        html = format!("<em>{html}</em>");
    }
    if run.strikethrough {
        html = format!("<s>{html}</s>");
    }
    if run.underline {
        html = format!("<u>{html}</u>");
    }
    if run.code {
        html = format!("<code>{html}</code>");
    }
    if let Some(link) = &run.link {
        html = format!("<a href=\"{}\">{html}</a>", escape_attr(link));
    }
    html
}
