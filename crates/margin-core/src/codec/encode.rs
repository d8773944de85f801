//! HTML fragment -> content blocks

use std::mem;

use crate::models::{BlockKind, ContentBlock, TextRun};

use super::tokenizer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
    Text(String),
}

/// An element still open during tree building: name, attributes, children so far.
type OpenElement = (String, Vec<(String, String)>, Vec<Node>);

/// The fragment cannot be read as a tree (unterminated tag or stray end tag).
#[derive(Debug)]
struct Malformed;

const VOID_ELEMENTS: &[&str] = &["br", "hr", "img", "wbr", "input", "meta", "link", "col"];

/// Elements that start a new block and therefore close an open `<p>`.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "blockquote", "pre", "div", "hr",
    "section", "article", "header", "footer", "main", "aside", "figure", "table",
];

/// Transparent block containers: their children are laid out as if inline in the parent.
const CONTAINER_ELEMENTS: &[&str] = &[
    "div", "section", "article", "header", "footer", "main", "aside", "figure", "body", "html",
    "table", "thead", "tbody", "tr", "td", "th", "figcaption", "nav",
];

pub(super) fn encode_html(html: &str) -> Vec<ContentBlock> {
    let blocks = match parse(html) {
        Ok(nodes) => {
            let mut out = Vec::new();
            collect_blocks(&nodes, BlockKind::Paragraph, &Style::default(), &mut out);
            out
        }
        Err(Malformed) => {
            tracing::debug!("Malformed highlight HTML; degrading to plain text");
            fallback_paragraph(html)
        }
    };

    if blocks.is_empty() {
        vec![ContentBlock::sentinel()]
    } else {
        blocks
    }
}

pub(super) fn encode_plain_text(text: &str) -> Vec<ContentBlock> {
    let blocks: Vec<ContentBlock> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| ContentBlock::text(BlockKind::Paragraph, line))
        .collect();

    if blocks.is_empty() {
        vec![ContentBlock::sentinel()]
    } else {
        blocks
    }
}

fn fallback_paragraph(html: &str) -> Vec<ContentBlock> {
    let text = collapse_whitespace(&super::strip_tags(html));
    let text = text.trim();
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ContentBlock::text(BlockKind::Paragraph, text)]
    }
}

fn parse(html: &str) -> Result<Vec<Node>, Malformed> {
    let tokens = tokenize(html).map_err(|_| Malformed)?;
    build_tree(tokens)
}

fn build_tree(tokens: Vec<Token>) -> Result<Vec<Node>, Malformed> {
    // Open elements, innermost last. Index 0 is a synthetic root.
    let mut stack: Vec<OpenElement> = vec![(String::new(), Vec::new(), Vec::new())];

    for token in tokens {
        match token {
            Token::Text(text) => push_child(&mut stack, Node::Text(text)),
            Token::Start {
                name,
                attrs,
                self_closing,
            } => {
                if BLOCK_ELEMENTS.contains(&name.as_str()) && top_name(&stack) == "p" {
                    close_top(&mut stack);
                }
                if name == "li" {
                    close_open_list_item(&mut stack);
                }

                if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
                    push_child(
                        &mut stack,
                        Node::Element {
                            name,
                            attrs,
                            children: Vec::new(),
                        },
                    );
                } else {
                    stack.push((name, attrs, Vec::new()));
                }
            }
            Token::End { name } => {
                if VOID_ELEMENTS.contains(&name.as_str()) {
                    continue;
                }
                let Some(open) = stack
                    .iter()
                    .skip(1)
                    .rposition(|(open_name, _, _)| *open_name == name)
                else {
                    // A stray `</p>` is what editors emit after a list closed the paragraph.
                    if name == "p" {
                        continue;
                    }
                    return Err(Malformed);
                };
                let open = open + 1;
                while stack.len() > open {
                    close_top(&mut stack);
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }

    Ok(stack.pop().map(|(_, _, children)| children).unwrap_or_default())
}

fn top_name(stack: &[OpenElement]) -> &str {
    stack.last().map_or("", |(name, _, _)| name.as_str())
}

fn push_child(stack: &mut [OpenElement], node: Node) {
    if let Some((_, _, children)) = stack.last_mut() {
        children.push(node);
    }
}

fn close_top(stack: &mut Vec<OpenElement>) {
    if stack.len() <= 1 {
        return;
    }
    if let Some((name, attrs, children)) = stack.pop() {
        push_child(
            stack,
            Node::Element {
                name,
                attrs,
                children,
            },
        );
    }
}

/// `<li>` implicitly closes a sibling `<li>` in the same list.
fn close_open_list_item(stack: &mut Vec<OpenElement>) {
    let Some(li) = stack
        .iter()
        .rposition(|(name, _, _)| matches!(name.as_str(), "li" | "ul" | "ol"))
    else {
        return;
    };
    if stack[li].0 == "li" {
        while stack.len() > li {
            close_top(stack);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Style {
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    code: bool,
    link: Option<String>,
}

impl Style {
    fn apply(&self, name: &str, attrs: &[(String, String)], preformatted: bool) -> Self {
        let mut style = self.clone();
        match name {
            "b" | "strong" => style.bold = true,
            "i" | "em" | "cite" => style.italic = true,
            "u" | "ins" => style.underline = true,
            "s" | "strike" | "del" => style.strikethrough = true,
            "code" | "kbd" | "samp" if !preformatted => style.code = true,
            "a" => {
                if let Some((_, href)) = attrs.iter().find(|(key, _)| key == "href") {
                    let href = href.trim();
                    if !href.is_empty() {
                        style.link = Some(href.to_string());
                    }
                }
            }
            _ => {}
        }
        style
    }

    fn run(&self, text: String) -> TextRun {
        TextRun {
            text,
            bold: self.bold,
            italic: self.italic,
            underline: self.underline,
            strikethrough: self.strikethrough,
            code: self.code,
            link: self.link.clone(),
        }
    }
}

fn element_parts(node: &Node) -> Option<(&str, &[(String, String)], &[Node])> {
    match node {
        Node::Element {
            name,
            attrs,
            children,
        } => Some((name.as_str(), attrs.as_slice(), children.as_slice())),
        Node::Text(_) => None,
    }
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Lay out `nodes` as blocks; loose inline content becomes blocks of `container`.
fn collect_blocks(nodes: &[Node], container: BlockKind, style: &Style, out: &mut Vec<ContentBlock>) {
    let mut pending: Vec<TextRun> = Vec::new();

    for node in nodes {
        let Some((name, _, children)) = element_parts(node) else {
            if let Node::Text(text) = node {
                push_text(&mut pending, text, style, false);
            }
            continue;
        };

        match name {
            "p" => {
                flush(&mut pending, container, out);
                collect_blocks(children, container, style, out);
            }
            "blockquote" => {
                flush(&mut pending, container, out);
                collect_blocks(children, BlockKind::Quote, style, out);
            }
            "pre" => {
                flush(&mut pending, container, out);
                let mut runs = Vec::new();
                collect_inline(children, style, &mut runs, true);
                if let Some(first) = runs.first_mut() {
                    if first.text.starts_with('\n') {
                        first.text.remove(0);
                    }
                }
                flush(&mut runs, BlockKind::Code, out);
            }
            "ul" | "ol" => {
                flush(&mut pending, container, out);
                out.extend(list_items(name, children, style));
            }
            "li" => {
                flush(&mut pending, container, out);
                out.push(list_item(BlockKind::BulletedListItem, children, style));
            }
            "hr" => flush(&mut pending, container, out),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                flush(&mut pending, container, out);
                let level = heading_level(name).unwrap_or(3);
                collect_blocks(children, BlockKind::heading(level), style, out);
            }
            _ if CONTAINER_ELEMENTS.contains(&name) => {
                flush(&mut pending, container, out);
                collect_blocks(children, container, style, out);
            }
            _ => collect_inline(std::slice::from_ref(node), style, &mut pending, false),
        }
    }

    flush(&mut pending, container, out);
}

fn list_items(list_name: &str, nodes: &[Node], style: &Style) -> Vec<ContentBlock> {
    let kind = if list_name == "ol" {
        BlockKind::NumberedListItem
    } else {
        BlockKind::BulletedListItem
    };
    let mut items: Vec<ContentBlock> = Vec::new();
    let mut stray: Vec<TextRun> = Vec::new();

    for node in nodes {
        match element_parts(node) {
            Some(("li", _, children)) => {
                flush_stray_item(&mut stray, kind, &mut items);
                items.push(list_item(kind, children, style));
            }
            Some((nested @ ("ul" | "ol"), _, children)) => {
                flush_stray_item(&mut stray, kind, &mut items);
                let nested = list_items(nested, children, style);
                match items.last_mut() {
                    Some(previous) => previous.children.extend(nested),
                    None => items.extend(nested),
                }
            }
            _ => collect_inline(std::slice::from_ref(node), style, &mut stray, false),
        }
    }

    flush_stray_item(&mut stray, kind, &mut items);
    items
}

/// Text sitting directly inside a list, outside any `<li>`, becomes its own item.
fn flush_stray_item(stray: &mut Vec<TextRun>, kind: BlockKind, items: &mut Vec<ContentBlock>) {
    let mut blocks = Vec::new();
    flush(stray, kind, &mut blocks);
    items.extend(blocks);
}

fn list_item(kind: BlockKind, nodes: &[Node], style: &Style) -> ContentBlock {
    let mut runs = Vec::new();
    let mut children = Vec::new();
    collect_list_item(nodes, style, &mut runs, &mut children);
    trim_runs(&mut runs);
    ContentBlock {
        kind,
        runs,
        children,
    }
}

fn collect_list_item(
    nodes: &[Node],
    style: &Style,
    runs: &mut Vec<TextRun>,
    children: &mut Vec<ContentBlock>,
) {
    for node in nodes {
        match element_parts(node) {
            Some((nested @ ("ul" | "ol"), _, list_children)) => {
                children.extend(list_items(nested, list_children, style));
            }
            Some(("pre" | "blockquote", _, _)) => {
                collect_blocks(std::slice::from_ref(node), BlockKind::Paragraph, style, children);
            }
            Some((name, _, inner)) if name == "p" || CONTAINER_ELEMENTS.contains(&name) => {
                // Paragraphs inside an item share the item's text, one per line.
                if runs.iter().any(|run| !run.text.trim().is_empty()) {
                    trim_runs(runs);
                    push_run(runs, style.run("\n".to_string()));
                }
                collect_list_item(inner, style, runs, children);
            }
            _ => collect_inline(std::slice::from_ref(node), style, runs, false),
        }
    }
}

fn collect_inline(nodes: &[Node], style: &Style, runs: &mut Vec<TextRun>, preformatted: bool) {
    for node in nodes {
        match node {
            Node::Text(text) => push_text(runs, text, style, preformatted),
            Node::Element {
                name,
                attrs,
                children,
            } => {
                if name == "br" {
                    push_run(runs, style.run("\n".to_string()));
                    continue;
                }
                let nested = style.apply(name, attrs, preformatted);
                collect_inline(children, &nested, runs, preformatted);
            }
        }
    }
}

fn push_text(runs: &mut Vec<TextRun>, text: &str, style: &Style, preformatted: bool) {
    if preformatted {
        if !text.is_empty() {
            push_run(runs, style.run(text.to_string()));
        }
        return;
    }

    let mut collapsed = collapse_whitespace(text);
    let follows_space = runs
        .last()
        .and_then(|run| run.text.chars().last())
        .map_or(true, |c| c == ' ' || c == '\n');
    if follows_space && collapsed.starts_with(' ') {
        collapsed.remove(0);
    }
    if !collapsed.is_empty() {
        push_run(runs, style.run(collapsed));
    }
}

fn push_run(runs: &mut Vec<TextRun>, run: TextRun) {
    if let Some(previous) = runs.last_mut() {
        if previous.same_style(&run) {
            previous.text.push_str(&run.text);
            return;
        }
    }
    runs.push(run);
}

/// Collapse ASCII whitespace sequences to one space; `&nbsp;` survives.
pub(super) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

/// Trim whitespace at the block's outer edges only; spacing between runs is kept.
fn trim_runs(runs: &mut Vec<TextRun>) {
    while let Some(first) = runs.first_mut() {
        let trimmed = first.text.trim_start().to_string();
        if trimmed.is_empty() {
            runs.remove(0);
        } else {
            first.text = trimmed;
            break;
        }
    }
    while let Some(last) = runs.last_mut() {
        let trimmed = last.text.trim_end().to_string();
        if trimmed.is_empty() {
            runs.pop();
        } else {
            last.text = trimmed;
            break;
        }
    }
}

fn flush(pending: &mut Vec<TextRun>, kind: BlockKind, out: &mut Vec<ContentBlock>) {
    let mut runs = mem::take(pending);
    if kind == BlockKind::Code {
        // Keep indentation; only drop trailing newlines.
        while let Some(last) = runs.last_mut() {
            let trimmed = last.text.trim_end_matches(['\n', '\r']).to_string();
            if trimmed.is_empty() {
                runs.pop();
            } else {
                last.text = trimmed;
                break;
            }
        }
    } else {
        trim_runs(&mut runs);
    }
    if !runs.is_empty() {
        out.push(ContentBlock::new(kind, runs));
    }
}
