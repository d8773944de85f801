//! Find the contiguous run of remote blocks that holds one highlight.
//!
//! Notion has no notion of a highlight: the page is a stream of blocks in
//! which runs are separated by top-level empty paragraphs. A run is
//! identified purely by its text, compared through a normalized
//! [`Fingerprint`].

use crate::error::{Error, Result};
use crate::models::ContentBlock;

use super::flatten::{flatten_for_sync, FlatBlock};

/// Separator between blocks in an exact fingerprint; never produced by normalization.
const BLOCK_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Same blocks with the same normalized text
    Exact,
    /// Same normalized text, block boundaries ignored
    Tolerant,
}

/// Normalized text of a sequence of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    exact: String,
    tolerant: String,
}

impl Fingerprint {
    /// Fingerprint of the given block texts, in document order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized: Vec<String> = texts
            .into_iter()
            .map(|text| normalize_block_text(text.as_ref()))
            .collect();

        let exact = if normalized.iter().all(String::is_empty) {
            String::new()
        } else {
            normalized.join(&BLOCK_SEPARATOR.to_string())
        };
        let tolerant = normalized
            .iter()
            .filter(|text| !text.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        Self { exact, tolerant }
    }

    /// Fingerprint of a locally encoded tree, children included.
    pub fn of_blocks(blocks: &[ContentBlock]) -> Self {
        Self::from_texts(
            flatten_for_sync(blocks)
                .iter()
                .map(|node| node.block.plain_text()),
        )
    }

    fn of_run(run: &[FlatBlock]) -> Self {
        Self::from_texts(run.iter().map(|node| node.block.plain_text()))
    }

    pub fn is_empty(&self) -> bool {
        self.tolerant.is_empty()
    }

    fn matches(&self, other: &Self) -> Option<MatchKind> {
        if self.is_empty() || other.is_empty() {
            None
        } else if self.exact == other.exact {
            Some(MatchKind::Exact)
        } else if self.tolerant == other.tolerant {
            Some(MatchKind::Tolerant)
        } else {
            None
        }
    }

    /// Short human-readable form for error messages.
    pub fn preview(&self) -> String {
        let preview: String = self.tolerant.chars().take(60).collect();
        if preview.len() < self.tolerant.len() {
            format!("{preview}...")
        } else {
            preview
        }
    }
}

/// Lowercase, ASCII quotes, whitespace collapsed and trimmed.
fn normalize_block_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}' | '\u{2032}' => '\'',
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{201f}' | '\u{2033}' => '"',
            _ => c,
        })
        .flat_map(char::to_lowercase)
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A located highlight run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRun {
    /// Blocks of the run at every depth, in document order
    pub blocks: Vec<FlatBlock>,
    pub kind: MatchKind,
    pub sentinel_before: Option<FlatBlock>,
    pub sentinel_after: Option<FlatBlock>,
}

impl LocatedRun {
    /// Top-level blocks of the run; deleting these removes the whole run.
    pub fn top_level(&self) -> impl Iterator<Item = &FlatBlock> {
        self.blocks.iter().filter(|node| node.is_top_level())
    }

    /// Whether the run can be patched block-for-block with `replacement`.
    pub fn same_shape(&self, replacement: &[ContentBlock]) -> bool {
        self.blocks.len() == replacement.len()
            && self.blocks.iter().zip(replacement).all(|(node, block)| {
                node.is_top_level()
                    && !node.block.has_children
                    && block.children.is_empty()
                    && node.block.block().is_some_and(|remote| remote.kind == block.kind)
            })
    }
}

struct Run<'a> {
    blocks: &'a [FlatBlock],
    before: Option<&'a FlatBlock>,
    after: Option<&'a FlatBlock>,
}

impl Run<'_> {
    fn into_located(self, kind: MatchKind) -> LocatedRun {
        LocatedRun {
            blocks: self.blocks.to_vec(),
            kind,
            sentinel_before: self.before.cloned(),
            sentinel_after: self.after.cloned(),
        }
    }
}

/// Split a flattened document into runs: the sentinel-terminated ones and
/// the trailing run without a sentinel, if any.
fn split_runs(document: &[FlatBlock]) -> (Vec<Run<'_>>, Option<Run<'_>>) {
    let mut completed = Vec::new();
    let mut start = 0;
    let mut before = None;

    for (index, node) in document.iter().enumerate() {
        if !node.is_sentinel() {
            continue;
        }
        if index > start {
            completed.push(Run {
                blocks: &document[start..index],
                before,
                after: Some(node),
            });
        }
        before = Some(node);
        start = index + 1;
    }

    let trailing = (start < document.len()).then(|| Run {
        blocks: &document[start..],
        before,
        after: None,
    });

    (completed, trailing)
}

/// Locate the run whose text matches `target`.
///
/// Exact matches on sentinel-terminated runs win in document order, then the
/// first tolerant match among them, then the trailing run.
pub fn locate(document: &[FlatBlock], target: &Fingerprint) -> Result<LocatedRun> {
    if target.is_empty() {
        return Err(Error::HighlightNotFound("empty highlight text".to_string()));
    }

    let (completed, trailing) = split_runs(document);
    let scored: Vec<Option<MatchKind>> = completed
        .iter()
        .map(|run| target.matches(&Fingerprint::of_run(run.blocks)))
        .collect();

    let first = |wanted: MatchKind| {
        scored
            .iter()
            .position(|kind| *kind == Some(wanted))
            .map(|index| (index, wanted))
    };
    if let Some((index, kind)) = first(MatchKind::Exact).or_else(|| first(MatchKind::Tolerant)) {
        if let Some(run) = completed.into_iter().nth(index) {
            return Ok(run.into_located(kind));
        }
    }

    if let Some(run) = trailing {
        if let Some(kind) = target.matches(&Fingerprint::of_run(run.blocks)) {
            return Ok(run.into_located(kind));
        }
    }

    Err(Error::HighlightNotFound(target.preview()))
}

/// The document's final run, if it is an exact match for `target`.
///
/// Used to recognise an add that already landed before its entry was retried.
pub fn exact_final_run(document: &[FlatBlock], target: &Fingerprint) -> Option<LocatedRun> {
    let (completed, trailing) = split_runs(document);
    let run = trailing.or_else(|| completed.into_iter().last())?;
    (target.matches(&Fingerprint::of_run(run.blocks)) == Some(MatchKind::Exact))
        .then(|| run.into_located(MatchKind::Exact))
}

/// Number of top-level sentinels in a document.
pub fn count_sentinels(document: &[FlatBlock]) -> usize {
    document.iter().filter(|node| node.is_sentinel()).count()
}
