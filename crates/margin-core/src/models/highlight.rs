//! Highlight model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::util::normalize_text_option;

use super::SyncPayload;

/// A unique identifier for a highlight, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HighlightId(Uuid);

impl HighlightId {
    /// Create a new unique highlight ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for HighlightId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HighlightId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// User input for creating or editing a highlight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightDraft {
    /// Plain text form
    pub text: String,
    /// Rich HTML form, a formatted superset of `text`
    #[serde(default)]
    pub html: Option<String>,
    /// Where the highlight came from (book, article, URL)
    #[serde(default)]
    pub source: Option<String>,
    /// Author of the source
    #[serde(default)]
    pub author: Option<String>,
}

impl HighlightDraft {
    /// Draft with plain text only
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach an HTML form to the draft
    #[must_use]
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Trim text and drop blank optional fields.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            text: self.text.trim().to_string(),
            html: normalize_text_option(self.html),
            source: normalize_text_option(self.source),
            author: normalize_text_option(self.author),
        }
    }
}

/// A saved highlight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    /// Unique identifier
    pub id: HighlightId,
    /// Owning user
    pub user_id: String,
    /// Plain text content
    pub text: String,
    /// Rich HTML content; the source of truth for sync when present
    pub html: Option<String>,
    pub source: Option<String>,
    pub author: Option<String>,
    /// Archived highlights stay in Notion but leave the review rotation
    pub is_archived: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
}

impl Highlight {
    /// Create a new highlight for `user_id` from a draft
    #[must_use]
    pub fn new(user_id: impl Into<String>, draft: HighlightDraft) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let draft = draft.normalized();
        Self {
            id: HighlightId::new(),
            user_id: user_id.into(),
            text: draft.text,
            html: draft.html,
            source: draft.source,
            author: draft.author,
            is_archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Content as it is mirrored to Notion
    #[must_use]
    pub fn payload(&self) -> SyncPayload {
        SyncPayload {
            text: self.text.clone(),
            html: self.html.clone(),
        }
    }

    /// Get first line as a preview, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}
