//! Highlight repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use crate::error::{Error, Result};
use crate::models::{Highlight, HighlightDraft, HighlightId};
use libsql::{params, Connection};

const HIGHLIGHT_COLUMNS: &str =
    "id, user_id, text, html, source, author, is_archived, created_at, updated_at";

/// Trait for highlight storage operations (async)
#[allow(async_fn_in_trait)]
pub trait HighlightRepository {
    /// Create a new highlight
    async fn create(&self, user_id: &str, draft: HighlightDraft) -> Result<Highlight>;

    /// Get one of the user's highlights by ID
    async fn get(&self, user_id: &str, id: &HighlightId) -> Result<Option<Highlight>>;

    /// List highlights, newest first
    async fn list(
        &self,
        user_id: &str,
        include_archived: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Highlight>>;

    /// Replace a highlight's content
    async fn update(&self, user_id: &str, id: &HighlightId, draft: HighlightDraft)
        -> Result<Highlight>;

    /// Archive or unarchive a highlight
    async fn set_archived(&self, user_id: &str, id: &HighlightId, archived: bool)
        -> Result<Highlight>;

    /// Permanently delete a highlight
    async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<()>;
}

/// libSQL implementation of `HighlightRepository`
pub struct LibSqlHighlightRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlHighlightRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a highlight from a database row
    fn parse_highlight(row: &libsql::Row) -> Result<Highlight> {
        let id: String = row.get(0)?;
        Ok(Highlight {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid highlight id '{id}'")))?,
            user_id: row.get(1)?,
            text: row.get(2)?,
            html: row.get(3)?,
            source: row.get(4)?,
            author: row.get(5)?,
            is_archived: row.get::<i32>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    async fn require(&self, user_id: &str, id: &HighlightId) -> Result<Highlight> {
        self.get(user_id, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("highlight {id}")))
    }
}

fn validate(draft: &HighlightDraft) -> Result<()> {
    if draft.text.is_empty() {
        return Err(Error::InvalidInput(
            "Highlight text must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl HighlightRepository for LibSqlHighlightRepository<'_> {
    async fn create(&self, user_id: &str, draft: HighlightDraft) -> Result<Highlight> {
        let draft = draft.normalized();
        validate(&draft)?;
        let highlight = Highlight::new(user_id, draft);

        self.conn
            .execute(
                "INSERT INTO highlights (id, user_id, text, html, source, author, is_archived, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    highlight.id.as_str(),
                    highlight.user_id.clone(),
                    highlight.text.clone(),
                    highlight.html.clone(),
                    highlight.source.clone(),
                    highlight.author.clone(),
                    i32::from(highlight.is_archived),
                    highlight.created_at,
                    highlight.updated_at
                ],
            )
            .await?;

        Ok(highlight)
    }

    async fn get(&self, user_id: &str, id: &HighlightId) -> Result<Option<Highlight>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {HIGHLIGHT_COLUMNS} FROM highlights WHERE id = ? AND user_id = ?"),
                params![id.as_str(), user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_highlight(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        user_id: &str,
        include_archived: bool,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Highlight>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {HIGHLIGHT_COLUMNS} FROM highlights
                     WHERE user_id = ? AND (? OR is_archived = 0)
                     ORDER BY created_at DESC, id DESC
                     LIMIT ? OFFSET ?"
                ),
                params![
                    user_id,
                    i32::from(include_archived),
                    limit as i64,
                    offset as i64
                ],
            )
            .await?;

        let mut highlights = Vec::new();
        while let Some(row) = rows.next().await? {
            highlights.push(Self::parse_highlight(&row)?);
        }
        Ok(highlights)
    }

    async fn update(
        &self,
        user_id: &str,
        id: &HighlightId,
        draft: HighlightDraft,
    ) -> Result<Highlight> {
        let draft = draft.normalized();
        validate(&draft)?;
        let now = chrono::Utc::now().timestamp_millis();

        let changed = self
            .conn
            .execute(
                "UPDATE highlights SET text = ?, html = ?, source = ?, author = ?, updated_at = ?
                 WHERE id = ? AND user_id = ?",
                params![
                    draft.text,
                    draft.html,
                    draft.source,
                    draft.author,
                    now,
                    id.as_str(),
                    user_id
                ],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("highlight {id}")));
        }
        self.require(user_id, id).await
    }

    async fn set_archived(
        &self,
        user_id: &str,
        id: &HighlightId,
        archived: bool,
    ) -> Result<Highlight> {
        let now = chrono::Utc::now().timestamp_millis();
        let changed = self
            .conn
            .execute(
                "UPDATE highlights SET is_archived = ?, updated_at = ? WHERE id = ? AND user_id = ?",
                params![i32::from(archived), now, id.as_str(), user_id],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("highlight {id}")));
        }
        self.require(user_id, id).await
    }

    async fn delete(&self, user_id: &str, id: &HighlightId) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM highlights WHERE id = ? AND user_id = ?",
                params![id.as_str(), user_id],
            )
            .await?;

        if changed == 0 {
            return Err(Error::NotFound(format!("highlight {id}")));
        }
        Ok(())
    }
}
