//! Notion integration repository implementation

use crate::error::{Error, Result};
use crate::models::NotionIntegration;
use libsql::{params, Connection};

/// Trait for per-user Notion integration storage (async)
#[allow(async_fn_in_trait)]
pub trait IntegrationRepository {
    /// Load the user's integration, if configured
    async fn get(&self, user_id: &str) -> Result<Option<NotionIntegration>>;

    /// Create or replace the user's integration
    async fn upsert(
        &self,
        user_id: &str,
        access_token: &str,
        root_block_id: &str,
    ) -> Result<NotionIntegration>;

    /// Remove the user's integration; returns whether one existed
    async fn delete(&self, user_id: &str) -> Result<bool>;
}

/// libSQL implementation of `IntegrationRepository`
pub struct LibSqlIntegrationRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlIntegrationRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl IntegrationRepository for LibSqlIntegrationRepository<'_> {
    async fn get(&self, user_id: &str) -> Result<Option<NotionIntegration>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, access_token, root_block_id, created_at, updated_at
                 FROM notion_integrations WHERE user_id = ?",
                [user_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        Ok(Some(NotionIntegration {
            user_id: row.get(0)?,
            access_token: row.get(1)?,
            root_block_id: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        }))
    }

    async fn upsert(
        &self,
        user_id: &str,
        access_token: &str,
        root_block_id: &str,
    ) -> Result<NotionIntegration> {
        let access_token = access_token.trim();
        let root_block_id = root_block_id.trim();
        if access_token.is_empty() || root_block_id.is_empty() {
            return Err(Error::InvalidInput(
                "Notion access token and root block id are required".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT INTO notion_integrations (user_id, access_token, root_block_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET
                     access_token = excluded.access_token,
                     root_block_id = excluded.root_block_id,
                     updated_at = excluded.updated_at",
                params![user_id, access_token, root_block_id, now, now],
            )
            .await?;

        self.get(user_id)
            .await?
            .ok_or_else(|| Error::Database(format!("integration for {user_id} was not saved")))
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM notion_integrations WHERE user_id = ?", [user_id])
            .await?;
        Ok(removed > 0)
    }
}
