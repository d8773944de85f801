//! Per-user Notion integration settings

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials and target page for mirroring a user's highlights.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionIntegration {
    pub user_id: String,
    /// Internal integration or OAuth access token
    pub access_token: String,
    /// Page (or block) the highlights are appended under
    pub root_block_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl fmt::Debug for NotionIntegration {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NotionIntegration")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("root_block_id", &self.root_block_id)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}
