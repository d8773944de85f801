//! HTTP client for the Notion block endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::json;

use super::wire::{block_to_wire, block_update_to_wire, WireBlock, WireError, WireList};
use super::{BlockApi, ChildrenPage, RemoteBlock, RemoteError, MAX_APPEND_BATCH};
use crate::models::ContentBlock;
use crate::util::compact_text;

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionConfig {
    pub api_url: String,
    pub version: String,
    pub timeout: Duration,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_NOTION_API_URL.to_string(),
            version: DEFAULT_NOTION_VERSION.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Authenticated client bound to one integration token.
#[derive(Clone)]
pub struct NotionClient {
    client: reqwest::Client,
    base_url: String,
    version: String,
    token: String,
}

impl std::fmt::Debug for NotionClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("NotionClient")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(config: &NotionConfig, token: impl Into<String>) -> Result<Self, RemoteError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(RemoteError::InvalidPayload(
                "Notion access token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            version: config.version.clone(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.version)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            return Err(RemoteError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        Err(parse_api_error(status, &body))
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(payload) = serde_json::from_str::<WireError>(body) {
        return payload.into_remote(status.as_u16());
    }

    let message = compact_text(body);
    RemoteError::api(status.as_u16(), "http_error", message)
}

#[async_trait]
impl BlockApi for NotionClient {
    async fn list_children(
        &self,
        block_id: &str,
        start_cursor: Option<&str>,
    ) -> Result<ChildrenPage, RemoteError> {
        let mut url = format!(
            "{}?page_size={MAX_APPEND_BATCH}",
            self.url(&format!("blocks/{}/children", urlencoding::encode(block_id)))
        );
        if let Some(cursor) = start_cursor {
            url.push_str("&start_cursor=");
            url.push_str(&urlencoding::encode(cursor));
        }

        let response = self.send(self.client.get(url)).await?;
        let list = response.json::<WireList>().await?;
        Ok(list.into_page())
    }

    async fn append_children(
        &self,
        parent_id: &str,
        blocks: &[ContentBlock],
        after: Option<&str>,
    ) -> Result<Vec<RemoteBlock>, RemoteError> {
        if blocks.len() > MAX_APPEND_BATCH {
            return Err(RemoteError::InvalidPayload(format!(
                "cannot append {} blocks in one request (max {MAX_APPEND_BATCH})",
                blocks.len()
            )));
        }

        let children: Vec<_> = blocks.iter().map(block_to_wire).collect();
        let body = after.map_or_else(
            || json!({ "children": children }),
            |after| json!({ "children": children, "after": after }),
        );

        let url = self.url(&format!("blocks/{}/children", urlencoding::encode(parent_id)));
        let response = self.send(self.client.patch(url).json(&body)).await?;
        Ok(response.json::<WireList>().await?.into_blocks())
    }

    async fn update_block(
        &self,
        block_id: &str,
        block: &ContentBlock,
    ) -> Result<RemoteBlock, RemoteError> {
        let url = self.url(&format!("blocks/{}", urlencoding::encode(block_id)));
        let response = self
            .send(self.client.patch(url).json(&block_update_to_wire(block)))
            .await?;
        Ok(response.json::<WireBlock>().await?.into_remote())
    }

    async fn delete_block(&self, block_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("blocks/{}", urlencoding::encode(block_id)));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_blank_token() {
        let error = NotionClient::new(&NotionConfig::default(), "   ").unwrap_err();
        assert!(matches!(error, RemoteError::InvalidPayload(_)));
    }

    #[test]
    fn debug_redacts_token() {
        let client = NotionClient::new(&NotionConfig::default(), "secret_abc").unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret_abc"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let config = NotionConfig {
            api_url: "http://localhost:9999/".to_string(),
            ..NotionConfig::default()
        };
        let client = NotionClient::new(&config, "token").unwrap();
        assert_eq!(client.url("blocks/x"), "http://localhost:9999/v1/blocks/x");
    }

    #[test]
    fn parses_notion_error_body() {
        let error = parse_api_error(
            StatusCode::NOT_FOUND,
            r#"{"object":"error","status":404,"code":"object_not_found","message":"Could not find block"}"#,
        );
        match error {
            RemoteError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "object_not_found");
                assert_eq!(message, "Could not find block");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_raw_body() {
        let error = parse_api_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert!(error.to_string().contains("bad gateway"));
    }
}
