use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use margin_core::notion::{NotionConfig, DEFAULT_NOTION_API_URL, DEFAULT_NOTION_VERSION};
use margin_core::sync::WorkerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub notion_api_url: String,
    pub notion_version: String,
    pub sync_batch_size: usize,
    pub sync_interval: Duration,
    pub sync_debounce: Duration,
    pub sync_stale_after: Duration,
    pub sync_max_retries: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "MARGIN_API_BIND_ADDR", "127.0.0.1:8080");
        let db_path = PathBuf::from(value_or_default(&lookup, "MARGIN_DB_PATH", "margin.db"));

        let notion_api_url = value_or_default(&lookup, "NOTION_API_URL", DEFAULT_NOTION_API_URL)
            .trim_end_matches('/')
            .to_string();
        if !margin_core::util::is_http_url(&notion_api_url) {
            return Err(ConfigError::Invalid(
                "NOTION_API_URL must start with http:// or https://".to_string(),
            ));
        }
        let notion_version = value_or_default(&lookup, "NOTION_VERSION", DEFAULT_NOTION_VERSION);

        let sync_batch_size = ranged(&lookup, "SYNC_BATCH_SIZE", 10, 1, 100)?;
        let sync_interval_secs = ranged(&lookup, "SYNC_INTERVAL_SECS", 60, 5, 3_600)?;
        let sync_debounce_ms = ranged(&lookup, "SYNC_DEBOUNCE_MS", 2_000, 0, 60_000)?;
        let sync_stale_after_secs = ranged(&lookup, "SYNC_STALE_AFTER_SECS", 120, 30, 3_600)?;
        let sync_max_retries = ranged(&lookup, "SYNC_MAX_RETRIES", 5, 1, 20)?;

        Ok(Self {
            bind_addr,
            db_path,
            notion_api_url,
            notion_version,
            sync_batch_size: usize::try_from(sync_batch_size)
                .map_err(|_| ConfigError::Invalid("SYNC_BATCH_SIZE is too large".to_string()))?,
            sync_interval: Duration::from_secs(sync_interval_secs),
            sync_debounce: Duration::from_millis(sync_debounce_ms),
            sync_stale_after: Duration::from_secs(sync_stale_after_secs),
            sync_max_retries: u32::try_from(sync_max_retries)
                .map_err(|_| ConfigError::Invalid("SYNC_MAX_RETRIES is too large".to_string()))?,
        })
    }

    pub fn notion(&self) -> NotionConfig {
        NotionConfig {
            api_url: self.notion_api_url.clone(),
            version: self.notion_version.clone(),
            ..NotionConfig::default()
        }
    }

    pub const fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            batch_size: self.sync_batch_size,
            stale_after: self.sync_stale_after,
        }
    }
}

/// Parse an integer variable, falling back to `default`, and enforce `[min, max]`.
fn ranged(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
        })?,
        None => default,
    };
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
