use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use margin_core::models::{Highlight, HighlightId, SyncEntry};
use margin_core::services::{open_database, EnqueueOutcome, HighlightService};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

/// Database location and acting user shared by every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub db_path: PathBuf,
    pub user: String,
}

impl CommandContext {
    pub fn new(db_path: PathBuf, user: &str) -> Result<Self, CliError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(CliError::Config("--user cannot be empty".to_string()));
        }
        Ok(Self {
            db_path,
            user: user.to_string(),
        })
    }

    pub async fn service(&self) -> Result<HighlightService, CliError> {
        Ok(HighlightService::new(open_database(&self.db_path).await?))
    }
}

#[derive(Debug, Serialize)]
pub struct HighlightListItem {
    pub id: String,
    pub preview: String,
    pub text: String,
    pub source: Option<String>,
    pub author: Option<String>,
    pub is_archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct SyncEntryItem {
    pub id: String,
    pub operation: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub preview: String,
    pub error_message: Option<String>,
    pub next_retry_at: Option<i64>,
    pub created_at: i64,
}

/// Accepts a full ID or a unique prefix of one.
pub async fn resolve_highlight(
    query: &str,
    service: &HighlightService,
    user_id: &str,
) -> Result<Highlight, CliError> {
    const PAGE_SIZE: usize = 500;

    if let Ok(id) = query.parse::<HighlightId>() {
        if let Some(highlight) = service.get(user_id, &id).await? {
            return Ok(highlight);
        }
    }

    let needle = query.to_ascii_lowercase();
    let mut matches = Vec::new();
    let mut offset = 0usize;
    loop {
        let batch = service.list(user_id, true, PAGE_SIZE, offset).await?;
        let count = batch.len();
        matches.extend(
            batch
                .into_iter()
                .filter(|highlight| highlight.id.as_str().starts_with(&needle)),
        );
        if count < PAGE_SIZE || matches.len() > 1 {
            break;
        }
        offset += count;
    }

    match matches.len() {
        0 => Err(CliError::HighlightNotFound(query.to_string())),
        1 => Ok(matches.remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|highlight| short_id(&highlight.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousHighlightId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn format_highlight_lines(highlights: &[Highlight]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    highlights
        .iter()
        .map(|highlight| {
            let short_id = short_id(&highlight.id.as_str());
            let preview = text_preview(&highlight.text, 40);
            let relative_time = format_relative_time(highlight.updated_at, now_ms);
            let marker = if highlight.is_archived { "  [archived]" } else { "" };
            format!("{short_id:<13}  {preview:<40}  {relative_time}{marker}")
        })
        .collect()
}

pub fn highlight_to_list_item(highlight: &Highlight) -> HighlightListItem {
    let now_ms = Utc::now().timestamp_millis();
    HighlightListItem {
        id: highlight.id.to_string(),
        preview: text_preview(&highlight.text, 80),
        text: highlight.text.clone(),
        source: highlight.source.clone(),
        author: highlight.author.clone(),
        is_archived: highlight.is_archived,
        created_at: highlight.created_at,
        updated_at: highlight.updated_at,
        relative_time: format_relative_time(highlight.updated_at, now_ms),
    }
}

pub fn sync_entry_to_item(entry: &SyncEntry) -> SyncEntryItem {
    SyncEntryItem {
        id: entry.id.to_string(),
        operation: entry.operation.to_string(),
        status: entry.status.to_string(),
        retry_count: entry.retry_count,
        max_retries: entry.max_retries,
        preview: text_preview(&entry.payload.text, 80),
        error_message: entry.error_message.clone(),
        next_retry_at: entry.next_retry_at,
        created_at: entry.created_at,
    }
}

pub fn format_sync_entry_lines(entries: &[SyncEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let mut line = format!(
                "{}  {:<6}  {:<10}  tries={}/{}  {}",
                short_id(&entry.id.as_str()),
                entry.operation,
                entry.status,
                entry.retry_count,
                entry.max_retries,
                text_preview(&entry.payload.text, 32),
            );
            if let Some(error) = &entry.error_message {
                line.push_str("  error=");
                line.push_str(error);
            }
            line
        })
        .collect()
}

/// One-line summary of what happened to an edit's sync request.
pub fn describe_sync(outcome: &EnqueueOutcome) -> String {
    match outcome {
        EnqueueOutcome::Queued(entry_id) => format!("queued for Notion ({})", short_id(&entry_id.as_str())),
        EnqueueOutcome::NotConfigured => "Notion not connected".to_string(),
        EnqueueOutcome::Unchanged => "Notion copy unchanged".to_string(),
        EnqueueOutcome::Failed => "could not queue Notion sync; see logs".to_string(),
    }
}

pub fn text_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_highlight_text(text_parts: &[String]) -> Result<String, CliError> {
    if let Some(text) = normalize_content(&text_parts.join(" ")) {
        return Ok(text);
    }

    if let Some(text) = read_piped_stdin()? {
        return Ok(text);
    }

    if let Some(text) = capture_editor_input_with_initial("")? {
        return Ok(text);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_highlight_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyHighlightId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_highlight_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_highlight_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("margin-highlight-{}-{now}.txt", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("MARGIN_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("margin").join("margin.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
