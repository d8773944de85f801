use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use margin_core::db::{
    Database, IntegrationRepository, LibSqlIntegrationRepository, LibSqlQueueRepository,
    QueueRepository,
};
use margin_core::models::{
    Highlight, HighlightDraft, HighlightId, NotionIntegration, StatusCounts, SyncEntry, SyncStatus,
};
use margin_core::services::{EnqueueOutcome, HighlightChange, HighlightService};
use margin_core::sync::{ApiFactory, BatchReport, NotionClientFactory, SyncWorker};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::AppError;

pub const USER_HEADER: &str = "x-user-id";

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 500;
const RECENT_ERRORS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    highlights: HighlightService,
    worker: Arc<SyncWorker>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>, db: Arc<Database>, wake: Arc<Notify>) -> Self {
        let factory = Arc::new(NotionClientFactory::new(config.notion()));
        Self::with_factory(config, db, factory, wake)
    }

    pub fn with_factory(
        config: Arc<AppConfig>,
        db: Arc<Database>,
        factory: Arc<dyn ApiFactory>,
        wake: Arc<Notify>,
    ) -> Self {
        let worker = Arc::new(SyncWorker::new(Arc::clone(&db), factory, config.worker()));
        let highlights = HighlightService::new(db)
            .with_max_retries(config.sync_max_retries)
            .with_wake(wake);
        Self {
            config,
            highlights,
            worker,
        }
    }

    pub fn worker(&self) -> Arc<SyncWorker> {
        Arc::clone(&self.worker)
    }

    fn db(&self) -> &Database {
        self.highlights.database()
    }
}

/// Caller identity taken from the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
}

pub fn app_router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/highlights", get(list_highlights).post(create_highlight))
        .route(
            "/highlights/{id}",
            get(get_highlight)
                .patch(update_highlight)
                .delete(delete_highlight),
        )
        .route("/highlights/{id}/archive", post(archive_highlight))
        .route(
            "/integrations/notion",
            get(get_integration)
                .put(put_integration)
                .delete(delete_integration),
        )
        .route("/sync/entries", get(list_entries))
        .route("/sync/retry", post(retry_failed))
        .route_layer(middleware::from_fn(require_user));

    let sync_routes = Router::new()
        .route("/sync/process", post(process_sync))
        .route("/sync/status", get(sync_status));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", user_routes.merge(sync_routes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

fn extract_user_id(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get(USER_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing X-User-Id header"))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized("X-User-Id header is not valid text"))?
        .trim();
    if value.is_empty() {
        return Err(AppError::unauthorized("X-User-Id header is empty"));
    }
    Ok(value.to_string())
}

async fn require_user(mut request: Request, next: Next) -> Result<Response, AppError> {
    let user_id = extract_user_id(request.headers())?;
    request.extensions_mut().insert(CurrentUser { user_id });
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    include_archived: bool,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
}

fn page_size(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

async fn list_highlights(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Highlight>>, AppError> {
    let highlights = state
        .highlights
        .list(
            &user.user_id,
            query.include_archived,
            page_size(query.limit),
            query.offset,
        )
        .await?;
    Ok(Json(highlights))
}

async fn create_highlight(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(draft): Json<HighlightDraft>,
) -> Result<(StatusCode, Json<HighlightChange>), AppError> {
    let change = state.highlights.create(&user.user_id, draft).await?;
    tracing::info!(
        endpoint = "create_highlight",
        highlight_id = %change.highlight.id,
        sync = ?change.sync,
        "Created highlight"
    );
    Ok((StatusCode::CREATED, Json(change)))
}

async fn get_highlight(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<HighlightId>,
) -> Result<Json<Highlight>, AppError> {
    state
        .highlights
        .get(&user.user_id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("highlight {id}")))
}

/// Partial edit; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
struct HighlightPatch {
    text: Option<String>,
    html: Option<String>,
    source: Option<String>,
    author: Option<String>,
}

impl HighlightPatch {
    fn apply(self, existing: Highlight) -> HighlightDraft {
        HighlightDraft {
            text: self.text.unwrap_or(existing.text),
            html: self.html.or(existing.html),
            source: self.source.or(existing.source),
            author: self.author.or(existing.author),
        }
    }
}

async fn update_highlight(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<HighlightId>,
    Json(patch): Json<HighlightPatch>,
) -> Result<Json<HighlightChange>, AppError> {
    let existing = state
        .highlights
        .get(&user.user_id, &id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("highlight {id}")))?;
    let change = state
        .highlights
        .update(&user.user_id, &id, patch.apply(existing))
        .await?;
    tracing::info!(
        endpoint = "update_highlight",
        highlight_id = %id,
        sync = ?change.sync,
        "Updated highlight"
    );
    Ok(Json(change))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    sync: EnqueueOutcome,
}

async fn delete_highlight(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<HighlightId>,
) -> Result<Json<DeleteResponse>, AppError> {
    let sync = state.highlights.delete(&user.user_id, &id).await?;
    tracing::info!(
        endpoint = "delete_highlight",
        highlight_id = %id,
        sync = ?sync,
        "Deleted highlight"
    );
    Ok(Json(DeleteResponse { sync }))
}

#[derive(Debug, Deserialize)]
struct ArchiveRequest {
    archived: bool,
}

async fn archive_highlight(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<HighlightId>,
    Json(request): Json<ArchiveRequest>,
) -> Result<Json<Highlight>, AppError> {
    let highlight = state
        .highlights
        .set_archived(&user.user_id, &id, request.archived)
        .await?;
    Ok(Json(highlight))
}

/// Integration settings as returned to clients; the token never leaves the server.
#[derive(Debug, Serialize)]
struct IntegrationView {
    root_block_id: String,
    created_at: i64,
    updated_at: i64,
}

impl From<NotionIntegration> for IntegrationView {
    fn from(integration: NotionIntegration) -> Self {
        Self {
            root_block_id: integration.root_block_id,
            created_at: integration.created_at,
            updated_at: integration.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    access_token: String,
    root_block_id: String,
}

async fn get_integration(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<IntegrationView>, AppError> {
    LibSqlIntegrationRepository::new(state.db().connection())
        .get(&user.user_id)
        .await?
        .map(|integration| Json(integration.into()))
        .ok_or_else(|| AppError::not_found("Notion integration"))
}

async fn put_integration(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<IntegrationView>, AppError> {
    let integration = LibSqlIntegrationRepository::new(state.db().connection())
        .upsert(&user.user_id, &request.access_token, &request.root_block_id)
        .await?;
    tracing::info!(
        endpoint = "put_integration",
        root_block_id = %integration.root_block_id,
        "Connected Notion integration"
    );
    Ok(Json(integration.into()))
}

#[derive(Debug, Serialize)]
struct DisconnectResponse {
    removed: bool,
}

async fn delete_integration(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<DisconnectResponse>, AppError> {
    let removed = LibSqlIntegrationRepository::new(state.db().connection())
        .delete(&user.user_id)
        .await?;
    Ok(Json(DisconnectResponse { removed }))
}

async fn process_sync(State(state): State<AppState>) -> Result<Json<BatchReport>, AppError> {
    let report = state.worker.process_batch().await?;
    tracing::info!(
        endpoint = "sync_process",
        processed = report.processed,
        failed = report.failed,
        skipped = report.skipped,
        total = report.total,
        "Processed sync batch"
    );
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct EntryError {
    entry_id: String,
    operation: String,
    retry_count: u32,
    error_message: Option<String>,
    updated_at: i64,
}

impl From<SyncEntry> for EntryError {
    fn from(entry: SyncEntry) -> Self {
        Self {
            entry_id: entry.id.as_str(),
            operation: entry.operation.to_string(),
            retry_count: entry.retry_count,
            error_message: entry.error_message,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    counts: StatusCounts,
    total: u64,
    /// The caller's most recent terminal failures; empty without `X-User-Id`
    recent_errors: Vec<EntryError>,
}

/// Queue counts, scoped to the caller when `X-User-Id` is present.
async fn sync_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    let user_id = extract_user_id(&headers).ok();
    let queue = LibSqlQueueRepository::new(state.db().connection());

    let counts = queue.status_counts(user_id.as_deref()).await?;
    let recent_errors = match user_id.as_deref() {
        Some(user_id) => queue
            .list_entries(user_id, Some(SyncStatus::Failed), RECENT_ERRORS)
            .await?
            .into_iter()
            .map(EntryError::from)
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(StatusResponse {
        total: counts.total(),
        counts,
        recent_errors,
    }))
}

#[derive(Debug, Deserialize)]
struct EntriesQuery {
    status: Option<SyncStatus>,
    limit: Option<usize>,
}

async fn list_entries(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<Vec<SyncEntry>>, AppError> {
    let entries = LibSqlQueueRepository::new(state.db().connection())
        .list_entries(&user.user_id, query.status, page_size(query.limit))
        .await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
struct RetryResponse {
    requeued: u64,
}

async fn retry_failed(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<RetryResponse>, AppError> {
    let requeued = LibSqlQueueRepository::new(state.db().connection())
        .requeue_failed(&user.user_id, Utc::now().timestamp_millis())
        .await?;
    if requeued > 0 {
        tracing::info!(endpoint = "sync_retry", requeued, "Requeued failed entries");
    }
    Ok(Json(RetryResponse { requeued }))
}
