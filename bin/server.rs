// Fee Ledger - Web Server
// REST API over the ingestion pipeline with Axum

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use fee_ledger::{
    get_page, init_tracing, setup_database, source_totals, summary, type_counts, AppConfig,
    Collection, Ingestor, Page, SaveResult, Summary, UploadedFile,
};

const MAX_PAGE_SIZE: u32 = 100;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    ingestor: Arc<Ingestor>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db.lock().map_err(|_| ApiError::LockPoisoned)
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::LockPoisoned | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{:#}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "OK", "version": fee_ledger::VERSION }))
}

/// POST /api/:collection/upload - Replace a collection with uploaded files
async fn upload(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        // Plain form fields carry no file name and are not uploads
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        files.push(UploadedFile::new(filename, content.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("no files in upload".to_string()));
    }

    let mut conn = state.conn()?;
    let outcome = state.ingestor.upload(&mut conn, collection, &files)?;

    Ok(Json(json!({ "rows": outcome.rows })))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<u32>,
    page_size: Option<u32>,
}

/// GET /api/:collection/transactions?page=1&page_size=20
async fn list_transactions(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page>> {
    let page = params.page.unwrap_or(1);
    let page_size = params.page_size.unwrap_or(20);

    if page < 1 {
        return Err(ApiError::BadRequest("page must be at least 1".to_string()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::BadRequest(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let conn = state.conn()?;
    Ok(Json(get_page(&conn, collection, page, page_size)?))
}

/// POST /api/:collection/transactions - Save edited rows
async fn save_transactions(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<SaveResult>> {
    let mut conn = state.conn()?;
    Ok(Json(state.ingestor.save(&mut conn, collection, &payload)?))
}

/// GET /api/:collection/summary
async fn get_summary(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
) -> ApiResult<Json<Summary>> {
    let conn = state.conn()?;
    Ok(Json(summary(&conn, collection)?))
}

/// GET /api/:collection/types - Row count per transaction type
async fn get_types(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
) -> ApiResult<impl IntoResponse> {
    let conn = state.conn()?;
    Ok(Json(type_counts(&conn, collection)?))
}

/// GET /api/:collection/sources - Summed amount per source file
async fn get_sources(
    State(state): State<AppState>,
    Path(collection): Path<Collection>,
) -> ApiResult<impl IntoResponse> {
    let conn = state.conn()?;
    Ok(Json(source_totals(&conn, collection)?))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("fee_ledger=info,fee_ledger_server=info,tower_http=debug");

    let config = AppConfig::from_env()?;
    let conn = Connection::open(&config.database_path)?;
    setup_database(&conn)?;

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        ingestor: Arc::new(Ingestor::new(config.alias_table()?)),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/:collection/upload", post(upload))
        .route(
            "/:collection/transactions",
            get(list_transactions).post(save_transactions),
        )
        .route("/:collection/summary", get(get_summary))
        .route("/:collection/types", get(get_types))
        .route("/:collection/sources", get(get_sources))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        database = %config.database_path.display(),
        "🚀 Server running on http://{}",
        address
    );

    axum::serve(listener, app).await?;
    Ok(())
}
