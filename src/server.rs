//! JSON HTTP API over the document pipeline.
//!
//! Registration is asynchronous: `POST /api/documents` records the file,
//! spawns the background pipeline, and returns `202 Accepted`; clients
//! poll `GET /api/documents/{id}` for the outcome.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/api/documents` | Register a file and start processing |
//! | `GET`    | `/api/documents` | List documents (`?status=`, `?limit=`) |
//! | `GET`    | `/api/documents/stats/summary` | Document counts by status |
//! | `GET`    | `/api/documents/{id}` | Fetch one document's metadata |
//! | `GET`    | `/api/documents/{id}/text` | Fetch extracted text |
//! | `DELETE` | `/api/documents/{id}` | Delete document, file, and index entries |
//! | `POST`   | `/api/index/{id}` | Re-chunk and re-embed a document |
//! | `GET`    | `/api/index/{id}` | Inspect a document's chunks |
//! | `DELETE` | `/api/index/{id}` | Drop a document's chunks and embeddings |
//! | `GET`    | `/api/index/stats` | Index-wide counts |
//! | `GET`    | `/api/search` | Semantic search (`?q=`, `?limit=`, `?min_similarity=`) |
//! | `POST`   | `/api/query` | Answer a question with cited sources |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `state_conflict` (409),
//! `insufficient_content` (422), `rate_limited` (429), `upstream_auth` (502),
//! `service_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! clients.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::documents;
use crate::error::Error;
use crate::models::{Answer, DocStatus, Document, DocumentStats, IndexStats, SearchHit};
use crate::pipeline::{self, AppContext};
use crate::query;
use crate::vector_index;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
}

/// Starts the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    info!("API server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/documents", post(handle_create_document))
        .route("/api/documents", get(handle_list_documents))
        .route("/api/documents/stats/summary", get(handle_document_stats))
        .route("/api/documents/{id}", get(handle_get_document))
        .route("/api/documents/{id}", delete(handle_delete_document))
        .route("/api/documents/{id}/text", get(handle_get_text))
        .route("/api/index/{id}", post(handle_reindex))
        .route("/api/index/{id}", get(handle_inspect_index))
        .route("/api/index/{id}", delete(handle_delete_index))
        .route("/api/index/stats", get(handle_index_stats))
        .route("/api/search", get(handle_search))
        .route("/api/query", post(handle_query))
        .layer(cors)
        .with_state(AppState { ctx })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g. `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::StateConflict(_) => (StatusCode::CONFLICT, "state_conflict"),
            Error::InsufficientContent(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_content")
            }
            Error::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            Error::Unauthorized { .. } => (StatusCode::BAD_GATEWAY, "upstream_auth"),
            Error::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            Error::Service { .. } | Error::Persistence(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };

        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Documents ============

/// Document metadata without the (possibly large) extracted text.
#[derive(Serialize)]
struct DocumentView {
    id: i64,
    filename: String,
    original_name: String,
    file_type: Option<String>,
    file_size: Option<i64>,
    extraction_method: Option<String>,
    status: DocStatus,
    error_message: Option<String>,
    created_at: i64,
    updated_at: i64,
    processed_at: Option<i64>,
}

impl From<Document> for DocumentView {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            filename: d.filename,
            original_name: d.original_name,
            file_type: d.file_type,
            file_size: d.file_size,
            extraction_method: d.extraction_method,
            status: d.status,
            error_message: d.error_message,
            created_at: d.created_at,
            updated_at: d.updated_at,
            processed_at: d.processed_at,
        }
    }
}

#[derive(Deserialize)]
struct CreateDocumentRequest {
    /// Path to an existing local file to register.
    file_path: String,
    /// Display name; defaults to the file's basename.
    original_name: Option<String>,
    /// MIME type; inferred from the extension when absent.
    mime_type: Option<String>,
}

#[derive(Serialize)]
struct CreateDocumentResponse {
    id: i64,
    status: DocStatus,
    message: String,
}

/// `POST /api/documents`: register a file and kick off the pipeline.
///
/// Responds `202 Accepted` immediately; processing happens on a
/// background task.
async fn handle_create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreateDocumentResponse>), AppError> {
    let new_doc = documents::register_file(
        &state.ctx.config.storage.upload_dir,
        std::path::Path::new(&req.file_path),
        req.original_name.as_deref(),
        req.mime_type.as_deref(),
    )?;

    let id = documents::create(&state.ctx.pool, &new_doc).await?;
    pipeline::spawn(state.ctx.clone(), id);

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateDocumentResponse {
            id,
            status: DocStatus::Pending,
            message: "document accepted for processing".to_string(),
        }),
    ))
}

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
    limit: Option<i64>,
}

async fn handle_list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<DocumentView>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(DocStatus::parse)
        .transpose()?;

    let docs = documents::list(&state.ctx.pool, status, params.limit).await?;
    Ok(Json(docs.into_iter().map(DocumentView::from).collect()))
}

async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentView>, AppError> {
    let doc = documents::get(&state.ctx.pool, id)
        .await?
        .ok_or_else(|| not_found(format!("document {} not found", id)))?;
    Ok(Json(DocumentView::from(doc)))
}

#[derive(Serialize)]
struct DocumentTextResponse {
    id: i64,
    extraction_method: Option<String>,
    text: String,
}

/// `GET /api/documents/{id}/text`: the extracted text, available once
/// the document has completed processing.
async fn handle_get_text(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DocumentTextResponse>, AppError> {
    let doc = documents::get(&state.ctx.pool, id)
        .await?
        .ok_or_else(|| not_found(format!("document {} not found", id)))?;

    if doc.status != DocStatus::Completed {
        return Err(Error::StateConflict(format!(
            "document {} is {}, text not available",
            id, doc.status
        ))
        .into());
    }

    Ok(Json(DocumentTextResponse {
        id: doc.id,
        extraction_method: doc.extraction_method,
        text: doc.extracted_text.unwrap_or_default(),
    }))
}

async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    documents::delete(&state.ctx.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_document_stats(
    State(state): State<AppState>,
) -> Result<Json<DocumentStats>, AppError> {
    Ok(Json(documents::stats(&state.ctx.pool).await?))
}

// ============ Index ============

#[derive(Serialize)]
struct ReindexResponse {
    id: i64,
    chunks: usize,
    embedded: usize,
}

/// `POST /api/index/{id}`: synchronously re-chunk and re-embed a
/// completed document, replacing its previous index entries.
async fn handle_reindex(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ReindexResponse>, AppError> {
    let summary = pipeline::index_document(&state.ctx, id).await?;
    Ok(Json(ReindexResponse {
        id,
        chunks: summary.chunks,
        embedded: summary.embedded,
    }))
}

#[derive(Serialize)]
struct ChunkPreview {
    chunk_index: i64,
    word_count: i64,
    preview: String,
}

#[derive(Serialize)]
struct InspectIndexResponse {
    id: i64,
    chunk_count: usize,
    chunks: Vec<ChunkPreview>,
}

async fn handle_inspect_index(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<InspectIndexResponse>, AppError> {
    if documents::get(&state.ctx.pool, id).await?.is_none() {
        return Err(not_found(format!("document {} not found", id)));
    }

    let chunks = vector_index::get_document_chunks(&state.ctx.pool, id).await?;
    let previews = chunks
        .iter()
        .map(|c| ChunkPreview {
            chunk_index: c.chunk_index,
            word_count: c.word_count,
            preview: c.chunk_text.chars().take(100).collect(),
        })
        .collect::<Vec<_>>();

    Ok(Json(InspectIndexResponse {
        id,
        chunk_count: previews.len(),
        chunks: previews,
    }))
}

async fn handle_delete_index(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if documents::get(&state.ctx.pool, id).await?.is_none() {
        return Err(not_found(format!("document {} not found", id)));
    }

    vector_index::delete_for_document(&state.ctx.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_index_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, AppError> {
    Ok(Json(vector_index::stats(&state.ctx.pool).await?))
}

// ============ Search and query ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
    min_similarity: Option<f64>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    count: usize,
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let q = params
        .q
        .ok_or_else(|| bad_request("missing query parameter: q"))?;

    let results = query::search(&state.ctx, &q, params.limit, params.min_similarity).await?;
    Ok(Json(SearchResponse {
        query: q,
        count: results.len(),
        results,
    }))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    /// Chunks to retrieve; defaults to the configured answer limit.
    limit: Option<usize>,
    /// Model override for this request.
    model: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError> {
    let answer = query::answer(&state.ctx, &req.query, req.limit, req.model).await?;
    Ok(Json(answer))
}
