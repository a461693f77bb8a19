//! JSON HTTP surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/search?q=&top_k=&type=&scope=` | Ranked hits with line ranges |
//! | `GET`  | `/chunk/{id}` | One chunk with its document fields |
//! | `POST` | `/answer` | Context, rules or LLM answer with citations |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "q must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `llm_error` (502),
//! `search_unavailable` (500), `internal` (500).
//!
//! All handlers share one connection pool. Handlers only read, so they run
//! concurrently without further coordination; a request served while an
//! index run is in progress may see a document mid-replacement.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::answer::{self, Answer, AnswerMode};
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::models::{ChunkRecord, DocType};
use crate::search::{self, LocatedHit, SearchOptions};
use crate::store;

#[derive(Clone)]
struct AppState {
    pool: SqlitePool,
    config: Arc<Config>,
}

/// Opens the store and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::open(&config.db.path).await?;
    let app = router(pool, config.clone());

    tracing::info!(addr = %bind_addr, db = %config.db.path.display(), "server listening");
    println!("retrofit listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// The application router over an open pool.
pub fn router(pool: SqlitePool, config: Config) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(config),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/chunk/{id}", get(handle_chunk))
        .route("/answer", post(handle_answer))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::ChunkNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Llm(_) => (StatusCode::BAD_GATEWAY, "llm_error"),
            Error::SearchUnavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "search_unavailable"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn parse_doc_type(raw: Option<&str>) -> Result<Option<DocType>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => DocType::from_str(s).map(Some).map_err(bad_request),
    }
}

fn check_top_k(top_k: i64) -> Result<i64, AppError> {
    if top_k < 1 {
        Err(bad_request("top_k must be >= 1"))
    } else {
        Ok(top_k)
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

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    top_k: Option<i64>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    scope: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    query: String,
    hits: Vec<LocatedHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let retrieval = &state.config.retrieval;
    let opts = SearchOptions::new(check_top_k(params.top_k.unwrap_or(retrieval.top_k))?)
        .with_doc_type(parse_doc_type(params.doc_type.as_deref())?)
        .with_scope(params.scope.as_deref())
        .with_snippet_tokens(retrieval.snippet_tokens);

    let hits = search::search(&state.pool, &params.q, &opts).await?;
    let hits = search::locate(&state.pool, hits).await?;
    Ok(Json(SearchResponse {
        query: params.q,
        hits,
    }))
}

// ============ GET /chunk/{id} ============

async fn handle_chunk(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ChunkRecord>, AppError> {
    Ok(Json(store::get_chunk(&state.pool, id).await?))
}

// ============ POST /answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    question: String,
    top_k: Option<i64>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    scope: Option<String>,
    #[serde(default)]
    mode: AnswerMode,
    max_context_chars: Option<usize>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let retrieval = &state.config.retrieval;
    let opts = SearchOptions::new(check_top_k(req.top_k.unwrap_or(retrieval.context_top_k))?)
        .with_doc_type(parse_doc_type(req.doc_type.as_deref())?)
        .with_scope(req.scope.as_deref())
        .with_snippet_tokens(retrieval.snippet_tokens);
    let max_chars = req.max_context_chars.unwrap_or(retrieval.max_context_chars);
    if max_chars == 0 {
        return Err(bad_request("max_context_chars must be > 0"));
    }

    let mut llm = state.config.llm.clone();
    if let Some(model) = req.model {
        llm.model = model;
    }
    if let Some(base_url) = req.base_url {
        llm.base_url = base_url;
    }
    if let Some(timeout) = req.timeout_secs {
        if timeout == 0 {
            return Err(bad_request("timeout_secs must be > 0"));
        }
        llm.timeout_secs = timeout;
    }

    let result = answer::answer(&state.pool, &req.question, req.mode, &opts, max_chars, &llm).await?;
    Ok(Json(result))
}
