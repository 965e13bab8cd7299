//! HTTP service surface.
//!
//! Exposes the retrieval subsystem and the path-resolution engine as a small
//! JSON API consumed by the surrounding tutoring application. Session storage,
//! authentication, and the chat transport to the model live elsewhere; the
//! handlers here are pure functions of their inputs plus the shared
//! process-wide state.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/retrieve` | Ranked passages for a query (+ optional boost) |
//! | `GET`  | `/step/config` | Resolved step configuration for the UI |
//! | `GET`  | `/step/guidance` | Resolved LLM guidance string for a step |
//! | `GET`  | `/rag/status` | Index store status |
//! | `POST` | `/rag/reindex` | Delete artifacts, rebuild, swap |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! `bad_request` (400) covers caller-contract violations — an empty query, a
//! step outside 1-9, an unknown methodology. `internal` (500) covers rebuild
//! failures. Retrieval degradation is never an error.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::index::{IndexStatus, IndexStore};
use crate::paths::PathsConfig;
use crate::resolve::{resolve_step_config, resolve_step_guidance, StepConfig};
use crate::retriever::Retriever;

/// Shared application state, initialized once and read-mostly thereafter.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<PathsConfig>,
    pub store: Arc<IndexStore>,
    pub retriever: Arc<Retriever>,
    pub default_k: usize,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    info!(bind = %config.server.bind, "tutor-harness listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the route table. Public so tests can serve it on an ephemeral port.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/retrieve", post(handle_retrieve))
        .route("/step/config", get(handle_step_config))
        .route("/step/guidance", get(handle_step_guidance))
        .route("/rag/status", get(handle_rag_status))
        .route("/rag/reindex", post(handle_rag_reindex))
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

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
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

// ============ POST /retrieve ============

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    k: Option<usize>,
    boost: Option<String>,
}

#[derive(Serialize)]
struct RetrieveResponse {
    passages: Vec<crate::models::Passage>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = req.k.unwrap_or(state.default_k);
    if k < 1 {
        return Err(bad_request("k must be >= 1"));
    }

    let passages = state
        .retriever
        .retrieve(&req.query, k, req.boost.as_deref())
        .await;
    Ok(Json(RetrieveResponse { passages }))
}

// ============ GET /step/config and /step/guidance ============

#[derive(Deserialize)]
struct StepQuery {
    step: u8,
    path: Option<String>,
    methodology: Option<String>,
}

async fn handle_step_config(
    State(state): State<AppState>,
    Query(q): Query<StepQuery>,
) -> Result<Json<StepConfig>, AppError> {
    let config = resolve_step_config(
        &state.paths,
        q.path.as_deref(),
        q.methodology.as_deref(),
        q.step,
    )
    .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(config))
}

#[derive(Serialize)]
struct GuidanceResponse {
    step: u8,
    guidance: Option<String>,
}

async fn handle_step_guidance(
    State(state): State<AppState>,
    Query(q): Query<StepQuery>,
) -> Result<Json<GuidanceResponse>, AppError> {
    let guidance = resolve_step_guidance(
        &state.paths,
        q.path.as_deref(),
        q.methodology.as_deref(),
        q.step,
    )
    .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(GuidanceResponse {
        step: q.step,
        guidance,
    }))
}

// ============ GET /rag/status and POST /rag/reindex ============

async fn handle_rag_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.store.status().await)
}

#[derive(Serialize)]
struct ReindexResponse {
    ok: bool,
    chunk_count: usize,
}

async fn handle_rag_reindex(
    State(state): State<AppState>,
) -> Result<Json<ReindexResponse>, AppError> {
    let chunk_count = state.store.reindex().await.map_err(|e| {
        let msg = e.to_string();
        if msg.contains("disabled") {
            AppError {
                status: StatusCode::BAD_REQUEST,
                code: "embeddings_disabled".to_string(),
                message: msg,
            }
        } else {
            internal(msg)
        }
    })?;
    state.retriever.invalidate_cache().await;
    Ok(Json(ReindexResponse {
        ok: true,
        chunk_count,
    }))
}
