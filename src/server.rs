//! HTTP gateway.
//!
//! A JSON API playing the chat-gateway collaborator role: connectors
//! (Discord, Telegram, web widgets) POST questions here and render the
//! reply according to its `mode`. Admin endpoints cover ingestion, clear,
//! and stats.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/tenants/{tenant}/ask` | Answer a question for a tenant |
//! | `POST` | `/tenants/{tenant}/documents` | Ingest a document (full replace per source) |
//! | `DELETE` | `/tenants/{tenant}/documents` | Clear the tenant's corpus |
//! | `GET` | `/stats` | Per-tenant corpus counters |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). Question-path
//! failures are not HTTP errors: they come back as a normal reply with
//! `mode = "error"`, since the connector still has to say something.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::answer::Engine;
use crate::models::Reply;

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Start the gateway HTTP server. Runs until the process is terminated.
pub async fn run_server(engine: Arc<Engine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();
    let state = AppState { engine };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tenants/{tenant}/ask", post(handle_ask))
        .route(
            "/tenants/{tenant}/documents",
            post(handle_ingest).delete(handle_clear),
        )
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("gateway listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
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

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

// ============ POST /tenants/{tenant}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    user_id: String,
    question: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Reply>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }

    let reply = state.engine.ask(&tenant, &req.user_id, &req.question).await;
    Ok(Json(reply))
}

// ============ POST /tenants/{tenant}/documents ============

#[derive(Deserialize)]
struct IngestRequest {
    /// Origin label for the text: a file name, URL, or "pasted-text".
    source: String,
    text: String,
}

#[derive(Serialize)]
struct IngestResponse {
    document_id: String,
    chunks_written: usize,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    if req.source.trim().is_empty() {
        return Err(bad_request("source must not be empty"));
    }
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let report = state
        .engine
        .ingest_text(&tenant, &req.source, &req.text)
        .await
        .map_err(internal)?;

    Ok(Json(IngestResponse {
        document_id: report.document_id,
        chunks_written: report.chunks_written,
    }))
}

// ============ DELETE /tenants/{tenant}/documents ============

#[derive(Serialize)]
struct ClearResponse {
    status: String,
}

async fn handle_clear(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    state.engine.clear_tenant(&tenant).await.map_err(internal)?;
    Ok(Json(ClearResponse {
        status: "cleared".to_string(),
    }))
}

// ============ GET /stats ============

#[derive(Serialize)]
struct TenantStatsBody {
    tenant_id: String,
    documents: i64,
    chunks: i64,
    embedded_chunks: i64,
}

#[derive(Serialize)]
struct StatsResponse {
    tenants: Vec<TenantStatsBody>,
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.engine.stats().await.map_err(internal)?;
    Ok(Json(StatsResponse {
        tenants: stats
            .into_iter()
            .map(|s| TenantStatsBody {
                tenant_id: s.tenant_id,
                documents: s.documents,
                chunks: s.chunks,
                embedded_chunks: s.embedded_chunks,
            })
            .collect(),
    }))
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
