//! HTTP API for the onboarding assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Welcome message |
//! | `GET`  | `/health` | Status, version, readiness and indexed chunk count |
//! | `POST` | `/indexing` | Index `{"urls": [...]}` and make it the active retriever |
//! | `POST` | `/chat` | Answer `{"query", "user_id", "session_id"?}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_ready", "message": "retriever has not been initialised" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_ready` (503), `runtime_error` (500),
//! `internal` (500), `timeout` (504).
//!
//! # CORS
//!
//! Only the origins in `[server].allowed_origins` are permitted; `"*"`
//! allows any origin.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::app::App;
use crate::error::{ErrorKind, RagError};

const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run cold-start indexing, start history pruning, then serve on
/// `[server].bind` until the process exits.
pub async fn run_server(app: Arc<App>) -> anyhow::Result<()> {
    match app.cold_start().await {
        Ok(Some(report)) => tracing::info!(
            documents = report.documents,
            chunks_added = report.added,
            "cold start complete"
        ),
        Ok(None) => {}
        Err(e) => tracing::error!(error = %e, "cold start indexing failed"),
    }

    if app.config().memory.retention_days.is_some() {
        spawn_retention_task(app.clone());
    }

    let bind_addr = app.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    serve(listener, app).await
}

/// Serve the API on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: Arc<App>) -> Router {
    let cors = cors_layer(&app.config().server.allowed_origins);
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/indexing", post(handle_indexing))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(app)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let values: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

fn spawn_retention_task(app: Arc<App>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = app.prune_history().await {
                tracing::warn!(error = %e, "chat history pruning failed");
            }
        }
    });
}

fn request_timeout(app: &App) -> Duration {
    Duration::from_secs(app.config().server.request_timeout_secs)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match (&err, err.kind()) {
            (RagError::Timeout(_), _) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            (_, ErrorKind::BadInput) => (StatusCode::BAD_REQUEST, "bad_request"),
            (_, ErrorKind::NotReady) => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
            (_, ErrorKind::Runtime) => (StatusCode::INTERNAL_SERVER_ERROR, "runtime_error"),
            (_, ErrorKind::Unexpected) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
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

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: rejection.body_text(),
        }
    }
}

// ============ GET / ============

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to BotBhaiya".to_string(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ready: bool,
    chunks: Option<i64>,
}

async fn handle_health(State(app): State<Arc<App>>) -> Result<Json<HealthResponse>, AppError> {
    let chunks = app.indexed_chunks().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ready: chunks.is_some(),
        chunks,
    }))
}

// ============ POST /indexing ============

#[derive(Deserialize)]
struct IndexRequest {
    urls: Vec<String>,
}

#[derive(Serialize)]
struct IndexResponse {
    message: String,
    documents: usize,
    chunks_added: usize,
    chunks_skipped: usize,
    failed_sources: Vec<String>,
}

async fn handle_indexing(
    State(app): State<Arc<App>>,
    payload: Result<Json<IndexRequest>, JsonRejection>,
) -> Result<Json<IndexResponse>, AppError> {
    let Json(request) = payload?;
    if request.urls.is_empty() {
        return Err(RagError::InvalidInput("no URL(s) provided for indexing".into()).into());
    }
    tracing::info!(sources = request.urls.len(), "indexing requested");

    let deadline = request_timeout(&app);
    let report = tokio::time::timeout(deadline, app.index_sources(&request.urls))
        .await
        .map_err(|_| RagError::Timeout(deadline))??;

    Ok(Json(IndexResponse {
        message: "Documents indexed successfully and retriever updated.".to_string(),
        documents: report.documents,
        chunks_added: report.added,
        chunks_skipped: report.skipped,
        failed_sources: report.failures.into_iter().map(|f| f.source).collect(),
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    user_id: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<String>,
    session_id: String,
}

async fn handle_chat(
    State(app): State<Arc<App>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload?;

    let deadline = request_timeout(&app);
    let (answer, key) = tokio::time::timeout(
        deadline,
        app.chat(&request.query, &request.user_id, request.session_id),
    )
    .await
    .map_err(|_| RagError::Timeout(deadline))??;

    Ok(Json(ChatResponse {
        answer: answer.answer,
        sources: answer.sources.into_iter().collect(),
        session_id: key.session_id,
    }))
}
