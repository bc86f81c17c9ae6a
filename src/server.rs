//! JSON HTTP server over the answer pipeline and the update subsystem.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answer` | Answer a question, with provenance |
//! | `POST` | `/sync` | Run a knowledge-base synchronization |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `service_unavailable` (503),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::config::Config;
use crate::index::IndexManager;
use crate::orchestrator::Orchestrator;
use crate::update::{UpdateReport, Updater};

/// Shared application state passed to all route handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    manager: Arc<IndexManager>,
    orchestrator: Arc<Orchestrator>,
    updater: Arc<Updater>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let config = Arc::new(config.clone());

    let manager = Arc::new(IndexManager::from_config(&config)?);
    let orchestrator = Arc::new(Orchestrator::from_config(&config, manager.clone())?);
    let state = AppState {
        config,
        manager,
        orchestrator,
        updater: Arc::new(Updater::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/answer", post(handle_answer))
        .route("/sync", post(handle_sync))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Server listening on http://{}", bind_addr);

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

/// Internal error type that converts into an Axum HTTP response.
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

fn service_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "service_unavailable".to_string(),
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

/// Maps pipeline errors onto the HTTP error contract. Remote service
/// exhaustion is a 503 so callers can distinguish "retry later" from a bug.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("unavailable") {
        service_unavailable(msg)
    } else {
        internal(msg)
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

// ============ POST /answer ============

#[derive(Deserialize)]
struct AnswerRequest {
    question: String,
}

#[derive(Serialize)]
struct AnswerResponse {
    answer: String,
    source: String,
}

/// Handler for `POST /answer`.
///
/// Runs the full pipeline: retrieval, grounded generation, confidence gate,
/// web fallback. The `source` field discloses where the answer came from.
async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let answer = state
        .orchestrator
        .answer(req.question.trim())
        .await
        .map_err(|e| {
            error!(error = %e, "answer pipeline failed");
            classify_error(e)
        })?;

    Ok(Json(AnswerResponse {
        answer: answer.text,
        source: answer.source.as_str().to_string(),
    }))
}

// ============ POST /sync ============

#[derive(Deserialize, Default)]
struct SyncRequest {
    #[serde(default)]
    force: bool,
}

/// Handler for `POST /sync`.
///
/// Runs a synchronization against the configured archive. Concurrent
/// requests serialize behind the updater's lock rather than racing.
async fn handle_sync(
    State(state): State<AppState>,
    req: Option<Json<SyncRequest>>,
) -> Result<Json<UpdateReport>, AppError> {
    let force = req.map(|Json(r)| r.force).unwrap_or(false);

    let report = state
        .updater
        .run(&state.config, &state.manager, force)
        .await
        .map_err(|e| {
            error!(error = %e, "synchronization failed");
            classify_error(e)
        })?;

    Ok(Json(report))
}
