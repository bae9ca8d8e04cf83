//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/documents?skip&limit` | List documents (defaults 0 / 100) |
//! | `GET`  | `/documents/{id}` | One document, or `null` |
//! | `POST` | `/documents/refresh` | Sync metadata from the catalog |
//! | `POST` | `/documents/{id}/ask?prompt=` | Submit a question (202) |
//! | `GET`  | `/questions?skip&limit` | List questions |
//! | `GET`  | `/questions/{id}` | One question, or `null` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Every request must carry an `x-api-key` header equal to the configured
//! key; anything else is rejected with 401 before a handler runs.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document 7 not found" } }
//! ```
//!
//! Error codes: `unauthorized` (401), `bad_request` (400), `not_found` (404),
//! `upstream_error` (502), `internal` (500).

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use gtc_qa_core::models::{Document, Question};
use gtc_qa_core::store::Store;

use crate::lifecycle::{LifecycleController, RefreshError, RefreshSummary, SubmitError};

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn Store>,
    controller: Arc<LifecycleController>,
    /// SHA-256 of the expected API key.
    api_key_digest: Arc<[u8; 32]>,
}

impl AppState {
    pub fn new(controller: Arc<LifecycleController>, api_key: &str) -> Self {
        Self {
            store: controller.store().clone(),
            controller,
            api_key_digest: Arc::new(digest(api_key)),
        }
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(value.as_bytes()));
    out
}

/// Build the router with authentication and CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/documents", get(handle_list_documents))
        .route("/documents/refresh", post(handle_refresh))
        .route("/documents/{id}", get(handle_get_document))
        .route("/documents/{id}/ask", post(handle_ask))
        .route("/questions", get(handle_list_questions))
        .route("/questions/{id}", get(handle_get_question))
        .route("/health", get(handle_health))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `bind` until ctrl-c or SIGTERM.
///
/// In-flight requests finish first. Queued questions are drained by the
/// caller through [`LifecycleController::shutdown`].
pub async fn run_server(bind: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "GTC Q&A server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown requested");
}

// ============ Authentication ============

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let matches = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|key| digest(key) == *state.api_key_digest);

    match matches {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "invalid API key");
            Err(unauthorized("Invalid API key"))
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "missing API key");
            Err(unauthorized(format!(
                "API key required. Please include the {} header.",
                API_KEY_HEADER
            )))
        }
    }
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

/// Error type that converts into a JSON error response.
#[derive(Debug)]
pub struct AppError {
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

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    error(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

fn bad_request(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

fn upstream_error(message: impl Into<String>) -> AppError {
    error(StatusCode::BAD_GATEWAY, "upstream_error", message)
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(error = ?e, "request failed");
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            format!("{:#}", e),
        )
    }
}

impl From<RefreshError> for AppError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Catalog(_) => {
                tracing::error!(error = %e, "catalog refresh failed");
                upstream_error(e.to_string())
            }
            RefreshError::Store(e) => e.context("Failed to register catalog documents").into(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        bad_request(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        bad_request(e.body_text())
    }
}

impl From<SubmitError> for AppError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::DocumentNotFound(_) => not_found(e.to_string()),
            SubmitError::EmptyPrompt => bad_request(e.to_string()),
            SubmitError::Other(e) => e.into(),
        }
    }
}

// ============ Handlers ============

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    100
}

impl Pagination {
    fn validate(&self) -> Result<(), AppError> {
        if self.skip < 0 || self.limit < 0 {
            return Err(bad_request("skip and limit must be >= 0"));
        }
        Ok(())
    }
}

async fn handle_list_documents(
    State(state): State<AppState>,
    page: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Vec<Document>>, AppError> {
    let Query(page) = page?;
    page.validate()?;
    Ok(Json(state.store.list_documents(page.skip, page.limit).await?))
}

async fn handle_get_document(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Option<Document>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.store.get_document(id).await?))
}

async fn handle_refresh(
    State(state): State<AppState>,
) -> Result<Json<RefreshSummary>, AppError> {
    Ok(Json(state.controller.refresh_documents().await?))
}

#[derive(Debug, Deserialize)]
struct AskParams {
    #[serde(default)]
    prompt: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    params: Result<Query<AskParams>, QueryRejection>,
) -> Result<(StatusCode, Json<Question>), AppError> {
    let Path(id) = id?;
    let Query(params) = params?;
    let question = state.controller.submit_question(id, &params.prompt).await?;
    Ok((StatusCode::ACCEPTED, Json(question)))
}

async fn handle_list_questions(
    State(state): State<AppState>,
    page: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Vec<Question>>, AppError> {
    let Query(page) = page?;
    page.validate()?;
    Ok(Json(state.store.list_questions(page.skip, page.limit).await?))
}

async fn handle_get_question(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Option<Question>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.store.get_question(id).await?))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
