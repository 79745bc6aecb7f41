//! Axum HTTP boundary over [`LoggerService`].
//!
//! The core is synchronous file I/O, so every handler hops onto
//! `spawn_blocking`. Routes:
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST | `/api/session/start` | start a session |
//! | POST | `/api/session/stop` | stop and download the zip |
//! | GET | `/api/config` | device polling |
//! | POST | `/api/ingest` | device batch |
//! | GET | `/api/status` | operator status |
//! | GET | `/api/sessions/:id/archive` | re-download a finished session |
//! | GET | `/health` | liveness |

use crate::error::{AppResult, LoggerError};
use crate::messages::{IngestRequest, StopStatus};
use crate::service::LoggerService;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

const MAX_HTTP_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    service: Arc<LoggerService>,
}

/// Error rendered as `{"status": "error", "error": "..."}`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LoggerError> for ApiError {
    fn from(err: LoggerError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            error!("request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"status": "error", "error": self.message})),
        )
            .into_response()
    }
}

/// Builds the router. Exposed separately from [`serve`] so it can be mounted or tested.
pub fn router(service: Arc<LoggerService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session/start", post(start_session))
        .route("/api/session/stop", post(stop_session))
        .route("/api/config", get(get_config))
        .route("/api/ingest", post(ingest))
        .route("/api/status", get(status))
        .route("/api/sessions/:session_id/archive", get(session_archive))
        .with_state(AppState { service })
        .layer(DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES))
}

/// Runs the HTTP server on its own multi-threaded runtime until it fails.
pub fn serve(service: Arc<LoggerService>, bind_addr: &str, worker_threads: usize) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = bind_addr.to_string();
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;
        info!(%bind_addr, "HTTP server listening");

        axum::serve(listener, router(service))
            .await
            .map_err(|e| format!("axum server failed: {e}"))
    })
}

async fn blocking<T, F>(service: Arc<LoggerService>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&LoggerService) -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("worker panicked: {e}"),
        })?
        .map_err(ApiError::from)
}

fn zip_response(filename: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/zip"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn start_session(State(state): State<AppState>) -> Result<Response, ApiError> {
    let response = blocking(state.service, |svc| svc.start_session()).await?;
    Ok(Json(response).into_response())
}

async fn stop_session(State(state): State<AppState>) -> Result<Response, ApiError> {
    let mut response = blocking(state.service, |svc| svc.stop_session()).await?;
    if let (StopStatus::Stopped, Some(bytes)) = (response.status, response.archive.take()) {
        let filename = response.archive_filename.unwrap_or_default();
        return Ok(zip_response(&filename, bytes));
    }
    Ok(Json(response).into_response())
}

async fn get_config(State(state): State<AppState>) -> Result<Response, ApiError> {
    let response = blocking(state.service, |svc| Ok(svc.get_config())).await?;
    Ok(Json(response).into_response())
}

async fn ingest(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: IngestRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::from(LoggerError::Validation(format!("invalid batch: {e}"))))?;
    let response = blocking(state.service, move |svc| svc.ingest_batch(&request)).await?;
    Ok(Json(response).into_response())
}

async fn status(State(state): State<AppState>) -> Result<Response, ApiError> {
    let response = blocking(state.service, |svc| svc.status()).await?;
    Ok(Json(response).into_response())
}

async fn session_archive(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let filename = crate::data::archive_file_name(&session_id);
    let bytes = blocking(state.service, move |svc| svc.archive_session(&session_id)).await?;
    Ok(zip_response(&filename, bytes))
}
