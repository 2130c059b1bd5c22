//! Error types for the fan-out daemon.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Result type for coach-daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("coaching engine error: {0}")]
    Coach(#[from] coach_core::CoachError),

    #[error("ingest transport error: {0}")]
    IngestDisconnect(String),

    #[error("subscriber lagged, closing connection")]
    SubscriberLag,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    InvalidConfig(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<r2d2::Error> for DaemonError {
    fn from(err: r2d2::Error) -> Self {
        DaemonError::InvalidConfig(format!("connection pool: {err}"))
    }
}

/// Maps a `DaemonError` to an HTTP status + JSON body for the plain HTTP
/// endpoints (`/health`, `/status`, `/train`).
pub struct AppError(pub DaemonError);

impl From<DaemonError> for AppError {
    fn from(err: DaemonError) -> Self {
        AppError(err)
    }
}

impl From<coach_core::CoachError> for AppError {
    fn from(err: coach_core::CoachError) -> Self {
        AppError(DaemonError::Coach(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DaemonError::NotFound(_) => StatusCode::NOT_FOUND,
            DaemonError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
