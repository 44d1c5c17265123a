use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation blocked: {0}")]
    ValidationBlocked(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Conflicting job: {0}")]
    ConflictingJob(String),

    #[error("Conflicting publish: {0}")]
    ConflictingPublish(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupted geometry: {0}")]
    CorruptedGeometry(String),

    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    #[error("Snapshot failed: {0}")]
    SnapshotFailed(String),

    #[error("Asset write failed: {0}")]
    AssetWriteFailed(String),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ValidationBlocked(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidTransition(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidScope(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidFile(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedFormat(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::CorruptedGeometry(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::UnsupportedCrs(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::LayerNotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::ConflictingJob(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::ConflictingPublish(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::SnapshotFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::AssetWriteFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::IntegrityViolation(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::TimedOut(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Cancelled(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Connection pool error".to_string(),
                )
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "IO error".to_string())
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "JSON parsing error".to_string())
            }
        };

        let code = match &self {
            AppError::NotFound(_) => "NotFound",
            AppError::ValidationBlocked(_) => "ValidationBlocked",
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::InvalidScope(_) => "InvalidScope",
            AppError::InvalidFile(_) => "InvalidFile",
            AppError::UnsupportedFormat(_) => "UnsupportedFormat",
            AppError::CorruptedGeometry(_) => "CorruptedGeometry",
            AppError::UnsupportedCrs(_) => "UnsupportedCRS",
            AppError::LayerNotFound(_) => "LayerNotFound",
            AppError::ConflictingJob(_) => "ConflictingJob",
            AppError::ConflictingPublish(_) => "ConflictingPublish",
            AppError::SnapshotFailed(_) => "SnapshotFailed",
            AppError::AssetWriteFailed(_) => "AssetWriteFailed",
            AppError::IntegrityViolation(_) => "IntegrityViolation",
            AppError::TimedOut(_) => "TimedOut",
            AppError::Cancelled(_) => "Cancelled",
            _ => "Error",
        };

        let body = Json(json!({ "code": code, "detail": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
