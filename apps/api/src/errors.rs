use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::matching::MatchError;
use crate::profile::ProfileError;
use crate::store::StoreError;
use crate::tasks::{TaskError, TaskKind};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("A {0} task is already running; try again later")]
    AlreadyRunning(TaskKind),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported file format: {0}. Allowed: PDF, DOCX, TXT")]
    UnsupportedFormat(String),

    #[error("Could not extract text from document: {0}")]
    ExtractionFailed(String),

    #[error("No CV uploaded. Please upload your CV first.")]
    NoProfile,

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::AlreadyRunning(kind) => AppError::AlreadyRunning(kind),
            TaskError::NotFound(id) => AppError::NotFound(format!("Task {id} not found")),
        }
    }
}

impl From<ProfileError> for AppError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::UnsupportedFormat(ext) => AppError::UnsupportedFormat(ext),
            ProfileError::ExtractionFailed(reason) => AppError::ExtractionFailed(reason),
        }
    }
}

impl From<MatchError> for AppError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NoProfile => AppError::NoProfile,
            MatchError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::AlreadyRunning(_) => (StatusCode::CONFLICT, "ALREADY_RUNNING"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_FORMAT")
            }
            AppError::ExtractionFailed(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_FAILED")
            }
            AppError::NoProfile => (StatusCode::BAD_REQUEST, "NO_PROFILE"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self {
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                "A storage error occurred".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}
