// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deploy_console_core::ConfigError;
use serde::Serialize;
use thiserror::Error;

use crate::jobs::JobError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::Job(job_err) => {
                let (status, error_msg) = match job_err {
                    JobError::AlreadyRunning => {
                        tracing::info!("Deployment already running");
                        (StatusCode::CONFLICT, "Deployment already running")
                    }
                    JobError::UnknownKind(kind) => {
                        tracing::warn!(kind = %kind, "Unknown job kind");
                        (StatusCode::BAD_REQUEST, "Unknown job kind")
                    }
                    JobError::Spawn { program, source } => {
                        tracing::error!(program = %program, error = %source, "Spawn failure");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start deployment")
                    }
                    JobError::LogIo { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "Log IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "Deployment log error")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, job_err.to_string()))
            }
            ApiError::Config(config_err) => {
                let (status, error_msg) = match config_err {
                    ConfigError::InvalidParam { .. } | ConfigError::InvalidHost { .. } => {
                        tracing::warn!(error = %config_err, "Invalid config");
                        (StatusCode::BAD_REQUEST, "Invalid configuration")
                    }
                    ConfigError::PermissionDenied { path } => {
                        tracing::error!(path = %path.display(), "Permission denied");
                        (StatusCode::FORBIDDEN, "Permission denied")
                    }
                    ConfigError::Io { path, source } => {
                        tracing::error!(path = %path.display(), error = %source, "IO error");
                        (StatusCode::INTERNAL_SERVER_ERROR, "IO error accessing config file")
                    }
                };
                (status, ErrorResponse::with_details(error_msg, config_err.to_string()))
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("Conflict", msg.clone()),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
