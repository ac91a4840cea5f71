//! services/api/src/error.rs
//!
//! Defines the error types of the API service: `ApiError` for startup and
//! `HttpError`, the HTTP rendering of a failed pipeline operation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use study_assistant_core::{ports::PortError, StudyError};
use tracing::error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// The JSON body of every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// A failed request, ready to be rendered.
#[derive(Debug)]
pub struct HttpError(pub StudyError);

impl From<StudyError> for HttpError {
    fn from(error: StudyError) -> Self {
        Self(error)
    }
}

impl HttpError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(StudyError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            StudyError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            StudyError::Validation(_) | StudyError::Quality(_) | StudyError::Unreadable => {
                StatusCode::BAD_REQUEST
            }
            StudyError::NotFound(_) => StatusCode::NOT_FOUND,
            StudyError::Conflict(_) => StatusCode::CONFLICT,
            StudyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            StudyError::MalformedOutput(_) | StudyError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let body = match &self.0 {
            StudyError::QuotaExceeded { feature, tier, limit } => json!({
                "error": self.0.to_string(),
                "kind": self.0.kind(),
                "feature": feature,
                "tier": tier,
                "limit": limit,
            }),
            other => json!({
                "error": other.to_string(),
                "kind": other.kind(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
