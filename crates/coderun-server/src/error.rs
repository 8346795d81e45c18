//! Error types for the code runner server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coderun_core::{RunError, SubmissionError};
use serde_json::json;
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Body could not be read as the expected JSON
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Submission rejected before any sandbox was created
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    /// Orchestration failure while running a submission
    #[error(transparent)]
    Run(#[from] RunError),

    /// Server configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a new invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new configuration error.
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convert ServerError to HTTP status code
impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Submission(_) => StatusCode::BAD_REQUEST,
            ServerError::Run(RunError::SandboxUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Run(RunError::Cancelled) => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Run(_) | ServerError::Config(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status, self);
        } else {
            log::warn!("Request rejected with {}: {}", status, self);
        }
        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));
        (status, body).into_response()
    }
}
