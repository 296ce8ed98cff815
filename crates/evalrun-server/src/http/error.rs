//! Mapping of orchestrator errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use evalrun_core::api::ErrorResponse;
use evalrun_core::SessionId;
use thiserror::Error;
use tracing::error;

use crate::error::{OrchestratorError, StoreError};

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Internal {
        message: String,
        session_id: Option<SessionId>,
    },
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            session_id: None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(format!("Session not found: {id}")),
            StoreError::Core(e) => Self::BadRequest(e.to_string()),
            other => {
                error!(error = %other, "Storage error");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Invalid(e) => Self::BadRequest(e.to_string()),
            OrchestratorError::Store(e) => e.into(),
            OrchestratorError::Launch { session_id, source } => Self::Internal {
                message: format!("Failed to start evaluation: {source}"),
                session_id: Some(session_id),
            },
            OrchestratorError::NotRunning(id) => {
                Self::NotFound(format!("Session is not running: {id}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Internal {
                message,
                session_id,
            } => ErrorResponse {
                error: message,
                session_id,
            },
            other => ErrorResponse {
                error: other.to_string(),
                session_id: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
