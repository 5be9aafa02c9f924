//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::core::ExchangeFailure;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ApiError::PermissionDenied(_) => "PERMISSION_DENIED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match self {
            ApiError::Unauthenticated(msg)
            | ApiError::InvalidArgument(msg)
            | ApiError::PermissionDenied(msg) => msg,
            ApiError::Internal(detail) => {
                // Detail stays in the server log
                error!(detail = %detail, "Internal error while handling request");
                "internal error".to_string()
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<ExchangeFailure> for ApiError {
    fn from(err: ExchangeFailure) -> Self {
        match err {
            ExchangeFailure::Unauthenticated(_) => ApiError::Unauthenticated(err.to_string()),
            ExchangeFailure::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            ExchangeFailure::PermissionDenied { .. } => ApiError::PermissionDenied(err.to_string()),
            ExchangeFailure::Internal(msg) => ApiError::Internal(msg),
        }
    }
}
