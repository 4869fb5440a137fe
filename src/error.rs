//! Error taxonomy shared by the registries, the query layer and the dispatcher.
//!
//! Every failure a request can hit ends up as an [`ApiError`]. Classified errors
//! (400/404, or a 4xx chosen by a hook) reach the client verbatim; everything else
//! is reported as a generic "Unexpected error" and only the logs carry the detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Message returned to clients for every unclassified failure.
pub const UNEXPECTED_ERROR: &str = "Unexpected error";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A lifecycle event name outside the closed set. Programmer error.
    #[error("invalid event value \"{0}\"")]
    InvalidEvent(String),

    /// Startup-time schema inconsistency. Prevents the service from becoming ready.
    #[error("{0}")]
    Schema(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    /// Failure carrying an explicit status, usually raised by a hook.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Status { status, .. } => *status,
            ApiError::InvalidEvent(_)
            | ApiError::Schema(_)
            | ApiError::Internal(_)
            | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the error already carries a client-facing status and message.
    pub fn is_classified(&self) -> bool {
        match self {
            ApiError::BadRequest(_) | ApiError::NotFound(_) => true,
            ApiError::Status { status, .. } => status.is_client_error(),
            _ => false,
        }
    }

    /// The message a client is allowed to see.
    pub fn client_message(&self) -> String {
        if self.is_classified() {
            self.to_string()
        } else {
            UNEXPECTED_ERROR.to_string()
        }
    }
}

/// Error response body
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        let code = if err.is_classified() {
            err.status_code()
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            code: code.as_u16(),
            message: err.client_message(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
