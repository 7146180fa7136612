//! Error types for web handlers.
//!
//! [`AppError`] turns engine errors into JSON responses with a stable `code`
//! clients can branch on.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use raffle_core::error::{ErrorKind, RaffleError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// 401 Unauthorized
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORIZED")
    }

    /// 500 Internal Server Error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// HTTP status of this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of this error
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// User-facing message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RaffleError> for AppError {
    fn from(err: RaffleError) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ErrorKind::Validation => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ErrorKind::InvalidState => (StatusCode::CONFLICT, "INVALID_STATE"),
            ErrorKind::AlreadyDecided => (StatusCode::CONFLICT, "ALREADY_DECIDED"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "CONFLICT"),
            ErrorKind::NoCapacity => (StatusCode::CONFLICT, "NO_CAPACITY"),
            ErrorKind::Contention => (StatusCode::SERVICE_UNAVAILABLE, "CONTENTION"),
            ErrorKind::Infrastructure => {
                return Self::internal("An internal error occurred")
                    .with_source(anyhow::Error::new(err));
            },
        };
        Self::new(status, err.to_string(), code)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
