//! Error types for web handlers.
//!
//! [`AppError`] turns a [`ServiceError`] into an HTTP response. The body is
//! always `{ "code", "message" }`. Server errors carry a generic message and
//! log the detail instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fulfillment_core::ServiceError;
use serde::Serialize;
use std::fmt;

const GENERIC_INTERNAL: &str = "An internal error occurred";

/// Response category, fixing both the status and the machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409
    Conflict,
    /// 422
    Validation,
    /// 500
    Internal,
    /// 503
    Unavailable,
}

impl ErrorKind {
    /// HTTP status for this kind.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Code clients switch on.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Validation => "VALIDATION_ERROR",
            Self::Internal => "INTERNAL_SERVER_ERROR",
            Self::Unavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Error returned by every handler.
///
/// # Examples
///
/// ```ignore
/// async fn handler(CallerIdentity(caller): CallerIdentity) -> Result<Json<OrderDetail>, AppError> {
///     Ok(Json(engine.get(&caller, id).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    kind: ErrorKind,
    /// Shown to the client
    message: String,
    /// Logged, never shown
    detail: Option<String>,
}

impl AppError {
    /// Error of `kind` with a client-facing `message`.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// 401 for a missing or unreadable identity.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// 500 that hides `detail` from the client.
    #[must_use]
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: GENERIC_INTERNAL.to_string(),
            detail: Some(detail.to_string()),
        }
    }

    /// Response category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for AppError {}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(
                status = %status,
                code = self.kind.code(),
                detail = self.detail.as_deref().unwrap_or(&self.message),
                "Request failed"
            );
        }

        let body = ErrorBody {
            code: self.kind.code(),
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => Self::new(ErrorKind::Validation, message),
            ServiceError::Unauthorized(message) => Self::new(ErrorKind::Unauthorized, message),
            ServiceError::Forbidden(message) => Self::new(ErrorKind::Forbidden, message),
            ServiceError::Conflict(message) => Self::new(ErrorKind::Conflict, message),
            not_found @ ServiceError::NotFound { .. } => {
                Self::new(ErrorKind::NotFound, not_found.to_string())
            },
            ServiceError::Unavailable(message) => Self::new(ErrorKind::Unavailable, message),
            ServiceError::Internal(detail) => Self::internal(detail),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}
