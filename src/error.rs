use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Domain-level failures raised by services and the room engine.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("no active round")]
    NoRound,
    #[error("operation not valid for this game type")]
    WrongMode,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ServiceError {
    /// Short machine-readable tag carried in WebSocket ack errors.
    pub fn tag(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "input",
            ServiceError::Permission(_) => "permission",
            ServiceError::NoRound => "no-round",
            ServiceError::WrongMode => "wrong-mode",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::Upstream(_) => "upstream",
            ServiceError::Unavailable(_) | ServiceError::Degraded => "unavailable",
            ServiceError::Unauthorized(_) => "unauthorized",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

/// HTTP-facing failures for the REST surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Permission(message) => AppError::Unauthorized(message),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::NoRound => AppError::Conflict("no active round".into()),
            ServiceError::WrongMode => {
                AppError::Conflict("operation not valid for this game type".into())
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Upstream(message) => AppError::Internal(message),
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
