//! HTTP-facing error type.
//!
//! Client errors carry their message to the caller in the shape
//!
//! ```json
//! { "error": { "code": "forbidden", "message": "User not in this project" } }
//! ```
//!
//! Upstream failures (database, GitHub, embedding or model calls) answer
//! 500 with a fixed message and are logged in full.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0:#}")]
    Upstream(anyhow::Error),
}

/// Unwraps a `ServiceError` carried inside an `anyhow::Error`, so library
/// code returning `anyhow::Result` can still signal a client error.
impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service_err) => service_err,
            Err(other) => ServiceError::Upstream(other),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Upstream(err.into())
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Upstream(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Upstream(err) => {
                tracing::error!("Internal error: {:#}", err);
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_roundtrip_keeps_variant() {
        let err: anyhow::Error = ServiceError::NotFound("Project docs donot exist".into()).into();
        let back = ServiceError::from(err);
        assert_eq!(back.status(), StatusCode::NOT_FOUND);
        assert_eq!(back.to_string(), "Project docs donot exist");
    }

    #[test]
    fn test_plain_anyhow_is_upstream() {
        let back = ServiceError::from(anyhow::anyhow!("connection refused"));
        assert_eq!(back.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(back.code(), "internal");
    }
}
