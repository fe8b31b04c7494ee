use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// ApiError
///
/// The single failure taxonomy for the whole application. Every business-rule
/// failure is surfaced to the caller with a stable `kind` string and a
/// human-readable message; only `Internal` is logged server-side and returned
/// as an opaque generic message.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or out-of-range input. Carries a field-level message.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No session, an expired session, or a session whose user no longer resolves.
    #[error("authentication required")]
    Unauthenticated,

    /// Anti-forgery token missing or mismatched on a state-changing request.
    #[error("anti-forgery token missing or invalid")]
    ForbiddenCsrf,

    /// Role, visibility, or ban denial.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing entity.
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate unique field or duplicate pending request.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Write attempted on a locked thread.
    #[error("thread is locked")]
    Locked,

    /// Unexpected persistence or infrastructure failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable kind string, asserted on by the test suite
    /// and consumed by the frontend error mapper.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::ForbiddenCsrf => "forbidden_csrf",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Locked => "locked",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenCsrf => StatusCode::FORBIDDEN,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Locked => StatusCode::LOCKED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Internal details stay server-side; the client gets a generic line.
            ApiError::Internal(detail) => {
                tracing::error!("internal error: {detail}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": message,
            }
        });

        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // Unique constraint violations reach the API as conflicts
            // (duplicate email/username, duplicate pending request).
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict("duplicate value".to_string())
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

/// A specialized Result type for application logic.
pub type ApiResult<T> = Result<T, ApiError>;
