use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures raised by the memory layer (history store, similarity index).
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("History store error: {0}")]
    History(String),

    #[error("Similarity index error: {0}")]
    Index(String),

    #[error("Embedding error: {0}")]
    Embedding(String),
}

impl From<redis::RedisError> for MemoryError {
    fn from(err: redis::RedisError) -> Self {
        MemoryError::History(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

const GENERIC_FAILURE: &str = "Internal Server Error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Server-side failures are logged in full and answered generically.
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg)
            }
            ApiError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, "Forbidden", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::TooManyRequests(msg) => {
                tracing::warn!("Rate limited: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, "TooManyRequests", "Too many requests".to_string())
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", GENERIC_FAILURE.to_string())
            }
            ApiError::MemoryError(err) => {
                tracing::error!("Memory error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", GENERIC_FAILURE.to_string())
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", GENERIC_FAILURE.to_string())
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", GENERIC_FAILURE.to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
