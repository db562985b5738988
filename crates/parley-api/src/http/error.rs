//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use parley_types::error::{CompletionError, RepositoryError, TurnError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// A turn failed inside the core.
    Turn(TurnError),
    /// A read against one of the stores failed.
    Store(RepositoryError),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        AppError::Turn(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Store(e)
    }
}

impl AppError {
    /// Status, error code, and whether the client should retry.
    fn classify(&self) -> (StatusCode, &'static str, bool) {
        match self {
            AppError::Turn(e @ TurnError::Completion(CompletionError::Timeout(_))) => {
                (StatusCode::GATEWAY_TIMEOUT, e.code(), true)
            }
            AppError::Turn(e @ TurnError::Stale(_)) => (StatusCode::CONFLICT, e.code(), false),
            AppError::Turn(e) if e.is_retryable() => (StatusCode::SERVICE_UNAVAILABLE, e.code(), true),
            AppError::Turn(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.code(), false),
            AppError::Store(RepositoryError::Connection) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", true)
            }
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", false),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", false),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", false),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", false),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Turn(e) => e.to_string(),
            AppError::Store(e) => e.to_string(),
            AppError::NotFound(msg) | AppError::Validation(msg) | AppError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = self.classify();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), code, error = %self.message(), "request failed");
        }

        let body = ApiResponse::error(code, &self.message(), uuid::Uuid::now_v7().to_string());
        let mut response = (status, Json(body)).into_response();
        if retryable && status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
