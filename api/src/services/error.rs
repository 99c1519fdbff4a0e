//! Error handling utilities for route handlers

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::dispatch::DispatchError;

/// Errors a handler can return; rendered as `{ "error": message }`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    /// Details are logged at the failure site, never sent to the client
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        if e.is_client_error() {
            return ApiError::BadRequest(e.to_string());
        }
        tracing::error!(error = %e, "Dispatch error");
        ApiError::Internal
    }
}

/// Malformed, mistyped or wrong content-type bodies all surface as 400
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Extension trait for logging errors and converting to ApiError
pub trait LogErr<T> {
    /// Log error with context and return Internal
    fn log_500(self, context: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, ApiError> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{}", context);
            ApiError::Internal
        })
    }
}
