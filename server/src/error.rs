//! Application error types and result alias.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use metbox_core::{ClipError, StoreError};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Seconds a client should wait before polling a file that is still hashing.
pub const PROCESSING_RETRY_AFTER_SECS: u64 = 5;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad input shape or size
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing, expired, exhausted and never-existing clips alike
    #[error("Not found")]
    NotFound,

    /// File hash not confirmed yet
    #[error("Clip is still processing")]
    Processing,

    #[error("Range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error("Authentication failed")]
    Unauthorized,

    /// Request body over the configured ceiling
    #[error("Payload too large")]
    PayloadTooLarge,

    /// Clip store failure
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ClipError> for AppError {
    fn from(e: ClipError) -> Self {
        match e {
            ClipError::Validation(v) => AppError::Validation(v.to_string()),
            ClipError::NotFound => AppError::NotFound,
            ClipError::Processing => AppError::Processing,
            ClipError::RangeNotSatisfiable { size } => AppError::RangeNotSatisfiable { size },
            ClipError::Storage(s) => AppError::Storage(s),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "request body too large".to_string(),
            ),
            AppError::NotFound => {
                return (StatusCode::NOT_FOUND, "Not found").into_response();
            }
            AppError::Processing => {
                let mut response = (
                    StatusCode::from_u16(425).unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                    Json(json!({ "error": "processing" })),
                )
                    .into_response();
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(PROCESSING_RETRY_AFTER_SECS),
                );
                return response;
            }
            AppError::RangeNotSatisfiable { size } => {
                let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                return response;
            }
            AppError::Unauthorized => {
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "unauthorized" })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                return response;
            }
            AppError::Config(_)
            | AppError::Storage(_)
            | AppError::Io(_)
            | AppError::Internal(_) => {
                tracing::error!(error = %self, "Request error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
