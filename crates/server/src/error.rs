//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use vault_metadata::MetadataError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(
        "quota exceeded: {used} used + {reserved} reserved + {requested} requested > {limit} allowed"
    )]
    QuotaExceeded {
        used: u64,
        reserved: u64,
        requested: u64,
        limit: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upload expired")]
    UploadExpired,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid part: {0}")]
    InvalidPart(String),

    #[error("part body exceeds {limit} bytes")]
    PartTooLarge { limit: u64 },

    #[error("missing parts: uploaded {uploaded} of {expected}")]
    MissingParts { uploaded: u64, expected: u64 },

    /// Lost an optimistic version check; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("remote storage error: {0}")]
    Remote(#[from] vault_storage::StorageError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Core(#[from] vault_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::NotFound(_) => "not_found",
            Self::UploadExpired => "upload_expired",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidPart(_) => "invalid_part",
            Self::PartTooLarge { .. } => "part_too_large",
            Self::MissingParts { .. } => "missing_parts",
            Self::Conflict(_) => "conflict",
            Self::Remote(_) => "remote_error",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Internal(_) => "internal_error",
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => "not_found",
                MetadataError::SessionClosed(_) => "invalid_state",
                MetadataError::PartBudgetExceeded { .. } => "invalid_part",
                MetadataError::AlreadyExists(_) => "conflict",
                _ => "metadata_error",
            },
            Self::Core(_) => "bad_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::QuotaExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UploadExpired => StatusCode::GONE,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::InvalidPart(_) => StatusCode::BAD_REQUEST,
            Self::PartTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingParts { .. } => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Remote(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::SessionClosed(_) => StatusCode::CONFLICT,
                MetadataError::PartBudgetExceeded { .. } => StatusCode::BAD_REQUEST,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
