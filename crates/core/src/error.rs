//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid owner id: {0}")]
    InvalidOwner(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    #[error("invalid upload status: {0}")]
    InvalidStatus(String),

    #[error("invalid upload request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
