//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Inserting the part would push the persisted byte sum past the declared size.
    #[error("part budget exceeded: {attempted} bytes would exceed declared total {total_size}")]
    PartBudgetExceeded { total_size: u64, attempted: u64 },

    /// The session reached a terminal status before the write landed.
    #[error("session closed: status is {0}")]
    SessionClosed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
