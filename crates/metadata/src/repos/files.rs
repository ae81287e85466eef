//! File catalog repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for catalogued files.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Get a file by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// Get the file produced by an upload session.
    async fn get_file_by_session(&self, session_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// Delete a file row. Returns false if it did not exist.
    async fn delete_file(&self, file_id: Uuid) -> MetadataResult<bool>;

    /// Total catalogued bytes for an owner.
    async fn total_usage(&self, owner_id: &str) -> MetadataResult<u64>;
}
