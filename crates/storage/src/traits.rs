//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// Highest part number accepted by S3-compatible multipart protocols.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// User metadata key carrying the client's original file name.
pub const ORIGINAL_FILENAME_METADATA: &str = "original-filename";

/// A part handed to [`MultipartGateway::complete_multipart_upload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPartRef {
    pub part_number: u32,
    pub etag: String,
}

/// Multipart object store abstraction.
///
/// Keys are relative to the backend's configured root or prefix. Every method
/// may be called concurrently; implementations keep no per-upload local state
/// beyond what the backend itself stores.
#[async_trait]
pub trait MultipartGateway: Send + Sync + 'static {
    /// Open a multipart upload for `key` and return the backend's upload id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<String>;

    /// Upload one part and return its etag.
    ///
    /// Re-uploading a part number replaces the earlier data.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String>;

    /// Assemble the object from `parts`, which must be ordered by part number.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> StorageResult<()>;

    /// Discard an upload and its parts.
    ///
    /// An unknown or already aborted upload is not an error.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    /// Get an object's size without fetching content.
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    /// List objects under a prefix.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>>;

    /// Delete an object. Returns `NotFound` if it does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the name of this storage backend.
    ///
    /// Returns a static string identifier for the backend type (e.g., "s3", "filesystem").
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify storage backend connectivity.
    ///
    /// Called during server startup so the process fails fast on a
    /// misconfigured backend.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// One entry of a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// Lowercase hex encoding of a digest.
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
