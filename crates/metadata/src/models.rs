//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;
use vault_core::UploadStatus;

// =============================================================================
// Upload sessions
// =============================================================================

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub session_id: Uuid,
    pub owner_id: String,
    /// Multipart upload id issued by the object store.
    pub remote_upload_id: String,
    pub object_key: String,
    pub file_name: String,
    pub content_type: String,
    pub total_size: i64,
    pub part_size: i64,
    pub total_parts: i32,
    pub status: String,
    /// Bumped by every status change; used as the compare-and-swap token.
    pub version: i64,
    pub encrypted_key: Option<String>,
    pub iv: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl UploadSessionRow {
    /// Parsed session status.
    ///
    /// The schema constrains `status` to known values, so a parse failure
    /// means the row was written by something else.
    pub fn status(&self) -> crate::MetadataResult<UploadStatus> {
        UploadStatus::parse(&self.status).map_err(|e| crate::MetadataError::Internal(e.to_string()))
    }

    /// Check whether the session lifetime has passed at `now`.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// A persisted part of an upload session.
#[derive(Debug, Clone, FromRow)]
pub struct UploadedPartRow {
    pub session_id: Uuid,
    pub part_number: i32,
    pub etag: String,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
}

/// Aggregate of the parts persisted for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartStats {
    pub count: u64,
    pub bytes: u64,
}

/// Outcome of recording a part.
#[derive(Debug, Clone)]
pub struct RecordedPart {
    /// The row now stored for this part number.
    pub part: UploadedPartRow,
    /// False when a row for this part number already existed.
    pub inserted: bool,
}

// =============================================================================
// File catalog
// =============================================================================

/// Catalogued file record, written by a successful completion.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub owner_id: String,
    pub session_id: Option<Uuid>,
    pub object_key: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub encrypted_key: Option<String>,
    pub iv: Option<String>,
    pub algorithm: String,
    pub created_at: OffsetDateTime,
}
