//! Metadata store test utilities.

use std::sync::Arc;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use vault_metadata::models::{FileRow, UploadSessionRow, UploadedPartRow};
use vault_metadata::{MetadataResult, MetadataStore, SqliteStore};

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new SQLite store in a temporary directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db")).await?;

        Ok(Self {
            store: Arc::new(store),
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

/// An `initiated` session row for `owner` declaring `total_size` over `total_parts`.
#[allow(dead_code)]
pub fn session_row(owner: &str, total_size: i64, total_parts: i32) -> UploadSessionRow {
    let now = OffsetDateTime::now_utc();
    let session_id = Uuid::new_v4();
    UploadSessionRow {
        session_id,
        owner_id: owner.to_string(),
        remote_upload_id: format!("remote-{session_id}"),
        object_key: format!("users/{owner}/{session_id}.bin"),
        file_name: "payload.bin".to_string(),
        content_type: "application/octet-stream".to_string(),
        total_size,
        part_size: 5 * 1024 * 1024,
        total_parts,
        status: "initiated".to_string(),
        version: 0,
        encrypted_key: Some("wrapped-key".to_string()),
        iv: Some("iv".to_string()),
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::days(7),
    }
}

/// A part row for `session_id`.
#[allow(dead_code)]
pub fn part_row(session_id: Uuid, part_number: i32, size_bytes: i64) -> UploadedPartRow {
    UploadedPartRow {
        session_id,
        part_number,
        etag: format!("etag-{part_number}"),
        size_bytes,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// The catalog row a completion of `session` would write.
#[allow(dead_code)]
pub fn file_row(session: &UploadSessionRow) -> FileRow {
    FileRow {
        file_id: Uuid::new_v4(),
        owner_id: session.owner_id.clone(),
        session_id: Some(session.session_id),
        object_key: session.object_key.clone(),
        original_filename: session.file_name.clone(),
        size_bytes: session.total_size,
        content_type: session.content_type.clone(),
        encrypted_key: session.encrypted_key.clone(),
        iv: session.iv.clone(),
        algorithm: "AES/GCM/NoPadding".to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}
