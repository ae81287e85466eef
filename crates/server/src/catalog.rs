//! File catalog: the durable record of completed uploads.

use crate::error::{ApiError, ApiResult};
use crate::quota::QuotaLedger;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;
use vault_core::file::{FileEntryResponse, UsageResponse};
use vault_core::{ENCRYPTION_ALGORITHM, FileId, OwnerId};
use vault_metadata::MetadataStore;
use vault_metadata::models::{FileRow, UploadSessionRow};
use vault_metadata::repos::FileRepo;
use vault_storage::{MultipartGateway, StorageError};

pub struct FileCatalog {
    metadata: Arc<dyn MetadataStore>,
    gateway: Arc<dyn MultipartGateway>,
    ledger: Arc<QuotaLedger>,
}

impl FileCatalog {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        gateway: Arc<dyn MultipartGateway>,
        ledger: Arc<QuotaLedger>,
    ) -> Self {
        Self {
            metadata,
            gateway,
            ledger,
        }
    }

    /// Build the catalog entry written alongside a session's completion.
    pub fn entry_for(session: &UploadSessionRow, size_bytes: i64, now: OffsetDateTime) -> FileRow {
        FileRow {
            file_id: Uuid::new_v4(),
            owner_id: session.owner_id.clone(),
            session_id: Some(session.session_id),
            object_key: session.object_key.clone(),
            original_filename: session.file_name.clone(),
            size_bytes,
            content_type: session.content_type.clone(),
            encrypted_key: session.encrypted_key.clone(),
            iv: session.iv.clone(),
            algorithm: ENCRYPTION_ALGORITHM.to_string(),
            created_at: now,
        }
    }

    pub fn to_response(row: &FileRow) -> FileEntryResponse {
        FileEntryResponse {
            file_id: row.file_id.to_string(),
            original_filename: row.original_filename.clone(),
            size: row.size_bytes.max(0) as u64,
            content_type: row.content_type.clone(),
            encrypted_key: row.encrypted_key.clone(),
            iv: row.iv.clone(),
            algorithm: row.algorithm.clone(),
            created_at: row.created_at,
        }
    }

    // Someone else's file is reported exactly like a missing one.
    async fn load_owned(&self, owner: &OwnerId, file_id: FileId) -> ApiResult<FileRow> {
        match self.metadata.get_file(*file_id.as_uuid()).await? {
            Some(row) if row.owner_id == owner.as_str() => Ok(row),
            _ => Err(ApiError::NotFound(format!("file {file_id}"))),
        }
    }

    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn get(&self, owner: &OwnerId, file_id: FileId) -> ApiResult<FileEntryResponse> {
        let row = self.load_owned(owner, file_id).await?;
        Ok(Self::to_response(&row))
    }

    /// Delete the stored object, then its catalog row.
    ///
    /// An object already gone from the store is not an error, so a delete that
    /// failed after the remote step can simply be retried.
    #[instrument(skip(self), fields(file_id = %file_id))]
    pub async fn delete(&self, owner: &OwnerId, file_id: FileId) -> ApiResult<()> {
        let row = self.load_owned(owner, file_id).await?;

        match self.gateway.delete(&row.object_key).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(
                    object_key = %row.object_key,
                    "Catalogued object missing from store, removing entry"
                );
            }
            Err(e) => return Err(e.into()),
        }

        if !self.metadata.delete_file(row.file_id).await? {
            return Err(ApiError::NotFound(format!("file {file_id}")));
        }

        tracing::info!(
            object_key = %row.object_key,
            size_bytes = row.size_bytes,
            "File deleted"
        );
        Ok(())
    }

    /// Usage report combining durable usage and in-flight reservations.
    #[instrument(skip(self))]
    pub async fn usage(&self, owner: &OwnerId) -> ApiResult<UsageResponse> {
        let used = self.ledger.current_usage(owner).await?;
        let reserved = self.ledger.reserved(owner);
        Ok(UsageResponse::new(owner, used, reserved, self.ledger.limit()))
    }
}
