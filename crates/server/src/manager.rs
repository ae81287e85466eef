//! Upload session orchestration.
//!
//! Drives one multipart upload per session against the object store while the
//! metadata store holds the authoritative session state. Every status change
//! is a version compare-and-swap; whoever wins a transition owns its side
//! effects, including releasing the quota reservation exactly once.

use crate::catalog::FileCatalog;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::quota::{Admission, QuotaLedger};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::instrument;
use vault_core::config::UploadConfig;
use vault_core::upload::{
    CompleteUploadResponse, InitiateUploadRequest, InitiateUploadResponse, UploadPartResponse,
    UploadStatusResponse, UploadedPartInfo, missing_part_numbers, plan_part_count,
};
use vault_core::{OwnerId, SessionId, UploadStatus, object_key_for};
use vault_metadata::models::{UploadSessionRow, UploadedPartRow};
use vault_metadata::repos::{FileRepo, UploadSessionRepo};
use vault_metadata::{MetadataError, MetadataStore};
use vault_storage::{CompletedPartRef, MultipartGateway, ORIGINAL_FILENAME_METADATA};

/// Maximum length of a client-supplied file name.
const MAX_FILE_NAME_LEN: usize = 1024;

/// Result of driving a session through the abort path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    /// This call moved the session to `aborted`.
    Aborted,
    /// The session was already aborted; nothing changed.
    AlreadyAborted,
}

pub struct UploadSessionManager {
    metadata: Arc<dyn MetadataStore>,
    gateway: Arc<dyn MultipartGateway>,
    ledger: Arc<QuotaLedger>,
    config: UploadConfig,
    max_part_bytes: u64,
}

impl UploadSessionManager {
    /// `max_part_bytes` is the largest part body the HTTP surface accepts.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        gateway: Arc<dyn MultipartGateway>,
        ledger: Arc<QuotaLedger>,
        config: UploadConfig,
        max_part_bytes: u64,
    ) -> Self {
        Self {
            metadata,
            gateway,
            ledger,
            config,
            max_part_bytes,
        }
    }

    /// Open a session: admit against the quota, open the remote upload, persist.
    ///
    /// Any failure after admission unwinds the reservation, and the remote
    /// upload when one was opened.
    #[instrument(skip_all, fields(owner = %owner, total_size = req.total_size))]
    pub async fn initiate(
        &self,
        owner: &OwnerId,
        req: InitiateUploadRequest,
    ) -> ApiResult<InitiateUploadResponse> {
        validate_initiate(&req)?;
        let total_parts = plan_part_count(
            req.total_size,
            self.config.part_size,
            self.max_part_bytes,
            req.total_parts,
            self.config.max_parts,
        )?;
        let total_size = i64::try_from(req.total_size)
            .map_err(|_| ApiError::BadRequest("total_size is too large".to_string()))?;

        if let Admission::Rejected {
            used,
            reserved,
            requested,
            limit,
        } = self.ledger.reserve(owner, req.total_size).await?
        {
            return Err(ApiError::QuotaExceeded {
                used,
                reserved,
                requested,
                limit,
            });
        }

        let object_key = object_key_for(owner, &req.file_name);
        let remote_metadata = HashMap::from([(
            ORIGINAL_FILENAME_METADATA.to_string(),
            header_safe(&req.file_name),
        )]);

        let remote_upload_id = match self
            .gateway
            .create_multipart_upload(&object_key, &req.content_type, &remote_metadata)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.ledger.release(owner, req.total_size);
                metrics::record_upload_error("remote_initiate");
                return Err(e.into());
            }
        };

        let now = OffsetDateTime::now_utc();
        let session = UploadSessionRow {
            session_id: *SessionId::new().as_uuid(),
            owner_id: owner.to_string(),
            remote_upload_id,
            object_key,
            file_name: req.file_name,
            content_type: req.content_type,
            total_size,
            part_size: self.config.part_size as i64,
            total_parts: total_parts as i32,
            status: UploadStatus::Initiated.as_str().to_string(),
            version: 0,
            encrypted_key: req.encrypted_key,
            iv: req.iv,
            created_at: now,
            updated_at: now,
            expires_at: now + self.config.session_ttl(),
        };

        if let Err(e) = self.metadata.create_session(&session).await {
            self.ledger.release(owner, req.total_size);
            metrics::record_upload_error("persist_session");
            if let Err(abort_err) = self
                .gateway
                .abort_multipart_upload(&session.object_key, &session.remote_upload_id)
                .await
            {
                tracing::warn!(
                    object_key = %session.object_key,
                    error = %abort_err,
                    "Failed to abort remote upload after session persist failure"
                );
            }
            return Err(e.into());
        }

        metrics::UPLOAD_SESSIONS_CREATED.inc();
        tracing::info!(
            session_id = %session.session_id,
            total_parts,
            "Upload session initiated"
        );

        Ok(InitiateUploadResponse {
            upload_id: session.remote_upload_id,
            session_id: session.session_id.to_string(),
            part_size: self.config.part_size,
            total_parts,
            expires_at: session.expires_at,
        })
    }

    /// Store one part. Re-sending an already persisted part returns its
    /// recorded etag without touching the object store.
    #[instrument(skip_all, fields(owner = %owner, session_id = %session_id, part_number = part_number, size = data.len()))]
    pub async fn upload_part(
        &self,
        owner: &OwnerId,
        session_id: SessionId,
        part_number: u32,
        data: Bytes,
    ) -> ApiResult<UploadPartResponse> {
        let start = Instant::now();
        let session = self.load_owned(owner, session_id).await?;

        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(ApiError::UploadExpired);
        }
        let status = session.status()?;
        if status.is_terminal() {
            return Err(ApiError::InvalidState(format!("upload is {status}")));
        }
        if part_number == 0 || part_number > session.total_parts as u32 {
            return Err(ApiError::InvalidPart(format!(
                "part number {part_number} outside 1..={}",
                session.total_parts
            )));
        }
        if data.is_empty() {
            return Err(ApiError::BadRequest("part body is empty".to_string()));
        }

        if let Some(existing) = self
            .metadata
            .get_part(session.session_id, part_number as i32)
            .await?
        {
            metrics::PARTS_REPLAYED.inc();
            return Ok(part_response(&existing));
        }

        let size = data.len() as u64;
        let stats = self.metadata.part_stats(session.session_id).await?;
        let total_size = session.total_size as u64;
        if stats.bytes.saturating_add(size) > total_size {
            return Err(ApiError::InvalidPart(format!(
                "part of {size} bytes would exceed declared total {total_size} ({} already stored)",
                stats.bytes
            )));
        }

        let etag = self
            .gateway
            .upload_part(
                &session.object_key,
                &session.remote_upload_id,
                part_number,
                data,
            )
            .await
            .inspect_err(|_| metrics::record_upload_error("remote_upload_part"))?;

        let now = OffsetDateTime::now_utc();
        let row = UploadedPartRow {
            session_id: session.session_id,
            part_number: part_number as i32,
            etag,
            size_bytes: size as i64,
            created_at: now,
        };

        let recorded = match self.metadata.record_part(&row, now).await {
            Ok(recorded) => recorded,
            Err(MetadataError::SessionClosed(status)) => {
                return Err(ApiError::InvalidState(format!("upload is {status}")));
            }
            Err(MetadataError::PartBudgetExceeded {
                total_size,
                attempted,
            }) => {
                return Err(ApiError::InvalidPart(format!(
                    "{attempted} bytes would exceed declared total {total_size}"
                )));
            }
            Err(e) => {
                metrics::record_upload_error("persist_part");
                return Err(e.into());
            }
        };

        if recorded.inserted {
            metrics::PARTS_UPLOADED.inc();
            metrics::BYTES_UPLOADED.inc_by(size);
            metrics::PART_UPLOAD_DURATION.observe(start.elapsed().as_secs_f64());
        } else {
            // Lost a race with a concurrent upload of the same part; its row stands.
            metrics::PARTS_REPLAYED.inc();
        }

        Ok(part_response(&recorded.part))
    }

    /// Finalize the remote upload and catalog the file.
    #[instrument(skip_all, fields(owner = %owner, session_id = %session_id))]
    pub async fn complete_upload(
        &self,
        owner: &OwnerId,
        session_id: SessionId,
    ) -> ApiResult<CompleteUploadResponse> {
        let start = Instant::now();
        let session = self.load_owned(owner, session_id).await?;

        match session.status()? {
            UploadStatus::Completed => return self.completed_response(&session).await,
            UploadStatus::Aborted => {
                return Err(ApiError::InvalidState("upload is aborted".to_string()));
            }
            UploadStatus::Initiated | UploadStatus::InProgress => {}
        }
        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(ApiError::UploadExpired);
        }

        let parts = self.metadata.list_parts(session.session_id).await?;
        let expected = session.total_parts as u64;
        if parts.len() as u64 != expected {
            return Err(ApiError::MissingParts {
                uploaded: parts.len() as u64,
                expected,
            });
        }

        let ordered: Vec<CompletedPartRef> = parts
            .iter()
            .map(|p| CompletedPartRef {
                part_number: p.part_number as u32,
                etag: p.etag.clone(),
            })
            .collect();
        if let Err(e) = self
            .gateway
            .complete_multipart_upload(&session.object_key, &session.remote_upload_id, &ordered)
            .await
        {
            // A concurrent complete may have finished the remote upload first.
            if let Ok(current) = self.reload(&session).await
                && current.status()? == UploadStatus::Completed
            {
                return self.completed_response(&current).await;
            }
            metrics::record_upload_error("remote_complete");
            return Err(e.into());
        }

        let now = OffsetDateTime::now_utc();
        let size_bytes: i64 = parts.iter().map(|p| p.size_bytes).sum();
        let file = FileCatalog::entry_for(&session, size_bytes, now);

        let won = self
            .metadata
            .complete_session(session.session_id, session.version, &file, now)
            .await?;

        if !won {
            let current = self.reload(&session).await?;
            return match current.status()? {
                UploadStatus::Completed => self.completed_response(&current).await,
                UploadStatus::Aborted => {
                    // The abort found no open upload to cancel; the object we
                    // just assembled belongs to nobody.
                    self.discard_orphan(&session).await;
                    Err(ApiError::InvalidState("upload is aborted".to_string()))
                }
                _ => Err(ApiError::Conflict(
                    "session changed while completing, retry".to_string(),
                )),
            };
        }

        self.ledger.release(owner, session.total_size as u64);
        metrics::UPLOAD_SESSIONS_COMPLETED.inc();
        metrics::UPLOAD_COMPLETE_DURATION.observe(start.elapsed().as_secs_f64());
        tracing::info!(
            file_id = %file.file_id,
            size_bytes,
            "Upload completed"
        );

        Ok(CompleteUploadResponse {
            session_id: session.session_id.to_string(),
            status: UploadStatus::Completed,
            file: Some(FileCatalog::to_response(&file)),
        })
    }

    /// Cancel a session on behalf of its owner. Expiry is not checked, so an
    /// owner can always clean up.
    #[instrument(skip_all, fields(owner = %owner, session_id = %session_id))]
    pub async fn abort_upload(&self, owner: &OwnerId, session_id: SessionId) -> ApiResult<()> {
        let session = self.load_owned(owner, session_id).await?;
        self.abort_session(&session).await.map(|_| ())
    }

    /// Drive a loaded session through the abort path without an ownership check.
    ///
    /// The expiry reaper calls this directly.
    pub async fn abort_session(&self, session: &UploadSessionRow) -> ApiResult<AbortOutcome> {
        match session.status()? {
            UploadStatus::Aborted => return Ok(AbortOutcome::AlreadyAborted),
            UploadStatus::Completed => {
                return Err(ApiError::InvalidState("upload is completed".to_string()));
            }
            UploadStatus::Initiated | UploadStatus::InProgress => {}
        }

        let won = self
            .metadata
            .transition_status(
                session.session_id,
                session.version,
                UploadStatus::Aborted.as_str(),
                OffsetDateTime::now_utc(),
            )
            .await?;

        if !won {
            let current = self.reload(session).await?;
            return match current.status()? {
                UploadStatus::Aborted => Ok(AbortOutcome::AlreadyAborted),
                UploadStatus::Completed => {
                    Err(ApiError::InvalidState("upload is completed".to_string()))
                }
                _ => Err(ApiError::Conflict(
                    "session changed while aborting, retry".to_string(),
                )),
            };
        }

        // The transition is durable; give the quota back before the remote call.
        match OwnerId::new(session.owner_id.as_str()) {
            Ok(owner) => self.ledger.release(&owner, session.total_size as u64),
            Err(e) => tracing::warn!(
                session_id = %session.session_id,
                error = %e,
                "Aborted session has an unusable owner id, reservation not released"
            ),
        }
        metrics::UPLOAD_SESSIONS_ABORTED.inc();

        if let Err(e) = self
            .gateway
            .abort_multipart_upload(&session.object_key, &session.remote_upload_id)
            .await
        {
            metrics::record_upload_error("remote_abort");
            tracing::warn!(
                session_id = %session.session_id,
                object_key = %session.object_key,
                error = %e,
                "Failed to abort remote upload, store lifecycle rules will reclaim it"
            );
        }

        tracing::info!(session_id = %session.session_id, "Upload aborted");
        Ok(AbortOutcome::Aborted)
    }

    /// Progress report used by clients to resume after a disconnect.
    #[instrument(skip_all, fields(owner = %owner, session_id = %session_id))]
    pub async fn get_status(
        &self,
        owner: &OwnerId,
        session_id: SessionId,
    ) -> ApiResult<UploadStatusResponse> {
        let session = self.load_owned(owner, session_id).await?;
        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return Err(ApiError::UploadExpired);
        }

        let parts = self.metadata.list_parts(session.session_id).await?;
        let present: Vec<u32> = parts.iter().map(|p| p.part_number as u32).collect();
        let total_parts = session.total_parts as u32;

        Ok(UploadStatusResponse {
            upload_id: session.remote_upload_id.clone(),
            session_id: session.session_id.to_string(),
            status: session.status()?,
            file_name: session.file_name.clone(),
            part_size: session.part_size as u64,
            total_parts,
            total_size: session.total_size as u64,
            uploaded_bytes: parts.iter().map(|p| p.size_bytes as u64).sum(),
            missing_parts: missing_part_numbers(total_parts, &present),
            uploaded_parts: parts
                .iter()
                .map(|p| UploadedPartInfo {
                    part_number: p.part_number as u32,
                    size: p.size_bytes as u64,
                    etag: p.etag.clone(),
                    created_at: p.created_at,
                })
                .collect(),
            expires_at: session.expires_at,
        })
    }

    /// Rebuild in-memory reservations from every live session.
    ///
    /// Returns the total number of bytes restored.
    pub async fn recover_reservations(&self) -> ApiResult<u64> {
        let mut restored = 0u64;
        for (owner_id, bytes) in self.metadata.active_reservations().await? {
            match OwnerId::new(owner_id.as_str()) {
                Ok(owner) => {
                    self.ledger.restore(&owner, bytes);
                    restored = restored.saturating_add(bytes);
                }
                Err(e) => tracing::warn!(
                    owner_id = %owner_id,
                    error = %e,
                    "Skipping reservation with an unusable owner id"
                ),
            }
        }
        Ok(restored)
    }

    // Missing and foreign sessions are indistinguishable to the caller.
    async fn load_owned(
        &self,
        owner: &OwnerId,
        session_id: SessionId,
    ) -> ApiResult<UploadSessionRow> {
        match self.metadata.get_session(*session_id.as_uuid()).await? {
            Some(session) if session.owner_id == owner.as_str() => Ok(session),
            _ => Err(ApiError::NotFound(format!("upload {session_id}"))),
        }
    }

    async fn reload(&self, session: &UploadSessionRow) -> ApiResult<UploadSessionRow> {
        self.metadata
            .get_session(session.session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("upload {}", session.session_id)))
    }

    // Best effort: a failure leaves the object to store lifecycle rules.
    async fn discard_orphan(&self, session: &UploadSessionRow) {
        match self.gateway.delete(&session.object_key).await {
            Ok(()) => tracing::info!(
                session_id = %session.session_id,
                object_key = %session.object_key,
                "Removed object assembled for an aborted upload"
            ),
            Err(e) => {
                metrics::record_upload_error("orphan_cleanup");
                tracing::warn!(
                    session_id = %session.session_id,
                    object_key = %session.object_key,
                    error = %e,
                    "Failed to remove object assembled for an aborted upload"
                );
            }
        }
    }

    // A completed session whose file was since deleted answers without one.
    async fn completed_response(
        &self,
        session: &UploadSessionRow,
    ) -> ApiResult<CompleteUploadResponse> {
        let file = self
            .metadata
            .get_file_by_session(session.session_id)
            .await?;
        if file.is_none() {
            tracing::debug!(
                session_id = %session.session_id,
                "Completed upload has no catalog entry, file was deleted"
            );
        }
        Ok(CompleteUploadResponse {
            session_id: session.session_id.to_string(),
            status: UploadStatus::Completed,
            file: file.as_ref().map(FileCatalog::to_response),
        })
    }
}

fn validate_initiate(req: &InitiateUploadRequest) -> ApiResult<()> {
    if req.file_name.trim().is_empty() {
        return Err(ApiError::BadRequest("file_name is required".to_string()));
    }
    if req.file_name.len() > MAX_FILE_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "file_name must be at most {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if req.content_type.trim().is_empty() {
        return Err(ApiError::BadRequest("content_type is required".to_string()));
    }
    if req.total_size == 0 {
        return Err(ApiError::BadRequest(
            "total_size must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Object metadata values travel as HTTP headers; keep them printable ASCII.
fn header_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

fn part_response(part: &UploadedPartRow) -> UploadPartResponse {
    UploadPartResponse {
        part_number: part.part_number as u32,
        etag: part.etag.clone(),
        size: part.size_bytes as u64,
    }
}
