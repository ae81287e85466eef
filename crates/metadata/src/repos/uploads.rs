//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, PartStats, RecordedPart, UploadSessionRow, UploadedPartRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload session operations.
#[async_trait]
pub trait UploadSessionRepo: Send + Sync {
    /// Create a new upload session.
    async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()>;

    /// Get an upload session by ID.
    async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Get one persisted part.
    async fn get_part(
        &self,
        session_id: Uuid,
        part_number: i32,
    ) -> MetadataResult<Option<UploadedPartRow>>;

    /// List persisted parts ordered by part number.
    async fn list_parts(&self, session_id: Uuid) -> MetadataResult<Vec<UploadedPartRow>>;

    /// Count and sum the persisted parts of a session.
    async fn part_stats(&self, session_id: Uuid) -> MetadataResult<PartStats>;

    /// Persist a part in one transaction.
    ///
    /// Fails with `SessionClosed` if the session is terminal and with
    /// `PartBudgetExceeded` if the byte sum would pass `total_size`. If a row
    /// for the part number already exists it is returned unchanged with
    /// `inserted = false`. The first inserted part moves an `initiated`
    /// session to `in_progress`.
    async fn record_part(
        &self,
        part: &UploadedPartRow,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<RecordedPart>;

    /// Compare-and-swap the status of a non-terminal session.
    ///
    /// Returns true if the session was at `expected_version` and moved to
    /// `status` with `version + 1`; false if the swap lost.
    async fn transition_status(
        &self,
        session_id: Uuid,
        expected_version: i64,
        status: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Mark a session completed and catalog its file in one transaction.
    ///
    /// Same swap semantics as [`transition_status`](Self::transition_status);
    /// the file row is only written when the swap wins.
    async fn complete_session(
        &self,
        session_id: Uuid,
        expected_version: i64,
        file: &FileRow,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Get non-terminal sessions whose lifetime ended before `now`.
    async fn get_expired_sessions(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Sum of declared sizes of non-terminal sessions, grouped by owner.
    async fn active_reservations(&self) -> MetadataResult<Vec<(String, u64)>>;

    /// Count non-terminal sessions.
    async fn count_active_sessions(&self) -> MetadataResult<u64>;

    /// Move a session's expiry.
    async fn set_expires_at(
        &self,
        session_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Delete a session and its parts.
    async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()>;
}
