//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session status.
///
/// `Initiated -> InProgress -> {Completed, Aborted}`. An `Initiated` session
/// may also be aborted directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Remote upload opened, no part persisted yet.
    Initiated,
    /// At least one part persisted.
    InProgress,
    /// Remote upload finalized and catalogued.
    Completed,
    /// Session cancelled by its owner or by the expiry sweep.
    Aborted,
}

impl UploadStatus {
    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "aborted" => Ok(Self::Aborted),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }

    /// Check if the session can still receive parts.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initiated | Self::InProgress)
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the number of parts for an upload.
///
/// A client-declared count wins; otherwise the count is derived from the
/// fixed part size. Either way the result lies in `1..=max_parts`, never
/// exceeds `total_size` (every part carries at least one byte) and is large
/// enough that no part has to exceed `max_part_bytes`.
pub fn plan_part_count(
    total_size: u64,
    part_size: u64,
    max_part_bytes: u64,
    declared: Option<u32>,
    max_parts: u32,
) -> crate::Result<u32> {
    if total_size == 0 {
        return Err(crate::Error::InvalidRequest(
            "total_size must be greater than zero".to_string(),
        ));
    }
    if part_size == 0 || max_part_bytes == 0 {
        return Err(crate::Error::InvalidRequest(
            "part sizes must be greater than zero".to_string(),
        ));
    }

    let parts = match declared {
        Some(declared) => u64::from(declared),
        None => total_size.div_ceil(part_size),
    };

    if parts == 0 {
        return Err(crate::Error::InvalidRequest(
            "total_parts must be at least 1".to_string(),
        ));
    }
    if parts > u64::from(max_parts) {
        return Err(crate::Error::InvalidRequest(format!(
            "upload needs {parts} parts, maximum is {max_parts}"
        )));
    }
    if parts > total_size {
        return Err(crate::Error::InvalidRequest(format!(
            "total_parts {parts} exceeds total_size {total_size}"
        )));
    }
    let fewest = total_size.div_ceil(max_part_bytes);
    if parts < fewest {
        return Err(crate::Error::InvalidRequest(format!(
            "total_parts {parts} is too few for {total_size} bytes, \
             at least {fewest} parts of at most {max_part_bytes} bytes are needed"
        )));
    }

    Ok(parts as u32)
}

/// Request to initiate a chunked upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitiateUploadRequest {
    /// Original file name, used for the object key extension.
    pub file_name: String,
    /// Total size of the encrypted payload in bytes.
    pub total_size: u64,
    /// Content type recorded on the object.
    pub content_type: String,
    /// Client-wrapped data key. Opaque to the server.
    #[serde(default)]
    pub encrypted_key: Option<String>,
    /// Client IV. Opaque to the server.
    #[serde(default)]
    pub iv: Option<String>,
    /// Client-declared part count (derived from the part size when absent).
    #[serde(default)]
    pub total_parts: Option<u32>,
}

/// Response from initiating an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitiateUploadResponse {
    /// Remote multipart upload ID.
    pub upload_id: String,
    /// Local session ID used for every follow-up call.
    pub session_id: String,
    /// Size of every part except the last.
    pub part_size: u64,
    /// Number of parts the client must send.
    pub total_parts: u32,
    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Response from uploading one part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadPartResponse {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

/// A durably recorded part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadedPartInfo {
    pub part_number: u32,
    pub size: u64,
    pub etag: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Response from querying upload status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub session_id: String,
    pub status: UploadStatus,
    pub file_name: String,
    pub part_size: u64,
    pub total_parts: u32,
    pub total_size: u64,
    /// Sum of the sizes of all persisted parts.
    pub uploaded_bytes: u64,
    /// Persisted parts, ordered by part number.
    pub uploaded_parts: Vec<UploadedPartInfo>,
    /// Part numbers still to be sent, for resuming after a disconnect.
    pub missing_parts: Vec<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Response from completing an upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    pub session_id: String,
    pub status: UploadStatus,
    /// The catalogued file. Absent when the owner deleted the file after
    /// completing; repeating `complete` still succeeds as a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<crate::file::FileEntryResponse>,
}

/// Compute which part numbers in `1..=total_parts` are absent from `present`.
///
/// `present` must be sorted ascending.
pub fn missing_part_numbers(total_parts: u32, present: &[u32]) -> Vec<u32> {
    (1..=total_parts)
        .filter(|n| present.binary_search(n).is_err())
        .collect()
}
