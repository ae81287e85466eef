//! File catalog types and object key layout.

use crate::owner::OwnerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of a preserved file extension (without the dot).
const MAX_EXTENSION_LEN: usize = 16;

/// Unique identifier for a catalogued file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidFileId(format!("{s}: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extension of `file_name` including the leading dot, if it is safe to keep.
///
/// Only short ASCII-alphanumeric extensions survive; anything else is dropped
/// so client-supplied names can never shape the object key beyond one suffix.
fn safe_extension(file_name: &str) -> Option<&str> {
    let dot = file_name.rfind('.')?;
    let ext = &file_name[dot + 1..];
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(&file_name[dot..])
}

/// Build a fresh object key for `file_name` inside the owner's namespace.
///
/// Layout: `users/{owner}/{uuid}{.ext}`.
pub fn object_key_for(owner: &OwnerId, file_name: &str) -> String {
    let ext = safe_extension(file_name).unwrap_or("");
    format!("{}{}{}", owner.key_prefix(), Uuid::new_v4(), ext)
}

/// A catalogued file as returned to its owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntryResponse {
    pub file_id: String,
    pub original_filename: String,
    pub size: u64,
    pub content_type: String,
    pub encrypted_key: Option<String>,
    pub iv: Option<String>,
    pub algorithm: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Storage usage report for one owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UsageResponse {
    pub owner_id: String,
    /// Bytes durably stored.
    pub used_bytes: u64,
    /// Bytes admitted for uploads still in flight.
    pub reserved_bytes: u64,
    pub quota_bytes: u64,
    /// `used_bytes / quota_bytes * 100`.
    pub usage_percentage: f64,
}

impl UsageResponse {
    pub fn new(owner: &OwnerId, used_bytes: u64, reserved_bytes: u64, quota_bytes: u64) -> Self {
        let usage_percentage = if quota_bytes == 0 {
            100.0
        } else {
            used_bytes as f64 / quota_bytes as f64 * 100.0
        };
        Self {
            owner_id: owner.to_string(),
            used_bytes,
            reserved_bytes,
            quota_bytes,
            usage_percentage,
        }
    }
}
