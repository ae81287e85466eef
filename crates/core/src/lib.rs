//! Core domain types and shared logic for the encrypted file vault.
//!
//! This crate defines the data model used across all other crates:
//! - Owner identifiers and per-owner object key namespaces
//! - Upload session lifecycle and part arithmetic
//! - File catalog records and usage reports
//! - Application configuration

pub mod config;
pub mod error;
pub mod file;
pub mod owner;
pub mod upload;

pub use error::{Error, Result};
pub use file::{FileId, object_key_for};
pub use owner::OwnerId;
pub use upload::{SessionId, UploadStatus};

/// Fixed part size handed to clients: 5 MiB.
///
/// This is the smallest non-final part S3-compatible multipart protocols accept.
pub const PART_SIZE: u64 = 5 * 1024 * 1024;

/// Minimum accepted part size: 5 MiB.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum number of parts in a single multipart upload.
pub const MAX_PARTS: u32 = 10_000;

/// Default session lifetime: 7 days, matching the object store's own
/// retention of incomplete multipart uploads.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Default per-owner storage quota: 10 GiB.
pub const DEFAULT_QUOTA_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Encryption algorithm tag recorded for every catalogued file.
pub const ENCRYPTION_ALGORITHM: &str = "AES/GCM/NoPadding";
