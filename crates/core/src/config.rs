//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Header carrying the authenticated owner id, set by the fronting proxy.
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
    /// Maximum accepted body size for a single part upload.
    #[serde(default = "default_max_part_body_bytes")]
    pub max_part_body_bytes: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// When enabled, restrict this endpoint to scraper IPs at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_identity_header() -> String {
    "x-vault-owner".to_string()
}

fn default_max_part_body_bytes() -> u64 {
    crate::PART_SIZE * 2
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            identity_header: default_identity_header(),
            max_part_body_bytes: default_max_part_body_bytes(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.identity_header.trim().is_empty() {
            return Err("server.identity_header cannot be empty".to_string());
        }
        if usize::try_from(self.max_part_body_bytes).is_err() {
            return Err(format!(
                "server.max_part_body_bytes {} exceeds platform address space",
                self.max_part_body_bytes
            ));
        }
        Ok(())
    }
}

/// Where durable per-owner usage is read from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UsageSource {
    /// Sum of catalogued file sizes (one query, no remote calls).
    #[default]
    Catalog,
    /// Sum of object sizes listed under the owner's prefix in the object store.
    ObjectStore,
}

/// Chunked upload and quota configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Part size handed to clients.
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Per-owner storage limit in bytes (durable + in flight).
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    /// Maximum number of parts per session.
    #[serde(default = "default_max_parts")]
    pub max_parts: u32,
    /// Durable usage source for quota admission.
    #[serde(default)]
    pub usage_source: UsageSource,
    /// Seconds between evictions of owners with nothing reserved.
    #[serde(default = "default_ledger_cleanup_interval_secs")]
    pub ledger_cleanup_interval_secs: u64,
}

fn default_part_size() -> u64 {
    crate::PART_SIZE
}

fn default_session_ttl_secs() -> u64 {
    crate::DEFAULT_SESSION_TTL_SECS
}

fn default_quota_bytes() -> u64 {
    crate::DEFAULT_QUOTA_BYTES
}

fn default_max_parts() -> u32 {
    crate::MAX_PARTS
}

fn default_ledger_cleanup_interval_secs() -> u64 {
    300
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            session_ttl_secs: default_session_ttl_secs(),
            quota_bytes: default_quota_bytes(),
            max_parts: default_max_parts(),
            usage_source: UsageSource::default(),
            ledger_cleanup_interval_secs: default_ledger_cleanup_interval_secs(),
        }
    }
}

impl UploadConfig {
    /// Get the session lifetime as a Duration.
    pub fn session_ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the ledger cleanup interval as a std::time::Duration.
    pub fn ledger_cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ledger_cleanup_interval_secs)
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.part_size < crate::MIN_PART_SIZE {
            return Err(format!(
                "upload.part_size {} is below the multipart minimum {}",
                self.part_size,
                crate::MIN_PART_SIZE
            ));
        }
        if self.part_size > i64::MAX as u64 || self.quota_bytes > i64::MAX as u64 {
            return Err("upload sizes must fit in a signed 64-bit integer".to_string());
        }
        if self.max_parts == 0 || self.max_parts > crate::MAX_PARTS {
            return Err(format!(
                "upload.max_parts must be between 1 and {}",
                crate::MAX_PARTS
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err("upload.session_ttl_secs cannot be 0".to_string());
        }
        if self.ledger_cleanup_interval_secs == 0 {
            return Err("upload.ledger_cleanup_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage (development and tests).
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage (AWS S3, R2, MinIO).
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for R2, MinIO, etc.).
        endpoint: Option<String>,
        /// Region. R2 uses "auto".
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// Access key ID. Falls back to the default AWS credential chain if not set.
        /// Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// Secret access key. Falls back to the default AWS credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a bucket".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Expiry reaper configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Run the periodic sweep (default: true).
    #[serde(default = "default_reaper_enabled")]
    pub enabled: bool,
    /// Interval in seconds between sweeps (default: 1 hour).
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
    /// Sessions loaded per batch.
    #[serde(default = "default_reaper_batch_size")]
    pub batch_size: u32,
    /// Maximum batches per sweep; the next sweep picks up the rest.
    #[serde(default = "default_reaper_max_batches")]
    pub max_batches: u32,
    /// Per-batch lookup timeout in seconds.
    #[serde(default = "default_reaper_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_reaper_interval_secs() -> u64 {
    3600 // 1 hour
}

fn default_reaper_batch_size() -> u32 {
    100
}

fn default_reaper_max_batches() -> u32 {
    100
}

fn default_reaper_batch_timeout_secs() -> u64 {
    60
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_reaper_enabled(),
            interval_secs: default_reaper_interval_secs(),
            batch_size: default_reaper_batch_size(),
            max_batches: default_reaper_max_batches(),
            batch_timeout_secs: default_reaper_batch_timeout_secs(),
        }
    }
}

impl ReaperConfig {
    /// Get the sweep interval as a std::time::Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs)
    }

    /// Get the batch timeout as a std::time::Duration.
    pub fn batch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch_timeout_secs)
    }

    /// Validate reaper configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.interval_secs == 0 {
            return Err("reaper.interval_secs cannot be 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("reaper.batch_size cannot be 0".to_string());
        }
        if self.max_batches == 0 {
            return Err("reaper.max_batches cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload and quota configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Expiry reaper configuration.
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata, and
    /// disables the background reaper so tests drive sweeps explicitly.
    pub fn for_testing() -> Self {
        Self {
            reaper: ReaperConfig {
                enabled: false,
                ..ReaperConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.upload.validate()?;
        self.storage.validate()?;
        self.reaper.validate()?;
        if self.server.max_part_body_bytes < self.upload.part_size {
            return Err(format!(
                "server.max_part_body_bytes {} is below upload.part_size {}",
                self.server.max_part_body_bytes, self.upload.part_size
            ));
        }
        Ok(())
    }
}
