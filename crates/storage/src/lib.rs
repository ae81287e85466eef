//! Multipart object storage for the vault.
//!
//! This crate provides:
//! - The `MultipartGateway` abstraction over S3-style multipart uploads
//! - Backends: S3-compatible and local filesystem

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemGateway, s3::S3Gateway};
pub use error::{StorageError, StorageResult};
pub use traits::{
    CompletedPartRef, MAX_PART_NUMBER, MultipartGateway, ORIGINAL_FILENAME_METADATA, ObjectMeta,
    ObjectSummary,
};

use std::sync::Arc;
use vault_core::config::StorageConfig;

/// Create a multipart gateway from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn MultipartGateway>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let gateway = FilesystemGateway::new(path).await?;
            Ok(Arc::new(gateway))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let gateway = S3Gateway::new(
                bucket,
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(gateway))
        }
    }
}
