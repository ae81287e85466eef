//! Local filesystem multipart gateway.
//!
//! Parts are staged under `<root>/.multipart/<upload_id>/` and concatenated
//! into the final object on completion. Etags are the hex SHA-256 of the part.

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    CompletedPartRef, MAX_PART_NUMBER, MultipartGateway, ObjectMeta, ObjectSummary, hex_digest,
};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Staging directory for in-flight multipart uploads, relative to the root.
const MULTIPART_DIR: &str = ".multipart";

/// File inside an upload's staging directory recording its target key.
const UPLOAD_KEY_FILE: &str = "key";

/// Map NotFound io errors to `StorageError::NotFound` for `key`.
fn not_found_as(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Temp file name next to `path`, unique per write.
fn temp_path_for(path: &Path) -> PathBuf {
    let temp_name = format!(".tmp.{}", Uuid::new_v4());
    path.with_file_name(
        path.file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
            .unwrap_or_else(|| temp_name.clone()),
    )
}

/// Local filesystem multipart gateway.
pub struct FilesystemGateway {
    root: PathBuf,
}

impl FilesystemGateway {
    /// Create a new filesystem gateway rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(MULTIPART_DIR)).await?;
        Ok(Self { root })
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// Runs `key_path_sync` on the blocking pool since it canonicalizes and
    /// stats ancestors.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous key path validation.
    ///
    /// Returns an error if the key would escape the storage root, including
    /// through a symlinked ancestor.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if key.starts_with(MULTIPART_DIR) {
            return Err(StorageError::InvalidKey(format!(
                "reserved key prefix: {key}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Walk up from the path itself to the nearest existing entry and make
        // sure it resolves inside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;

                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    /// Staging directory for an upload id.
    ///
    /// Upload ids are UUIDs issued by this gateway; anything else is unknown.
    fn upload_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        let id = Uuid::parse_str(upload_id)
            .map_err(|_| StorageError::UploadNotFound(upload_id.to_string()))?;
        Ok(self.root.join(MULTIPART_DIR).join(id.to_string()))
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{part_number:05}"))
    }

    /// Load an upload's staging dir and check it targets `key`.
    async fn open_upload(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let dir = self.upload_dir(upload_id)?;
        let recorded = fs::read_to_string(dir.join(UPLOAD_KEY_FILE))
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::UploadNotFound(upload_id.to_string())
                } else {
                    StorageError::Io(e)
                }
            })?;
        if recorded != key {
            return Err(StorageError::UploadNotFound(format!(
                "{upload_id} does not target {key}"
            )));
        }
        Ok(dir)
    }

    /// Ensure parent directory exists.
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write to a temp file, fsync, then rename over `path`.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        self.ensure_parent(path).await?;
        let temp_path = temp_path_for(path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl MultipartGateway for FilesystemGateway {
    #[instrument(skip(self, metadata), fields(backend = "filesystem"))]
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> StorageResult<String> {
        // Validate the target now so a bad key fails before any part is sent.
        self.key_path(key).await?;

        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id)?;
        fs::create_dir_all(&dir).await?;
        self.write_atomic(&dir.join(UPLOAD_KEY_FILE), key.as_bytes())
            .await?;

        tracing::debug!(
            key = %key,
            upload_id = %upload_id,
            content_type = %content_type,
            metadata_entries = metadata.len(),
            "Staged multipart upload"
        );
        Ok(upload_id)
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> StorageResult<String> {
        if part_number == 0 || part_number > MAX_PART_NUMBER {
            return Err(StorageError::InvalidPart(format!(
                "part number {part_number} outside 1..={MAX_PART_NUMBER}"
            )));
        }
        let dir = self.open_upload(key, upload_id).await?;

        self.write_atomic(&Self::part_path(&dir, part_number), &data)
            .await?;

        Ok(hex_digest(&Sha256::digest(&data)))
    }

    #[instrument(skip(self, parts), fields(backend = "filesystem", parts = parts.len()))]
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> StorageResult<()> {
        if parts.is_empty() {
            return Err(StorageError::InvalidPart(
                "at least one part is required".to_string(),
            ));
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(StorageError::InvalidPart(
                "parts must be in ascending part number order".to_string(),
            ));
        }

        let dir = self.open_upload(key, upload_id).await?;
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = temp_path_for(&path);
        let assembled: StorageResult<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            for part in parts {
                let data = fs::read(Self::part_path(&dir, part.part_number))
                    .await
                    .map_err(|e| {
                        if e.kind() == std::io::ErrorKind::NotFound {
                            StorageError::InvalidPart(format!(
                                "part {} was never uploaded",
                                part.part_number
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                let actual = hex_digest(&Sha256::digest(&data));
                if actual != part.etag.trim_matches('"') {
                    return Err(StorageError::InvalidPart(format!(
                        "etag mismatch for part {}",
                        part.part_number
                    )));
                }
                file.write_all(&data).await?;
            }
            file.sync_all().await?;
            Ok(())
        }
        .await;

        if let Err(e) = assembled {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        fs::rename(&temp_path, &path).await?;

        if let Err(e) = fs::remove_dir_all(&dir).await {
            tracing::warn!(
                upload_id = %upload_id,
                error = %e,
                "Failed to remove multipart staging directory"
            );
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let dir = match self.open_upload(key, upload_id).await {
            Ok(dir) => dir,
            Err(StorageError::UploadNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path).await.map_err(not_found_as(key))?;

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: None,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectSummary>> {
        let base_path = self.key_path(prefix).await?;
        let mut results = Vec::new();

        match fs::try_exists(&base_path).await {
            Ok(false) => return Ok(results),
            Ok(true) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks, which keeps the walk inside the root.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && !entry.file_name().to_string_lossy().contains(".tmp.")
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    let size = entry.metadata().await?.len();
                    results.push(ObjectSummary {
                        key: rel.to_string_lossy().to_string(),
                        size,
                    });
                }
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_as(key))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {}", e),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
