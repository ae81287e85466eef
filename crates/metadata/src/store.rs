//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FileRepo, UploadSessionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UploadSessionRepo + FileRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes every transaction, which the session
            // compare-and-swap and part budget checks rely on.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store opened");

        Ok(store)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Map unique-constraint violations to `AlreadyExists`.
fn map_unique_violation(e: sqlx::Error, what: impl Into<String>) -> MetadataError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            MetadataError::AlreadyExists(what.into())
        }
        other => other.into(),
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;
    use vault_core::UploadStatus;

    #[async_trait]
    impl UploadSessionRepo for SqliteStore {
        async fn create_session(&self, session: &UploadSessionRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO upload_sessions (
                    session_id, owner_id, remote_upload_id, object_key, file_name,
                    content_type, total_size, part_size, total_parts, status,
                    version, encrypted_key, iv, created_at, updated_at, expires_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(session.session_id)
            .bind(&session.owner_id)
            .bind(&session.remote_upload_id)
            .bind(&session.object_key)
            .bind(&session.file_name)
            .bind(&session.content_type)
            .bind(session.total_size)
            .bind(session.part_size)
            .bind(session.total_parts)
            .bind(&session.status)
            .bind(session.version)
            .bind(&session.encrypted_key)
            .bind(&session.iv)
            .bind(session.created_at)
            .bind(session.updated_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, format!("upload session {}", session.session_id)))?;
            Ok(())
        }

        async fn get_session(&self, session_id: Uuid) -> MetadataResult<Option<UploadSessionRow>> {
            let row = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE session_id = ?",
            )
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_part(
            &self,
            session_id: Uuid,
            part_number: i32,
        ) -> MetadataResult<Option<UploadedPartRow>> {
            let row = sqlx::query_as::<_, UploadedPartRow>(
                "SELECT * FROM uploaded_parts WHERE session_id = ? AND part_number = ?",
            )
            .bind(session_id)
            .bind(part_number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_parts(&self, session_id: Uuid) -> MetadataResult<Vec<UploadedPartRow>> {
            let rows = sqlx::query_as::<_, UploadedPartRow>(
                "SELECT * FROM uploaded_parts WHERE session_id = ? ORDER BY part_number",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn part_stats(&self, session_id: Uuid) -> MetadataResult<PartStats> {
            let (count, bytes): (i64, i64) = sqlx::query_as(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM uploaded_parts WHERE session_id = ?",
            )
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(PartStats {
                count: count as u64,
                bytes: bytes as u64,
            })
        }

        async fn record_part(
            &self,
            part: &UploadedPartRow,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<RecordedPart> {
            let mut tx = self.pool.begin().await?;

            let session: Option<(String, i64)> = sqlx::query_as(
                "SELECT status, total_size FROM upload_sessions WHERE session_id = ?",
            )
            .bind(part.session_id)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((status, total_size)) = session else {
                return Err(MetadataError::NotFound(format!(
                    "upload session {}",
                    part.session_id
                )));
            };

            let parsed = UploadStatus::parse(&status)
                .map_err(|e| MetadataError::Internal(e.to_string()))?;
            if parsed.is_terminal() {
                return Err(MetadataError::SessionClosed(status));
            }

            // A concurrent upload of the same part may have landed first; its row wins.
            let existing = sqlx::query_as::<_, UploadedPartRow>(
                "SELECT * FROM uploaded_parts WHERE session_id = ? AND part_number = ?",
            )
            .bind(part.session_id)
            .bind(part.part_number)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                tx.commit().await?;
                return Ok(RecordedPart {
                    part: existing,
                    inserted: false,
                });
            }

            let persisted: i64 = sqlx::query_scalar(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM uploaded_parts WHERE session_id = ?",
            )
            .bind(part.session_id)
            .fetch_one(&mut *tx)
            .await?;

            let attempted = persisted.saturating_add(part.size_bytes);
            if attempted > total_size {
                return Err(MetadataError::PartBudgetExceeded {
                    total_size: total_size as u64,
                    attempted: attempted as u64,
                });
            }

            sqlx::query(
                r#"
                INSERT INTO uploaded_parts (session_id, part_number, etag, size_bytes, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (session_id, part_number) DO NOTHING
                "#,
            )
            .bind(part.session_id)
            .bind(part.part_number)
            .bind(&part.etag)
            .bind(part.size_bytes)
            .bind(part.created_at)
            .execute(&mut *tx)
            .await?;

            // First part moves the session forward; later parts leave the version alone.
            sqlx::query(
                r#"
                UPDATE upload_sessions
                SET status = 'in_progress', version = version + 1, updated_at = ?
                WHERE session_id = ? AND status = 'initiated'
                "#,
            )
            .bind(updated_at)
            .bind(part.session_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(RecordedPart {
                part: part.clone(),
                inserted: true,
            })
        }

        async fn transition_status(
            &self,
            session_id: Uuid,
            expected_version: i64,
            status: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE upload_sessions
                SET status = ?, version = version + 1, updated_at = ?
                WHERE session_id = ? AND version = ? AND status IN ('initiated', 'in_progress')
                "#,
            )
            .bind(status)
            .bind(updated_at)
            .bind(session_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn complete_session(
            &self,
            session_id: Uuid,
            expected_version: i64,
            file: &FileRow,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<bool> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                r#"
                UPDATE upload_sessions
                SET status = 'completed', version = version + 1, updated_at = ?
                WHERE session_id = ? AND version = ? AND status IN ('initiated', 'in_progress')
                "#,
            )
            .bind(updated_at)
            .bind(session_id)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls it back.
                return Ok(false);
            }

            sqlx::query(
                r#"
                INSERT INTO files (
                    file_id, owner_id, session_id, object_key, original_filename,
                    size_bytes, content_type, encrypted_key, iv, algorithm, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.file_id)
            .bind(&file.owner_id)
            .bind(file.session_id)
            .bind(&file.object_key)
            .bind(&file.original_filename)
            .bind(file.size_bytes)
            .bind(&file.content_type)
            .bind(&file.encrypted_key)
            .bind(&file.iv)
            .bind(&file.algorithm)
            .bind(file.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, format!("file at {}", file.object_key)))?;

            tx.commit().await?;
            Ok(true)
        }

        async fn get_expired_sessions(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> MetadataResult<Vec<UploadSessionRow>> {
            let rows = sqlx::query_as::<_, UploadSessionRow>(
                r#"
                SELECT * FROM upload_sessions
                WHERE status IN ('initiated', 'in_progress') AND expires_at < ?
                ORDER BY expires_at
                LIMIT ?
                "#,
            )
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn active_reservations(&self) -> MetadataResult<Vec<(String, u64)>> {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                r#"
                SELECT owner_id, COALESCE(SUM(total_size), 0)
                FROM upload_sessions
                WHERE status IN ('initiated', 'in_progress')
                GROUP BY owner_id
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(owner, bytes)| (owner, bytes.max(0) as u64))
                .collect())
        }

        async fn count_active_sessions(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM upload_sessions WHERE status IN ('initiated', 'in_progress')",
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }

        async fn set_expires_at(
            &self,
            session_id: Uuid,
            expires_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE upload_sessions SET expires_at = ? WHERE session_id = ?")
                    .bind(expires_at)
                    .bind(session_id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "upload session {session_id}"
                )));
            }
            Ok(())
        }

        async fn delete_session(&self, session_id: Uuid) -> MetadataResult<()> {
            // Parts go with the session through ON DELETE CASCADE.
            sqlx::query("DELETE FROM upload_sessions WHERE session_id = ?")
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_file_by_session(&self, session_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn delete_file(&self, file_id: Uuid) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM files WHERE file_id = ?")
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn total_usage(&self, owner_id: &str) -> MetadataResult<u64> {
            let total: i64 = sqlx::query_scalar(
                "SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE owner_id = ?",
            )
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(total.max(0) as u64)
        }
    }
}

impl std::convert::From<std::io::Error> for crate::MetadataError {
    fn from(e: std::io::Error) -> Self {
        crate::MetadataError::Config(format!("IO error: {}", e))
    }
}

const SCHEMA_SQL: &str = r#"
-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id BLOB PRIMARY KEY,
    owner_id TEXT NOT NULL,
    remote_upload_id TEXT NOT NULL,
    object_key TEXT NOT NULL UNIQUE,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    total_size INTEGER NOT NULL CHECK (total_size > 0),
    part_size INTEGER NOT NULL CHECK (part_size > 0),
    total_parts INTEGER NOT NULL CHECK (total_parts BETWEEN 1 AND 10000),
    status TEXT NOT NULL DEFAULT 'initiated'
        CHECK (status IN ('initiated', 'in_progress', 'completed', 'aborted')),
    version INTEGER NOT NULL DEFAULT 0,
    encrypted_key TEXT,
    iv TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_owner ON upload_sessions(owner_id, status);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_expiry ON upload_sessions(status, expires_at);

-- Parts persisted per session
CREATE TABLE IF NOT EXISTS uploaded_parts (
    session_id BLOB NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
    part_number INTEGER NOT NULL CHECK (part_number >= 1),
    etag TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes > 0),
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, part_number)
);

-- File catalog
CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    owner_id TEXT NOT NULL,
    session_id BLOB UNIQUE REFERENCES upload_sessions(session_id) ON DELETE SET NULL,
    object_key TEXT NOT NULL UNIQUE,
    original_filename TEXT NOT NULL,
    size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
    content_type TEXT NOT NULL,
    encrypted_key TEXT,
    iv TEXT,
    algorithm TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_id);
"#;
