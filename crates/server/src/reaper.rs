//! Background sweep that aborts expired upload sessions.

use crate::manager::{AbortOutcome, UploadSessionManager};
use crate::metrics;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;
use vault_core::config::ReaperConfig;
use vault_metadata::MetadataStore;
use vault_metadata::repos::UploadSessionRepo;

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaperStats {
    /// Expired sessions loaded.
    pub examined: u64,
    /// Sessions this sweep moved to `aborted`.
    pub aborted: u64,
    /// Sessions that could not be aborted, plus failed batch loads.
    pub errors: u64,
}

pub struct ExpiryReaper {
    manager: Arc<UploadSessionManager>,
    metadata: Arc<dyn MetadataStore>,
    config: ReaperConfig,
}

impl ExpiryReaper {
    pub fn new(
        manager: Arc<UploadSessionManager>,
        metadata: Arc<dyn MetadataStore>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            manager,
            metadata,
            config,
        }
    }

    /// Run one sweep over expired, non-terminal sessions.
    ///
    /// Each session is aborted independently; failures are counted and logged,
    /// never raised. A session is attempted at most once per sweep, even when a
    /// failed abort leaves it at the head of later batches. The sweep stops at
    /// an empty batch, at a batch where nothing new could be aborted, or after
    /// `max_batches`.
    pub async fn run_once(&self) -> ReaperStats {
        let start = Instant::now();
        let mut stats = ReaperStats::default();
        let mut attempted: HashSet<Uuid> = HashSet::new();

        for batch_number in 0..self.config.max_batches {
            let now = OffsetDateTime::now_utc();
            let batch = match tokio::time::timeout(
                self.config.batch_timeout(),
                self.metadata
                    .get_expired_sessions(now, self.config.batch_size),
            )
            .await
            {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) => {
                    tracing::warn!(batch_number, error = %e, "Failed to load expired sessions");
                    stats.errors += 1;
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        batch_number,
                        timeout_secs = self.config.batch_timeout_secs,
                        "Timed out loading expired sessions"
                    );
                    stats.errors += 1;
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            let mut progressed = 0u64;
            for session in &batch {
                if !attempted.insert(session.session_id) {
                    continue;
                }
                stats.examined += 1;
                match self.manager.abort_session(session).await {
                    Ok(AbortOutcome::Aborted) => {
                        stats.aborted += 1;
                        progressed += 1;
                        metrics::UPLOAD_SESSIONS_EXPIRED.inc();
                    }
                    Ok(AbortOutcome::AlreadyAborted) => progressed += 1,
                    Err(e) => {
                        stats.errors += 1;
                        tracing::warn!(
                            session_id = %session.session_id,
                            error = %e,
                            "Failed to abort expired session"
                        );
                    }
                }
            }

            if progressed == 0 {
                tracing::warn!(
                    batch_number,
                    batch_size = batch.len(),
                    "No expired session in batch could be aborted, ending sweep"
                );
                break;
            }
            if (batch.len() as u64) < u64::from(self.config.batch_size) {
                break;
            }
        }

        metrics::REAPER_RUNS.inc();
        metrics::REAPER_FAILURES.inc_by(stats.errors);
        metrics::REAPER_DURATION.observe(start.elapsed().as_secs_f64());

        tracing::info!(
            examined = stats.examined,
            aborted = stats.aborted,
            errors = stats.errors,
            duration_ms = start.elapsed().as_millis() as u64,
            "Expiry sweep finished"
        );
        stats
    }

    /// Spawn the periodic sweep. The first run waits one full interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.interval();
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                batch_size = self.config.batch_size,
                "Expiry reaper started"
            );
            loop {
                tokio::time::sleep(interval).await;
                self.run_once().await;
            }
        })
    }
}
