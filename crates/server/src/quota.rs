//! Per-owner storage quota with in-flight reservations.
//!
//! Admission compares `durable + reserved + requested` against one global
//! limit. Durable usage comes from a pluggable [`UsageSource`]; reserved bytes
//! live in memory and are rebuilt from live sessions at startup.
//!
//! Check-and-reserve is serialized per owner by an async admission lock, so two
//! concurrent initiates for the same owner can never both squeeze under the
//! limit. Releases only touch the atomic counter and never wait.
//!
//! Owners with nothing reserved are evicted periodically, see
//! [`spawn_cleanup_task`].

use crate::error::ApiResult;
use crate::metrics;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use vault_core::OwnerId;
use vault_metadata::MetadataStore;
use vault_metadata::repos::FileRepo;
use vault_storage::MultipartGateway;

/// Source of an owner's durable (already stored) usage.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn durable_usage(&self, owner: &OwnerId) -> ApiResult<u64>;
}

/// Durable usage as the sum of catalogued file sizes.
pub struct CatalogUsage {
    metadata: Arc<dyn MetadataStore>,
}

impl CatalogUsage {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }
}

#[async_trait]
impl UsageSource for CatalogUsage {
    async fn durable_usage(&self, owner: &OwnerId) -> ApiResult<u64> {
        Ok(self.metadata.total_usage(owner.as_str()).await?)
    }
}

/// Durable usage as the sum of object sizes listed under `users/{owner}/`.
pub struct ObjectStoreUsage {
    gateway: Arc<dyn MultipartGateway>,
}

impl ObjectStoreUsage {
    pub fn new(gateway: Arc<dyn MultipartGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl UsageSource for ObjectStoreUsage {
    async fn durable_usage(&self, owner: &OwnerId) -> ApiResult<u64> {
        let objects = self.gateway.list(&owner.key_prefix()).await?;
        Ok(objects.iter().map(|o| o.size).sum())
    }
}

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected {
        used: u64,
        reserved: u64,
        requested: u64,
        limit: u64,
    },
}

#[derive(Default)]
struct OwnerLedger {
    reserved: AtomicU64,
    admission: tokio::sync::Mutex<()>,
}

/// Injectable quota ledger shared by the upload manager and the catalog.
pub struct QuotaLedger {
    owners: DashMap<String, Arc<OwnerLedger>>,
    usage: Arc<dyn UsageSource>,
    limit: u64,
}

impl QuotaLedger {
    pub fn new(usage: Arc<dyn UsageSource>, limit: u64) -> Self {
        Self {
            owners: DashMap::new(),
            usage,
            limit,
        }
    }

    /// Configured per-owner limit in bytes.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    // Clone the Arc out so no shard lock is held across an await.
    fn ledger(&self, owner: &OwnerId) -> Arc<OwnerLedger> {
        self.owners
            .entry(owner.as_str().to_string())
            .or_default()
            .clone()
    }

    /// Atomically check the quota and reserve `bytes` for `owner`.
    pub async fn reserve(&self, owner: &OwnerId, bytes: u64) -> ApiResult<Admission> {
        let ledger = self.ledger(owner);
        let _guard = ledger.admission.lock().await;

        let used = self.usage.durable_usage(owner).await?;
        let reserved = ledger.reserved.load(Ordering::Acquire);
        let projected = used.saturating_add(reserved).saturating_add(bytes);

        if projected > self.limit {
            metrics::QUOTA_REJECTIONS.inc();
            tracing::info!(
                owner = %owner,
                used,
                reserved,
                requested = bytes,
                limit = self.limit,
                "Quota admission rejected"
            );
            return Ok(Admission::Rejected {
                used,
                reserved,
                requested: bytes,
                limit: self.limit,
            });
        }

        ledger.reserved.fetch_add(bytes, Ordering::AcqRel);
        metrics::RESERVED_BYTES.add(gauge_delta(bytes));
        Ok(Admission::Admitted)
    }

    /// Return `bytes` of a reservation. Never blocks.
    ///
    /// Releasing more than is reserved clamps to zero and logs a warning: it
    /// means some path released twice.
    pub fn release(&self, owner: &OwnerId, bytes: u64) {
        let previous = match self.owners.get(owner.as_str()) {
            Some(ledger) => ledger
                .reserved
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_sub(bytes))
                })
                .unwrap_or_default(),
            None => 0,
        };

        if previous < bytes {
            tracing::warn!(
                owner = %owner,
                reserved = previous,
                released = bytes,
                "Quota release exceeds reservation, clamping to zero"
            );
        }
        metrics::RESERVED_BYTES.sub(gauge_delta(previous.min(bytes)));
    }

    /// Re-establish a reservation for a session that survived a restart.
    ///
    /// Bypasses admission: the bytes were admitted before the restart.
    pub fn restore(&self, owner: &OwnerId, bytes: u64) {
        let ledger = self.ledger(owner);
        ledger.reserved.fetch_add(bytes, Ordering::AcqRel);
        metrics::RESERVED_BYTES.add(gauge_delta(bytes));
    }

    /// Durable bytes stored by `owner`.
    pub async fn current_usage(&self, owner: &OwnerId) -> ApiResult<u64> {
        self.usage.durable_usage(owner).await
    }

    /// Bytes currently reserved by `owner`'s in-flight uploads.
    pub fn reserved(&self, owner: &OwnerId) -> u64 {
        self.owners
            .get(owner.as_str())
            .map(|ledger| ledger.reserved.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Drop owners with nothing reserved and no admission in flight.
    ///
    /// Returns the number of owners evicted. An evicted owner starts from an
    /// empty entry on its next reservation.
    pub fn evict_idle(&self) -> usize {
        let mut evicted = 0;
        // A held clone means a reservation is being admitted right now.
        self.owners.retain(|_, ledger| {
            let idle =
                Arc::strong_count(ledger) == 1 && ledger.reserved.load(Ordering::Acquire) == 0;
            if idle {
                evicted += 1;
            }
            !idle
        });
        evicted
    }

    /// Number of owners currently tracked.
    pub fn tracked_owners(&self) -> usize {
        self.owners.len()
    }
}

/// Spawn a background task that periodically evicts idle ledger entries.
pub fn spawn_cleanup_task(
    ledger: Arc<QuotaLedger>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = ledger.evict_idle();
            if evicted > 0 {
                tracing::debug!(evicted, "Quota ledger evicted idle owners");
            }
        }
    })
}

fn gauge_delta(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}
