//! Application state shared across handlers.

use crate::catalog::FileCatalog;
use crate::manager::UploadSessionManager;
use crate::quota::{CatalogUsage, ObjectStoreUsage, QuotaLedger, UsageSource};
use crate::reaper::ExpiryReaper;
use std::sync::Arc;
use vault_core::config::{AppConfig, UsageSource as UsageSourceKind};
use vault_metadata::MetadataStore;
use vault_storage::MultipartGateway;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn MultipartGateway>,
    pub metadata: Arc<dyn MetadataStore>,
    pub ledger: Arc<QuotaLedger>,
    pub manager: Arc<UploadSessionManager>,
    pub catalog: Arc<FileCatalog>,
}

impl AppState {
    /// Wire the quota ledger, upload manager and catalog over shared backends.
    ///
    /// The configuration is expected to be validated already.
    pub fn new(
        config: AppConfig,
        gateway: Arc<dyn MultipartGateway>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let usage: Arc<dyn UsageSource> = match config.upload.usage_source {
            UsageSourceKind::Catalog => Arc::new(CatalogUsage::new(metadata.clone())),
            UsageSourceKind::ObjectStore => Arc::new(ObjectStoreUsage::new(gateway.clone())),
        };
        let ledger = Arc::new(QuotaLedger::new(usage, config.upload.quota_bytes));

        let manager = Arc::new(UploadSessionManager::new(
            metadata.clone(),
            gateway.clone(),
            ledger.clone(),
            config.upload.clone(),
            config.server.max_part_body_bytes,
        ));
        let catalog = Arc::new(FileCatalog::new(
            metadata.clone(),
            gateway.clone(),
            ledger.clone(),
        ));

        Self {
            config: Arc::new(config),
            gateway,
            metadata,
            ledger,
            manager,
            catalog,
        }
    }

    /// Build the expiry reaper over this state's manager and metadata store.
    pub fn reaper(&self) -> ExpiryReaper {
        ExpiryReaper::new(
            self.manager.clone(),
            self.metadata.clone(),
            self.config.reaper.clone(),
        )
    }
}
