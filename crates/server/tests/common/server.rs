//! Server test utilities.

use super::gateway::MockGateway;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use vault_core::config::{AppConfig, MetadataConfig, StorageConfig};
use vault_metadata::{MetadataStore, SqliteStore};
use vault_server::{AppState, create_router};
use vault_storage::{FilesystemGateway, MultipartGateway};

/// Identity header used by every test request.
#[allow(dead_code)]
pub const OWNER_HEADER: &str = "x-vault-owner";

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    /// Set when the server runs on the in-memory mock gateway.
    pub mock: Option<Arc<MockGateway>>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server backed by the mock gateway.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a mock-backed test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mock = Arc::new(MockGateway::new());
        Self::build(mock.clone(), Some(mock), modifier).await
    }

    /// Create a test server on the real filesystem gateway.
    pub async fn filesystem() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let gateway: Arc<dyn MultipartGateway> = Arc::new(
            FilesystemGateway::new(temp_dir.path().join("objects"))
                .await
                .expect("Failed to create filesystem gateway"),
        );
        Self::build_in(temp_dir, gateway, None, |_| {}).await
    }

    async fn build<F>(
        gateway: Arc<dyn MultipartGateway>,
        mock: Option<Arc<MockGateway>>,
        modifier: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        Self::build_in(temp_dir, gateway, mock, modifier).await
    }

    async fn build_in<F>(
        temp_dir: TempDir,
        gateway: Arc<dyn MultipartGateway>,
        mock: Option<Arc<MockGateway>>,
        modifier: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: temp_dir.path().join("objects"),
        };
        config.metadata = MetadataConfig::Sqlite { path: db_path };
        modifier(&mut config);

        vault_server::metrics::register_metrics();
        let state = AppState::new(config, gateway, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            mock,
            _temp_dir: temp_dir,
        }
    }

    /// The mock gateway; panics on a filesystem-backed server.
    pub fn gateway(&self) -> &MockGateway {
        self.mock.as_deref().expect("server is not mock-backed")
    }

    /// Send a request as `owner` (or anonymously) and decode the JSON reply.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            builder = builder.header(OWNER_HEADER, owner);
        }

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Send a JSON body as `owner`.
    pub async fn json(
        &self,
        method: &str,
        uri: &str,
        owner: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(
            method,
            uri,
            owner,
            Body::from(serde_json::to_vec(&body).unwrap()),
        )
        .await
    }
}
