//! Vault server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vault_core::config::AppConfig;
use vault_server::{AppState, create_router};

/// Encrypted file vault with chunked uploads
#[derive(Parser, Debug)]
#[command(name = "vaultd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VAULT_CONFIG", default_value = "config/vault.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Vault v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; defaults plus VAULT_ env vars are a complete config.
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(
            config_path = %args.config,
            "No config file found, using defaults and environment"
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("VAULT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    vault_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let gateway = vault_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    gateway
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = gateway.backend_name(), "Object store connectivity verified");

    let metadata = vault_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::new(config.clone(), gateway, metadata);

    let restored = state
        .manager
        .recover_reservations()
        .await
        .context("failed to recover quota reservations")?;
    tracing::info!(restored_bytes = restored, "Quota reservations recovered");

    let _ledger_cleanup_handle = vault_server::quota::spawn_cleanup_task(
        state.ledger.clone(),
        config.upload.ledger_cleanup_interval(),
    );

    if config.reaper.enabled {
        let _reaper_handle = Arc::new(state.reaper()).spawn();
    } else {
        tracing::info!("Expiry reaper disabled");
    }

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
