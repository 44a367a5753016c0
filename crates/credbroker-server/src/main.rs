//! `credbroker` server entry point.
//!
//! Bootstraps the storage backend, credential vault and lifecycle services,
//! seeds the administrator, then starts the Axum HTTP server with graceful
//! shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use credbroker_core::credhub::CredHubClient;
use credbroker_core::vault::{CredentialVault, MemoryVault};
use credbroker_storage::{MemoryBackend, StorageBackend};

use credbroker_server::config::{ServerConfig, StorageBackendType};
use credbroker_server::routes;
use credbroker_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(
        bind_addr = %config.bind_addr,
        storage = ?config.storage_backend,
        service_id = %config.catalog.service_id,
        plan_id = %config.catalog.plan_id,
        "starting credbroker"
    );

    let backend = build_backend(&config).await?;
    let vault = build_vault(&config)?;
    let state = Arc::new(AppState::new(&config, backend, vault));

    if state
        .users
        .initialize_users()
        .await
        .context("failed to seed broker administrator")?
    {
        info!(username = %config.admin.username, "seeded broker administrator");
    }

    let app = routes::build_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "credbroker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("credbroker stopped");
    Ok(())
}

async fn build_backend(config: &ServerConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match &config.storage_backend {
        StorageBackendType::Memory => {
            warn!("using in-memory storage, records are lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "postgres-backend")]
        StorageBackendType::Postgres { url } => {
            let backend = credbroker_storage::PostgresBackend::connect(url)
                .await
                .context("failed to connect to PostgreSQL")?;
            info!("connected to PostgreSQL record store");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "postgres-backend"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!("postgres storage requested but the postgres-backend feature is disabled")
        }
    }
}

fn build_vault(config: &ServerConfig) -> anyhow::Result<Arc<dyn CredentialVault>> {
    if let Some(credhub) = &config.credhub {
        let client = CredHubClient::new(credhub.clone()).context("invalid CredHub configuration")?;
        info!(credhub = %credhub.base_url, "using CredHub credential vault");
        Ok(Arc::new(client))
    } else {
        warn!("BROKER_CREDHUB_URL not set, keeping binding credentials in memory");
        Ok(Arc::new(MemoryVault::new()))
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
