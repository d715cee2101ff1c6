use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tally::api;
use tally::config::{Config, PolicySource, StorageBackend};
use tally::counter::CounterService;
use tally::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tally=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let store = storage::open(&config.storage);
    match config.storage.backend {
        StorageBackend::File => {
            info!("Using file storage: {}", config.storage.data_file.display());
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; counts are lost on exit");
        }
    }

    // Fail fast on an unreadable data file; corrupt contents are handled by load itself.
    let existing = store
        .load()
        .await
        .with_context(|| format!("failed to read counter store {}", store.describe()))?;
    info!("Counter store holds {} domain(s)", existing.domains.len());

    match &config.policy {
        PolicySource::Static(policy) if policy.allow_all => {
            info!("🔓 Counting hits for any domain");
        }
        PolicySource::Static(policy) => {
            info!(
                "🔐 Counting hits for: {}",
                policy.allowed_root_domains.join(", ")
            );
        }
        PolicySource::File(path) => {
            info!("🔐 Counter policy re-read from {} on every request", path.display());
        }
    }

    let counter = Arc::new(CounterService::new(
        store,
        config.policy.clone(),
        config.storage.write_queue_capacity,
    ));

    if let Some(ref public_dir) = config.frontend.public_dir {
        info!("🎨 Serving client assets from directory: {}", public_dir);
    } else {
        info!("🎨 Serving embedded client assets");
    }

    let router = api::create_router(Arc::clone(&counter), config.frontend.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Counter server listening on http://{}", addr);
    info!("   - Client script at http://{}/counter.js", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Draining pending counter writes...");
    counter.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
