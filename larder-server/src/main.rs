//! Larder Server Entry Point
//!
//! Bootstraps configuration, initializes the domain caches from PostgreSQL
//! and runs the change poller until ctrl-c.

use std::sync::Arc;

use larder_core::LarderResult;
use larder_server::{change_poller_task, init_tracing, DbConfig, PgStore, TelemetryConfig};
use larder_storage::{CacheConfig, CacheCoordinator, DomainCaches};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> LarderResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_tracing(&telemetry_config)?;

    let cache_config = CacheConfig::from_env();
    cache_config.validate()?;

    let db_config = DbConfig::from_env();
    let store = PgStore::from_config(&db_config)?;
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        max_size = db_config.max_size,
        "Database pool created"
    );

    let caches = Arc::new(DomainCaches::new(store.sources()));
    let coordinator = Arc::new(CacheCoordinator::new(
        caches,
        store.change_log(),
        cache_config,
    ));

    // Fatal: no traffic on partially loaded caches
    if let Err(e) = coordinator.start().await {
        tracing::error!(error = %e, "Cache initialization failed");
        return Err(e);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = tokio::spawn(change_poller_task(coordinator.clone(), shutdown_rx));

    tracing::info!(cursor = coordinator.cursor(), pool_size = store.pool_size(), "Larder server ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    match poller.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                cycles = snapshot.cycles,
                entries_applied = snapshot.entries_applied,
                "Change poller drained"
            );
        }
        Err(e) => tracing::error!(error = %e, "Change poller task failed"),
    }

    Ok(())
}
