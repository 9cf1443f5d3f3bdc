//! Startup orchestration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{MediatorConfig, StoreBackend};
use crate::mediator::Mediator;
use crate::observability::metrics;
use crate::store::MemoryStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Build the mediator and its store as the configuration describes.
///
/// The memory store gets a purge task that stops with `shutdown`.
pub fn build_mediator(config: &MediatorConfig, shutdown: broadcast::Receiver<()>) -> Mediator {
    let purger_shutdown = shutdown.resubscribe();
    let builder = Mediator::builder().config(config).shutdown(shutdown);
    let builder = match config.store.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::default();
            store.spawn_purger(
                Duration::from_millis(config.store.purge_interval_ms),
                purger_shutdown,
            );
            builder.store(Arc::new(store))
        }
        StoreBackend::None => {
            tracing::warn!("No store configured: rate limiting disabled, caching bypassed");
            builder
        }
    };
    builder.build()
}

/// Install the Prometheus exporter if enabled.
pub fn init_metrics(config: &MediatorConfig) -> Result<(), StartupError> {
    if !config.observability.metrics_enabled {
        return Ok(());
    }
    let addr: SocketAddr = config
        .observability
        .metrics_address
        .parse()
        .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
    metrics::init_metrics(addr)?;
    Ok(())
}
