//! Mediator wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::cache::{RefreshQueue, SwrCache};
use crate::clock::{Clock, SystemClock};
use crate::config::MediatorConfig;
use crate::dedup::Deduplicator;
use crate::mediator::Mediator;
use crate::resilience::{BreakerBackend, CircuitBreaker, Executor, LocalBreakerBackend};
use crate::security::RateLimiter;
use crate::store::{BoundedStore, Store};

/// Assembles a [`Mediator`] from configuration and injected dependencies.
///
/// Without a store the rate limiter fails open and every lookup is a
/// BYPASS. Without a breaker backend the breaker is process-local.
pub struct MediatorBuilder {
    config: MediatorConfig,
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    breaker_backend: Option<Arc<dyn BreakerBackend>>,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl Default for MediatorBuilder {
    fn default() -> Self {
        Self {
            config: MediatorConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
            breaker_backend: None,
            shutdown: None,
        }
    }
}

impl MediatorBuilder {
    pub fn config(mut self, config: &MediatorConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn breaker_backend(mut self, backend: Arc<dyn BreakerBackend>) -> Self {
        self.breaker_backend = Some(backend);
        self
    }

    /// Stop the background refresh worker when this fires.
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Build the mediator. Spawns the refresh worker, so this must run
    /// within a Tokio runtime.
    pub fn build(self) -> Mediator {
        let config = self.config;
        let op_timeout = Duration::from_millis(config.store.op_timeout_ms);

        let store: Option<Arc<dyn Store>> = self
            .store
            .map(|inner| Arc::new(BoundedStore::new(inner, op_timeout)) as Arc<dyn Store>);
        let cache_store = if config.cache.enabled { store.clone() } else { None };

        let backend = self
            .breaker_backend
            .unwrap_or_else(|| Arc::new(LocalBreakerBackend::new()));
        let breaker = Arc::new(CircuitBreaker::new(
            backend,
            Arc::clone(&self.clock),
            config.breaker.failure_threshold,
            config.breaker.reset_interval_ms,
        ));

        let dedup = Arc::new(Deduplicator::new(
            Duration::from_millis(config.dedup.window_ms),
            Duration::from_millis(config.dedup.grace_ms),
        ));
        let refresher = RefreshQueue::spawn(config.refresh.queue_capacity, self.shutdown);

        tracing::debug!(
            store = store.is_some(),
            cache = cache_store.is_some(),
            rate_limit = config.rate_limit.enabled,
            failure_threshold = config.breaker.failure_threshold,
            "Mediator assembled"
        );

        Mediator {
            rate_limiter: RateLimiter::new(store, config.rate_limit.clone()),
            executor: Executor::new(Arc::clone(&breaker)),
            breaker,
            cache: SwrCache::new(cache_store, dedup, self.clock, refresher),
            key_prefix: config.store.key_prefix,
        }
    }
}
