//! Upstream call mediation.
//!
//! # Data Flow
//! ```text
//! mediate(caller, upstream, policy)
//!     → rate limiter (increment, then compare)      → RateLimited
//!     → breaker open? serve any stored entry        → STALE-CIRCUIT-OPEN
//!     → SWR cache lookup
//!         → miss/stale: deduplicated executor call (timeout, retry, breaker)
//!     → lookup failed? serve any stored entry       → STALE-ERROR
//!     → otherwise propagate the error
//! ```

mod builder;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use serde::Serialize;

use crate::cache::{CacheStatus, CacheTtl, Payload, Producer, SwrCache};
use crate::error::{MediatorError, MediatorResult};
use crate::observability::metrics;
use crate::resilience::{BreakerState, BreakerStatus, CircuitBreaker, Executor, RetryPolicy};
use crate::security::{CallerKey, RateLimiter};
use crate::upstream::{UpstreamError, UpstreamResponse};

pub use builder::MediatorBuilder;

/// Per-call settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediationPolicy {
    pub retry: RetryPolicy,
    pub ttl: CacheTtl,
}

/// A successful mediation.
#[derive(Debug, Clone)]
pub struct Mediated {
    pub value: Payload,
    pub cache_status: CacheStatus,
    /// Breaker status observed when the response was produced.
    pub breaker_status: BreakerStatus,
}

/// Point-in-time view of the mediator for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub breaker: BreakerStatus,
    pub consecutive_failures: u32,
    pub in_flight: usize,
    pub cache_enabled: bool,
}

/// Wraps upstream calls with rate limiting, caching, deduplication and
/// failure handling.
pub struct Mediator {
    rate_limiter: RateLimiter,
    breaker: Arc<CircuitBreaker>,
    executor: Executor,
    cache: SwrCache,
    key_prefix: String,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::default()
    }

    /// Mediate one call on behalf of `caller`.
    ///
    /// `upstream` may be invoked several times (retries, later refreshes) or
    /// not at all (cache hit, joined execution, open breaker).
    pub async fn mediate<F, Fut>(
        &self,
        caller: &CallerKey,
        upstream: F,
        policy: &MediationPolicy,
    ) -> MediatorResult<Mediated>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'static,
    {
        let start = Instant::now();
        let result = self.mediate_inner(caller, upstream, policy).await;
        match &result {
            Ok(mediated) => metrics::record_request(mediated.cache_status.as_str(), start),
            Err(e) => metrics::record_request(e.kind(), start),
        }
        result
    }

    async fn mediate_inner<F, Fut>(
        &self,
        caller: &CallerKey,
        upstream: F,
        policy: &MediationPolicy,
    ) -> MediatorResult<Mediated>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'static,
    {
        let decision = self
            .rate_limiter
            .check(&caller.scoped(&self.key_prefix, "rate"))
            .await;
        if !decision.allowed {
            return Err(MediatorError::RateLimited {
                count: decision.count,
                limit: decision.limit,
            });
        }

        let cache_key = caller.scoped(&self.key_prefix, "cache");

        if self.breaker.status() == BreakerStatus::Open {
            if let Some(entry) = self.cache.read_raw(&cache_key).await {
                tracing::debug!(caller = %caller, "Circuit open, serving stored entry");
                return Ok(self.envelope(entry.value, CacheStatus::StaleCircuitOpen));
            }
            tracing::debug!(caller = %caller, "Circuit open, no stored entry to fall back on");
        }

        let producer = self.producer(upstream, policy.retry.clone());
        match self.cache.get(&cache_key, producer, &policy.ttl).await {
            Ok(cached) => Ok(self.envelope(cached.value, cached.status)),
            Err(err) => match self.cache.read_raw(&cache_key).await {
                Some(entry) => {
                    tracing::warn!(caller = %caller, error = %err, "Upstream failed, serving stored entry");
                    Ok(self.envelope(entry.value, CacheStatus::StaleError))
                }
                None => {
                    tracing::warn!(caller = %caller, error = %err, "Upstream failed with no fallback");
                    Err(err)
                }
            },
        }
    }

    /// Adapt the caller's upstream closure into a cache producer that runs
    /// through the resilient executor.
    fn producer<F, Fut>(&self, upstream: F, retry: RetryPolicy) -> Producer
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'static,
    {
        let executor = self.executor.clone();
        let upstream = Arc::new(upstream);
        Arc::new(move || {
            let executor = executor.clone();
            let upstream = Arc::clone(&upstream);
            let retry = retry.clone();
            async move {
                let response = executor.call(|| (upstream.as_ref())(), &retry).await?;
                Ok(Arc::new(response.body))
            }
            .boxed()
        })
    }

    fn envelope(&self, value: Payload, cache_status: CacheStatus) -> Mediated {
        Mediated {
            value,
            cache_status,
            breaker_status: self.breaker.status(),
        }
    }

    pub fn breaker_status(&self) -> BreakerStatus {
        self.breaker.status()
    }

    pub fn breaker_snapshot(&self) -> BreakerState {
        self.breaker.snapshot()
    }

    pub fn in_flight_count(&self) -> usize {
        self.cache.in_flight()
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.breaker.snapshot();
        HealthReport {
            breaker: self.breaker.status(),
            consecutive_failures: snapshot.consecutive_failures,
            in_flight: self.cache.in_flight(),
            cache_enabled: self.cache.has_store(),
        }
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("breaker", &self.breaker)
            .field("cache", &self.cache)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}
