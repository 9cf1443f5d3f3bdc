//! Fixed-window rate limiting over the shared counter store.
//!
//! The counter is incremented before the limit is compared, so a rejected
//! request still consumes its slot for the rest of the window.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::store::{Store, StoreResult};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Post-increment count, or 0 when the limiter failed open.
    pub count: u64,
    pub limit: u64,
}

/// Per-key request counter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn Store>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Option<Arc<dyn Store>>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// Count one request against `key`.
    ///
    /// Never blocks the caller on store failure: a missing or failing store
    /// allows the request with a count of 0.
    pub async fn check(&self, key: &str) -> RateDecision {
        let limit = self.config.max_requests;
        let fail_open = RateDecision {
            allowed: true,
            count: 0,
            limit,
        };

        if !self.config.enabled {
            return fail_open;
        }
        let Some(store) = &self.store else {
            tracing::debug!("No counter store, rate limiting bypassed");
            return fail_open;
        };

        match self.increment(store.as_ref(), key).await {
            Ok(count) => {
                let allowed = count <= limit;
                if !allowed {
                    tracing::warn!(key = %key, count, limit, "Rate limit exceeded");
                    metrics::record_rate_limited();
                }
                RateDecision {
                    allowed,
                    count,
                    limit,
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Rate limiter store failed, failing open");
                fail_open
            }
        }
    }

    async fn increment(&self, store: &dyn Store, key: &str) -> StoreResult<u64> {
        let count = store.incr(key).await?;
        if count == 1 {
            store
                .expire(key, Duration::from_secs(self.config.window_secs))
                .await?;
        }
        Ok(count)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("has_store", &self.store.is_some())
            .field("config", &self.config)
            .finish()
    }
}
