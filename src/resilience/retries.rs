//! Timeout-and-retry executor.
//!
//! # Responsibilities
//! - Short-circuit when the breaker denies the call
//! - Bound every attempt with a deadline
//! - Retry timeouts, transport errors and 5xx with exponential backoff
//! - Record the final outcome on the breaker
//!
//! # Design Decisions
//! - 4xx responses are returned to the caller untouched and never retried;
//!   they say nothing about upstream health, so the breaker is not updated
//! - A success status with an undecodable body is not retried but counts as
//!   a breaker failure
//! - Only the final outcome of a call reaches the breaker, not each attempt

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{MediatorError, MediatorResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::timeouts::with_deadline;
use crate::upstream::{UpstreamError, UpstreamResponse};

/// Per-call retry settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Deadline for each individual attempt.
    pub timeout: Duration,
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Longest time one `Executor::call` can take: every attempt hits its
    /// deadline and every backoff takes its full delay, jitter included.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let mut total = self.timeout.saturating_mul(attempts);
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        for attempt in 1..attempts {
            let delay_ms = base_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1))
                .min(max_ms);
            let jitter_ms = if self.jitter { delay_ms / 10 } else { 0 };
            total = total.saturating_add(Duration::from_millis(delay_ms + jitter_ms));
        }
        total
    }
}

/// Runs upstream calls under the breaker, deadline and retry policy.
#[derive(Debug, Clone)]
pub struct Executor {
    breaker: Arc<CircuitBreaker>,
}

impl Executor {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Call the upstream until it succeeds, fails non-retryably, or the
    /// attempts run out.
    pub async fn call<F, Fut>(&self, upstream: F, policy: &RetryPolicy) -> MediatorResult<UpstreamResponse>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<UpstreamResponse, UpstreamError>>,
    {
        if !self.breaker.allow_request() {
            tracing::debug!("Circuit open, skipping upstream call");
            metrics::record_upstream_attempt("breaker_open");
            return Err(MediatorError::BreakerOpen);
        }

        let max_attempts = policy.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match with_deadline(policy.timeout, upstream()).await {
                Ok(Ok(response)) => classify(response),
                Ok(Err(UpstreamError::Transport(e))) => Err(MediatorError::Transport(e)),
                Ok(Err(UpstreamError::Decode(e))) => Err(MediatorError::InvalidResponse(e)),
                Err(timeout) => Err(timeout),
            };

            match outcome {
                Ok(response) => {
                    metrics::record_upstream_attempt("success");
                    self.breaker.record_success();
                    if attempt > 1 {
                        tracing::info!(attempt, status = response.status, "Upstream recovered after retry");
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => {
                    metrics::record_upstream_attempt(err.kind());
                    if matches!(err, MediatorError::InvalidResponse(_)) {
                        tracing::warn!(attempt, error = %err, "Upstream answered with an unreadable body");
                        self.breaker.record_failure();
                    } else {
                        tracing::debug!(attempt, error = %err, "Upstream returned non-retryable error");
                    }
                    return Err(err);
                }
                Err(err) => {
                    metrics::record_upstream_attempt(err.kind());

                    if attempt >= max_attempts {
                        tracing::warn!(attempts = attempt, error = %err, "Upstream retries exhausted");
                        self.breaker.record_failure();
                        return Err(MediatorError::UpstreamUnavailable {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let backoff = calculate_backoff(
                        attempt,
                        policy.base_delay.as_millis() as u64,
                        policy.max_delay.as_millis() as u64,
                        policy.jitter,
                    );
                    tracing::info!(attempt, delay = ?backoff, error = %err, "Retrying upstream call");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn classify(response: UpstreamResponse) -> MediatorResult<UpstreamResponse> {
    if response.is_server_error() {
        Err(MediatorError::UpstreamServerError {
            status: response.status,
            body: response.body,
        })
    } else if response.is_client_error() {
        Err(MediatorError::UpstreamClientError {
            status: response.status,
            body: response.body,
        })
    } else {
        Ok(response)
    }
}
