//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: open, but the reset interval has elapsed; requests are trials
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: reset interval elapsed since last failure (derived, not stored)
//! Half-Open → Closed: any trial succeeds
//! Half-Open → Open: any trial fails (re-arms the timer)
//! ```
//!
//! # Design Decisions
//! - One breaker per mediator, modelling upstream-wide health
//! - Permissive half-open: every request after the interval is a trial
//! - State lives behind `BreakerBackend` so it can be moved to shared storage

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::clock::Clock;
use crate::observability::metrics;

/// Stored breaker state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BreakerState {
    pub consecutive_failures: u32,
    /// Epoch millis of the most recent failure.
    pub last_failure_at_ms: Option<u64>,
    pub is_open: bool,
}

/// Externally visible breaker condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerStatus::Closed => "CLOSED",
            BreakerStatus::Open => "OPEN",
            BreakerStatus::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for BreakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage for breaker state.
///
/// `update` must apply the closure atomically with respect to every other
/// `update` and `snapshot` on the same backend.
pub trait BreakerBackend: Send + Sync {
    fn snapshot(&self) -> BreakerState;
    fn update(&self, apply: &mut dyn FnMut(&mut BreakerState));
}

/// Process-local backend.
#[derive(Debug, Default)]
pub struct LocalBreakerBackend {
    state: Mutex<BreakerState>,
}

impl LocalBreakerBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BreakerBackend for LocalBreakerBackend {
    fn snapshot(&self) -> BreakerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: &mut dyn FnMut(&mut BreakerState)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut state);
    }
}

/// Failure-counting circuit breaker.
pub struct CircuitBreaker {
    backend: Arc<dyn BreakerBackend>,
    clock: Arc<dyn Clock>,
    /// Consecutive failures before the circuit opens.
    threshold: u32,
    /// Time after the last failure before trials are let through.
    reset_interval_ms: u64,
}

impl CircuitBreaker {
    pub fn new(
        backend: Arc<dyn BreakerBackend>,
        clock: Arc<dyn Clock>,
        threshold: u32,
        reset_interval_ms: u64,
    ) -> Self {
        Self {
            backend,
            clock,
            threshold: threshold.max(1),
            reset_interval_ms,
        }
    }

    /// Whether a request may reach the upstream now.
    pub fn allow_request(&self) -> bool {
        let state = self.backend.snapshot();
        !state.is_open || self.reset_elapsed(&state)
    }

    /// Record a genuinely successful upstream response.
    pub fn record_success(&self) {
        let mut was_open = false;
        self.backend.update(&mut |state| {
            was_open = state.is_open;
            state.consecutive_failures = 0;
            state.is_open = false;
        });
        if was_open {
            tracing::info!("Circuit breaker closed after successful request");
            metrics::record_breaker_open(false);
        }
    }

    /// Record a failed upstream call (retries exhausted or final timeout).
    pub fn record_failure(&self) {
        let now = self.clock.now_ms();
        let threshold = self.threshold;
        let mut opened = false;
        let mut failures = 0;
        self.backend.update(&mut |state| {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            state.last_failure_at_ms = Some(now);
            failures = state.consecutive_failures;
            if failures >= threshold && !state.is_open {
                state.is_open = true;
                opened = true;
            }
        });
        if opened {
            tracing::warn!(
                threshold,
                failures,
                "Circuit breaker opened after reaching failure threshold"
            );
            metrics::record_breaker_open(true);
        } else {
            tracing::debug!(failures, threshold, "Circuit breaker recorded failure");
        }
    }

    /// Current condition, with half-open derived from elapsed time.
    pub fn status(&self) -> BreakerStatus {
        let state = self.backend.snapshot();
        match (state.is_open, self.reset_elapsed(&state)) {
            (false, _) => BreakerStatus::Closed,
            (true, false) => BreakerStatus::Open,
            (true, true) => BreakerStatus::HalfOpen,
        }
    }

    pub fn snapshot(&self) -> BreakerState {
        self.backend.snapshot()
    }

    fn reset_elapsed(&self, state: &BreakerState) -> bool {
        match state.last_failure_at_ms {
            Some(at) => self.clock.now_ms().saturating_sub(at) >= self.reset_interval_ms,
            None => true,
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.backend.snapshot())
            .field("threshold", &self.threshold)
            .field("reset_interval_ms", &self.reset_interval_ms)
            .finish()
    }
}
