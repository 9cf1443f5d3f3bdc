//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream call:
//!     → circuit_breaker.rs (deny fast while open)
//!     → timeouts.rs (enforce per-attempt deadline)
//!     → On failure: retries.rs (retry 5xx/timeouts with backoff.rs delays)
//!     → circuit_breaker.rs (record final outcome)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream attempt has a deadline
//! - Client errors (4xx) are final and never retried
//! - Circuit breaker prevents cascading failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerBackend, BreakerState, BreakerStatus, CircuitBreaker, LocalBreakerBackend};
pub use retries::{Executor, RetryPolicy};
