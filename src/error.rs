//! Error taxonomy for mediated upstream calls.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can surface from a mediated call.
///
/// `Clone` so that one deduplicated execution can hand the identical failure
/// to every caller that joined it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MediatorError {
    /// Caller exceeded its request budget for the current window.
    #[error("rate limited: {count} requests in window (limit {limit})")]
    RateLimited { count: u64, limit: u64 },

    /// Circuit breaker is open; the upstream was not contacted.
    #[error("circuit breaker open")]
    BreakerOpen,

    /// A single attempt exceeded its deadline.
    #[error("upstream attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Upstream rejected the request (4xx). Never retried.
    #[error("upstream client error: status {status}")]
    UpstreamClientError {
        status: u16,
        body: serde_json::Value,
    },

    /// Upstream failed server-side (5xx).
    #[error("upstream server error: status {status}")]
    UpstreamServerError {
        status: u16,
        body: serde_json::Value,
    },

    /// The upstream call failed before producing a response.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// Upstream answered with a success status but a body that could not be
    /// decoded. Not retried.
    #[error("upstream returned an unreadable body: {0}")]
    InvalidResponse(String),

    /// All attempts failed; carries the last observed error.
    #[error("upstream unavailable after {attempts} attempts: {last}")]
    UpstreamUnavailable {
        attempts: u32,
        #[source]
        last: Box<MediatorError>,
    },

    /// Backing store could not be used.
    ///
    /// Never returned from a mediation: callers degrade instead (fail-open
    /// rate limiting, BYPASS or ERROR cache status). `BoundedStore` reports
    /// failed operations under this variant's label.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl MediatorError {
    /// Short machine-readable label, used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MediatorError::RateLimited { .. } => "rate_limited",
            MediatorError::BreakerOpen => "breaker_open",
            MediatorError::Timeout { .. } => "timeout",
            MediatorError::UpstreamClientError { .. } => "client_error",
            MediatorError::UpstreamServerError { .. } => "server_error",
            MediatorError::Transport(_) => "transport",
            MediatorError::InvalidResponse(_) => "invalid_response",
            MediatorError::UpstreamUnavailable { .. } => "unavailable",
            MediatorError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    /// Whether another attempt against the upstream may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediatorError::Timeout { .. }
                | MediatorError::UpstreamServerError { .. }
                | MediatorError::Transport(_)
        )
    }
}

/// Result type for mediated operations.
pub type MediatorResult<T> = Result<T, MediatorError>;
