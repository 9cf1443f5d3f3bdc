//! Counter/cache store subsystem.
//!
//! # Data Flow
//! ```text
//! rate limiter ──incr/expire──┐
//!                             ├──▶ BoundedStore (per-op deadline, metrics)
//! swr cache ────get/set_ex────┘         │
//!                                       ▼
//!                               dyn Store (memory.rs, or an external store)
//! ```
//!
//! # Design Decisions
//! - The store is reached over a network-like interface and may be absent;
//!   the mediator holds it as `Option<Arc<dyn Store>>`
//! - Every operation is bounded by a short timeout
//! - Callers absorb `StoreError`; it never fails a request

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;

use crate::error::MediatorError;
use crate::observability::metrics;

pub use memory::MemoryStore;

/// Errors returned by store backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its deadline.
    #[error("store {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    /// Stored value could not be interpreted.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/value store with expiring entries and counters.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Increment the integer counter at `key`, creating it at 1.
    /// Returns the post-increment value.
    async fn incr(&self, key: &str) -> StoreResult<u64>;

    /// Arm an expiry on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;
}

/// Wraps a store so that every operation has a hard deadline.
pub struct BoundedStore {
    inner: Arc<dyn Store>,
    op_timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn Store>, op_timeout: Duration) -> Self {
        Self { inner, op_timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>> + Send,
    {
        let result = match timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        };
        if let Err(e) = &result {
            let err = MediatorError::from(e.clone());
            tracing::debug!(op, kind = err.kind(), error = %err, "Store operation failed");
            metrics::record_store_error(op);
        }
        result
    }
}

#[async_trait]
impl Store for BoundedStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.bounded("set_ex", self.inner.set_ex(key, value, ttl)).await
    }

    async fn incr(&self, key: &str) -> StoreResult<u64> {
        self.bounded("incr", self.inner.incr(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.bounded("expire", self.inner.expire(key, ttl)).await
    }
}

impl std::fmt::Debug for BoundedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedStore")
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}
