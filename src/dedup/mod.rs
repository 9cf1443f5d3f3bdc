//! In-flight request deduplication.
//!
//! # Data Flow
//! ```text
//! run(key, producer)
//!     → registry entry for key younger than window? join its shared future
//!     → otherwise: wrap producer() in a shared future, register it,
//!       spawn a driver that polls it to completion
//!     → driver: completion → sleep(grace) → remove entry (if still ours)
//! ```
//!
//! # Design Decisions
//! - DashMap entry API gives atomic insert-if-absent per key; unrelated keys
//!   only contend on their shard
//! - Every joiner receives a clone of the one output, so `Arc` payloads are
//!   pointer-identical across callers
//! - The driver task keeps the producer running even if every caller goes
//!   away, which is what background refreshes rely on
//! - Removal checks the entry id so a replacement is never evicted by the
//!   previous generation's driver

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use crate::observability::metrics;

type SharedOutput<T> = Shared<BoxFuture<'static, T>>;

struct InFlightEntry<T> {
    id: u64,
    future: SharedOutput<T>,
    started_at: Instant,
}

/// Collapses concurrent runs for the same key into one execution.
pub struct Deduplicator<T> {
    inflight: Arc<DashMap<String, InFlightEntry<T>>>,
    next_id: AtomicU64,
    /// Maximum age of an entry that new callers may still join.
    window: Duration,
    /// How long a finished entry lingers to absorb near-simultaneous callers.
    grace: Duration,
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration, grace: Duration) -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            window,
            grace,
        }
    }

    /// Run `producer` for `key`, or join the execution already in flight.
    ///
    /// `producer` is only called when a new execution starts. It is invoked
    /// while the key's registry slot is held, so it must only build the
    /// future and do its work inside it.
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (future, joined) = self.join_or_start(key, producer);
        if joined {
            tracing::debug!(key = %key, "Joined in-flight request");
        } else {
            metrics::record_inflight(self.inflight.len());
        }
        future.await
    }

    /// Number of registered executions, including those in their grace period.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    fn join_or_start<F, Fut>(&self, key: &str, producer: F) -> (SharedOutput<T>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let now = Instant::now();
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied)
                if now.duration_since(occupied.get().started_at) < self.window =>
            {
                (occupied.get().future.clone(), true)
            }
            entry => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let future = producer().boxed().shared();
                let record = InFlightEntry {
                    id,
                    future: future.clone(),
                    started_at: now,
                };
                match entry {
                    Entry::Occupied(mut occupied) => {
                        tracing::debug!(key = %key, "Replacing in-flight entry older than window");
                        occupied.insert(record);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(record);
                    }
                }
                self.spawn_driver(key.to_string(), id, future.clone());
                (future, false)
            }
        }
    }

    fn spawn_driver(&self, key: String, id: u64, future: SharedOutput<T>) {
        let registry = Arc::clone(&self.inflight);
        let grace = self.grace;
        tokio::spawn(async move {
            let _ = future.await;
            tokio::time::sleep(grace).await;
            registry.remove_if(&key, |_, entry| entry.id == id);
            metrics::record_inflight(registry.len());
        });
    }
}

impl<T> std::fmt::Debug for Deduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("in_flight", &self.inflight.len())
            .field("window", &self.window)
            .field("grace", &self.grace)
            .finish()
    }
}
