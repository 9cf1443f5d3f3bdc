//! In-process store backed by a concurrent map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::{Clock, SystemClock};
use crate::store::{Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Epoch millis after which the value is gone. `None` never expires.
    expires_at_ms: Option<u64>,
}

impl StoredValue {
    fn is_live(&self, now_ms: u64) -> bool {
        self.expires_at_ms.map_or(true, |at| now_ms < at)
    }
}

/// A thread-safe in-memory store.
///
/// Cloning shares the underlying map.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    /// Create an empty store that expires entries against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of stored keys, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.inner.len();
        self.inner.retain(|_, v| v.is_live(now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired store entries");
        }
        removed
    }

    /// Purge expired entries every `interval` until `shutdown` fires.
    ///
    /// Reads only drop the key they touch, so without this every caller
    /// that never returns leaves its keys behind.
    pub fn spawn_purger(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.purge_expired();
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Store purger received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }

    fn deadline(&self, ttl: Duration) -> u64 {
        self.clock
            .now_ms()
            .saturating_add(ttl.as_millis() as u64)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_ms();
        if let Some(entry) = self.inner.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.inner.remove_if(key, |_, v| !v.is_live(now));
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let expires_at_ms = Some(self.deadline(ttl));
        self.inner.insert(
            key.to_string(),
            StoredValue {
                value,
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<u64> {
        let now = self.clock.now_ms();
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let current: u64 =
                    occupied
                        .get()
                        .value
                        .parse()
                        .map_err(|e: std::num::ParseIntError| StoreError::Corrupt {
                            key: key.to_string(),
                            reason: e.to_string(),
                        })?;
                let next = current.saturating_add(1);
                occupied.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at_ms: None,
                });
                Ok(1)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at_ms: None,
                });
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = self.clock.now_ms();
        let deadline = self.deadline(ttl);
        match self.inner.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at_ms = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
