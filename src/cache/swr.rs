//! Stale-while-revalidate cache over the shared store.
//!
//! # Policy by entry age
//! ```text
//! no entry / age >= stale  → deduplicated fetch, write entry   → MISS
//! age < fresh              → stored value                      → HIT
//! fresh <= age < stale     → stored value + background refresh → STALE
//! no store / read failed   → deduplicated fetch, no write      → BYPASS
//! write after fetch failed → fetched value still returned      → ERROR
//! ```
//!
//! Entries are written with the retention TTL, which outlives `stale`, so an
//! entry too old to serve can still be read back by `read_raw` as a fallback.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::cache::entry::{CacheEntry, CacheStatus, CacheTtl, Payload};
use crate::cache::refresh::RefreshQueue;
use crate::clock::Clock;
use crate::dedup::Deduplicator;
use crate::error::{MediatorError, MediatorResult};
use crate::store::Store;

/// Produces a fresh payload from the upstream. Called at most once per
/// deduplicated execution.
pub type Producer = Arc<dyn Fn() -> BoxFuture<'static, MediatorResult<Payload>> + Send + Sync>;

/// Result of one deduplicated fetch.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub value: Payload,
    /// `false` when the store write failed or was not possible.
    pub stored: bool,
}

/// A value and how it was obtained.
#[derive(Debug, Clone)]
pub struct Cached {
    pub value: Payload,
    pub status: CacheStatus,
}

/// What a fetch needs, cloneable into background jobs.
#[derive(Clone)]
struct FetchContext {
    dedup: Arc<Deduplicator<MediatorResult<Fetched>>>,
    clock: Arc<dyn Clock>,
}

impl FetchContext {
    /// Run the producer through the deduplicator. Only the execution that
    /// wins the key writes the store.
    async fn fetch(
        &self,
        key: &str,
        producer: Producer,
        store: Option<Arc<dyn Store>>,
        retention: Duration,
    ) -> MediatorResult<Fetched> {
        let clock = Arc::clone(&self.clock);
        let owned_key = key.to_string();
        self.dedup
            .run(key, move || async move {
                let value = producer().await?;
                let stored = match store {
                    Some(store) => {
                        let entry = CacheEntry::new(Arc::clone(&value), clock.now_ms());
                        write_entry(store.as_ref(), &owned_key, &entry, retention).await
                    }
                    None => false,
                };
                Ok::<_, MediatorError>(Fetched { value, stored })
            })
            .await
    }
}

async fn write_entry(store: &dyn Store, key: &str, entry: &CacheEntry, ttl: Duration) -> bool {
    let raw = match entry.encode() {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to encode cache entry");
            return false;
        }
    };
    match store.set_ex(key, raw, ttl).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to write cache entry");
            false
        }
    }
}

/// SWR cache. Owns the deduplicator that all fetches go through.
pub struct SwrCache {
    store: Option<Arc<dyn Store>>,
    ctx: FetchContext,
    refresher: RefreshQueue,
}

impl SwrCache {
    pub fn new(
        store: Option<Arc<dyn Store>>,
        dedup: Arc<Deduplicator<MediatorResult<Fetched>>>,
        clock: Arc<dyn Clock>,
        refresher: RefreshQueue,
    ) -> Self {
        Self {
            store,
            ctx: FetchContext { dedup, clock },
            refresher,
        }
    }

    /// Look up `key`, fetching or refreshing through `producer` as needed.
    pub async fn get(&self, key: &str, producer: Producer, ttl: &CacheTtl) -> MediatorResult<Cached> {
        let Some(store) = &self.store else {
            return self.bypass(key, producer, ttl).await;
        };

        let entry = match store.get(key).await {
            Ok(Some(raw)) => match CacheEntry::decode(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, bypassing store");
                return self.bypass(key, producer, ttl).await;
            }
        };

        if let Some(entry) = entry {
            let age_ms = entry.age_ms(self.ctx.clock.now_ms());
            if age_ms < ttl.fresh.as_millis() as u64 {
                return Ok(Cached {
                    value: entry.value,
                    status: CacheStatus::Hit,
                });
            }
            if age_ms < ttl.stale.as_millis() as u64 {
                tracing::debug!(key = %key, age_ms, "Serving stale entry, scheduling refresh");
                self.schedule_refresh(key, producer, Arc::clone(store), retention(ttl));
                return Ok(Cached {
                    value: entry.value,
                    status: CacheStatus::Stale,
                });
            }
        }

        let fetched = self
            .ctx
            .fetch(key, producer, Some(Arc::clone(store)), retention(ttl))
            .await?;
        let status = if fetched.stored {
            CacheStatus::Miss
        } else {
            CacheStatus::Error
        };
        Ok(Cached {
            value: fetched.value,
            status,
        })
    }

    /// Fetch without touching the store.
    async fn bypass(&self, key: &str, producer: Producer, ttl: &CacheTtl) -> MediatorResult<Cached> {
        let fetched = self.ctx.fetch(key, producer, None, retention(ttl)).await?;
        Ok(Cached {
            value: fetched.value,
            status: CacheStatus::Bypass,
        })
    }

    /// Read the stored entry directly, ignoring age. `None` on any failure.
    pub async fn read_raw(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(raw)) => CacheEntry::decode(&raw).ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Raw cache read failed");
                None
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.ctx.dedup.in_flight()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    fn schedule_refresh(&self, key: &str, producer: Producer, store: Arc<dyn Store>, retention: Duration) {
        let ctx = self.ctx.clone();
        let key = key.to_string();
        let job = async move {
            match ctx.fetch(&key, producer, Some(store), retention).await {
                Ok(fetched) if fetched.stored => {
                    tracing::debug!(key = %key, "Background refresh stored new value");
                }
                Ok(_) => {
                    tracing::warn!(key = %key, "Background refresh fetched but could not store");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Background refresh failed");
                }
            }
        }
        .boxed();
        self.refresher.submit(job);
    }
}

/// Store expiry for a write; never shorter than the stale window.
fn retention(ttl: &CacheTtl) -> Duration {
    ttl.retention.max(ttl.stale)
}

impl std::fmt::Debug for SwrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwrCache")
            .field("has_store", &self.store.is_some())
            .field("dedup", &self.ctx.dedup)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Harness {
        cache: SwrCache,
        clock: Arc<ManualClock>,
        calls: Arc<AtomicU32>,
        producer: Producer,
    }

    fn harness(with_store: bool) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store: Option<Arc<dyn Store>> = if with_store {
            Some(Arc::new(MemoryStore::new(clock.clone())))
        } else {
            None
        };
        harness_with(store, clock)
    }

    fn harness_with(store: Option<Arc<dyn Store>>, clock: Arc<ManualClock>) -> Harness {
        let dedup = Arc::new(Deduplicator::new(
            Duration::from_secs(10),
            Duration::from_millis(1),
        ));
        let cache = SwrCache::new(store, dedup, clock.clone(), RefreshQueue::spawn(8, None));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let producer: Producer = Arc::new(move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, MediatorError>(Arc::new(json!({ "version": n }))) }.boxed()
        });
        Harness {
            cache,
            clock,
            calls,
            producer,
        }
    }

    fn ttl() -> CacheTtl {
        CacheTtl {
            fresh: Duration::from_millis(1_000),
            stale: Duration::from_millis(5_000),
            retention: Duration::from_millis(60_000),
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let h = harness(true);
        let first = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(first.status, CacheStatus::Miss);
        assert_eq!(*first.value, json!({"version": 0}));

        h.clock.advance_ms(999);
        let second = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(second.status, CacheStatus::Hit);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let h = harness(true);
        h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        // let the first execution leave the in-flight registry
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.cache.in_flight(), 0);
        h.clock.advance_ms(5_001);
        // Too old to serve, still retained for fallbacks.
        let retained = h.cache.read_raw("k").await.unwrap();
        assert_eq!(*retained.value, json!({"version": 0}));

        let again = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(again.status, CacheStatus::Miss);
        assert_eq!(*again.value, json!({"version": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_from_store_after_retention() {
        let h = harness(true);
        h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        h.clock.advance_ms(59_999);
        assert!(h.cache.read_raw("k").await.is_some());
        h.clock.advance_ms(1);
        assert!(h.cache.read_raw("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_window_boundary() {
        let h = harness(true);
        h.cache.get("a", h.producer.clone(), &ttl()).await.unwrap();
        h.cache.get("b", h.producer.clone(), &ttl()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.clock.advance_ms(999);
        let hit = h.cache.get("a", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(hit.status, CacheStatus::Hit);

        h.clock.advance_ms(1);
        let at_fresh = h.cache.get("a", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(at_fresh.status, CacheStatus::Stale);

        h.clock.advance_ms(1);
        let past_fresh = h.cache.get("b", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(past_fresh.status, CacheStatus::Stale);
        assert_eq!(*past_fresh.value, json!({"version": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_window_boundary() {
        let h = harness(true);
        h.cache.get("a", h.producer.clone(), &ttl()).await.unwrap();
        h.cache.get("b", h.producer.clone(), &ttl()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.clock.advance_ms(4_999);
        let stale = h.cache.get("a", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(stale.status, CacheStatus::Stale);

        h.clock.advance_ms(1);
        let expired = h.cache.get("b", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(expired.status, CacheStatus::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stale_hits_refresh_once() {
        let h = harness(true);
        h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.clock.advance_ms(2_000);
        let ttl = ttl();
        let results = futures_util::future::join_all(
            (0..10).map(|_| h.cache.get("k", h.producer.clone(), &ttl)),
        )
        .await;
        for result in results {
            let cached = result.unwrap();
            assert_eq!(cached.status, CacheStatus::Stale);
            assert_eq!(*cached.value, json!({"version": 0}));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*h.cache.read_raw("k").await.unwrap().value, json!({"version": 1}));
    }

    #[tokio::test]
    async fn test_without_store_bypasses() {
        let h = harness(false);
        let first = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(first.status, CacheStatus::Bypass);
        assert!(h.cache.read_raw("k").await.is_none());
        assert!(!h.cache.has_store());
    }

    #[tokio::test]
    async fn test_producer_error_propagates_on_miss() {
        let h = harness(true);
        let failing: Producer = Arc::new(|| async { Err::<Payload, _>(MediatorError::BreakerOpen) }.boxed());
        let err = h.cache.get("k", failing, &ttl()).await.unwrap_err();
        assert_eq!(err, MediatorError::BreakerOpen);
        assert!(h.cache.read_raw("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_and_refreshed_in_background() {
        let h = harness(true);
        h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.clock.advance_ms(2_000);
        let stale = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(stale.status, CacheStatus::Stale);
        assert_eq!(*stale.value, json!({"version": 0}));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
        let refreshed = h.cache.read_raw("k").await.unwrap();
        assert_eq!(*refreshed.value, json!({"version": 1}));
        assert_eq!(refreshed.cached_at_ms, 1_002_000);
    }

    struct UnreachableStore;

    #[async_trait]
    impl Store for UnreachableStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn incr(&self, _key: &str) -> StoreResult<u64> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Reads work, writes are rejected.
    struct ReadOnlyStore(MemoryStore);

    #[async_trait]
    impl Store for ReadOnlyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.0.get(key).await
        }
        async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
            Err(StoreError::Timeout {
                op: "set_ex",
                timeout_ms: 250,
            })
        }
        async fn incr(&self, key: &str) -> StoreResult<u64> {
            self.0.incr(key).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
            self.0.expire(key, ttl).await
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_bypasses() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let h = harness_with(Some(Arc::new(UnreachableStore)), clock);
        let cached = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(cached.status, CacheStatus::Bypass);
        assert_eq!(*cached.value, json!({"version": 0}));
        assert!(h.cache.read_raw("k").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_after_fetch_is_error() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = ReadOnlyStore(MemoryStore::new(clock.clone()));
        let h = harness_with(Some(Arc::new(store)), clock);
        let cached = h.cache.get("k", h.producer.clone(), &ttl()).await.unwrap();
        assert_eq!(cached.status, CacheStatus::Error);
        assert_eq!(*cached.value, json!({"version": 0}));
    }
}
