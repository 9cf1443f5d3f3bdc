//! Timing-sensitive mediation behavior, driven by a manual clock and tokio's
//! paused time.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::json;

use upstream_mediator::cache::CacheStatus;
use upstream_mediator::clock::ManualClock;
use upstream_mediator::config::MediatorConfig;
use upstream_mediator::resilience::BreakerStatus;
use upstream_mediator::security::CallerKey;
use upstream_mediator::store::{MemoryStore, Store};
use upstream_mediator::{MediatorError, Mediator};

mod common;

const START_MS: u64 = 1_700_000_000_000;

fn config() -> MediatorConfig {
    let mut config = MediatorConfig::default();
    config.upstream.timeout_ms = 500;
    config.upstream.max_retries = 1;
    config.upstream.base_delay_ms = 10;
    config.upstream.max_delay_ms = 10;
    config.upstream.jitter = false;
    config.cache.fresh_ttl_ms = 1_000;
    config.cache.stale_ttl_ms = 60_000;
    config.cache.retention_ttl_ms = 600_000;
    config.breaker.failure_threshold = 1;
    config.breaker.reset_interval_ms = 5_000;
    config.dedup.grace_ms = 10;
    config
}

fn build(config: &MediatorConfig, clock: &Arc<ManualClock>, store: Arc<dyn Store>) -> Mediator {
    Mediator::builder()
        .config(config)
        .clock(clock.clone())
        .store(store)
        .build()
}

fn memory_mediator(config: &MediatorConfig) -> (Mediator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    (build(config, &clock, store), clock)
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_upstream_call() {
    let config = config();
    let (mediator, _clock) = memory_mediator(&config);
    let policy = config.policy();
    let caller = CallerKey::from_identity("alice");
    let (upstream, calls) = common::slow_upstream(Duration::from_millis(100), json!({"name": "alice"}));

    let results = join_all((0..10).map(|_| mediator.mediate(&caller, upstream.clone(), &policy))).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        let mediated = result.as_ref().unwrap();
        assert_eq!(mediated.cache_status, CacheStatus::Miss);
        assert!(Arc::ptr_eq(&mediated.value, &first.value));
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_entry_refreshes_in_background() {
    let config = config();
    let (mediator, clock) = memory_mediator(&config);
    let policy = config.policy();
    let caller = CallerKey::from_identity("bob");
    let (upstream, calls) = common::flaky_upstream(0, 200);

    let first = mediator.mediate(&caller, upstream.clone(), &policy).await.unwrap();
    assert_eq!(first.cache_status, CacheStatus::Miss);
    tokio::time::sleep(Duration::from_millis(20)).await;

    clock.advance_ms(2_000);
    let stale = mediator.mediate(&caller, upstream.clone(), &policy).await.unwrap();
    assert_eq!(stale.cache_status, CacheStatus::Stale);
    assert_eq!(*stale.value, json!({"call": 0}));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let fresh = mediator.mediate(&caller, upstream, &policy).await.unwrap();
    assert_eq!(fresh.cache_status, CacheStatus::Hit);
    assert_eq!(*fresh.value, json!({"call": 1}));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_stale_hits_trigger_one_refresh() {
    let config = config();
    let (mediator, clock) = memory_mediator(&config);
    let policy = config.policy();
    let caller = CallerKey::from_identity("bea");
    let (upstream, calls) = common::flaky_upstream(0, 200);

    mediator.mediate(&caller, upstream.clone(), &policy).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    clock.advance_ms(1_001);
    let results = join_all((0..10).map(|_| mediator.mediate(&caller, upstream.clone(), &policy))).await;
    for result in &results {
        let mediated = result.as_ref().unwrap();
        assert_eq!(mediated.cache_status, CacheStatus::Stale);
        assert_eq!(*mediated.value, json!({"call": 0}));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2, "One background refresh for all stale hits");
}

#[tokio::test(start_paused = true)]
async fn test_upstream_failure_past_stale_window_serves_retained_entry() {
    let config = config();
    let (mediator, clock) = memory_mediator(&config);
    let policy = config.policy();
    let caller = CallerKey::from_identity("hana");
    let (upstream, _) = common::flaky_upstream(0, 200);

    mediator.mediate(&caller, upstream, &policy).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    clock.advance_ms(60_001);
    let (failing, calls) = common::flaky_upstream(u32::MAX, 503);
    let served = mediator.mediate(&caller, failing, &policy).await.unwrap();
    assert_eq!(served.cache_status, CacheStatus::StaleError);
    assert_eq!(*served.value, json!({"call": 0}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_retries_and_open_breaker() {
    let config = config();
    let (mediator, clock) = memory_mediator(&config);
    let policy = config.policy();
    let caller = CallerKey::from_identity("carol");
    let (slow, calls) = common::slow_upstream(Duration::from_secs(10), json!(null));

    let err = mediator.mediate(&caller, slow, &policy).await.unwrap_err();
    assert_eq!(
        err,
        MediatorError::UpstreamUnavailable {
            attempts: 2,
            last: Box::new(MediatorError::Timeout { timeout_ms: 500 }),
        }
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(mediator.breaker_status(), BreakerStatus::Open);

    clock.advance_ms(5_001);
    assert_eq!(mediator.breaker_status(), BreakerStatus::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_trial_success_closes_breaker() {
    let config = config();
    let (mediator, clock) = memory_mediator(&config);
    let policy = config.policy();
    let (failing, _) = common::flaky_upstream(u32::MAX, 503);

    mediator
        .mediate(&CallerKey::from_identity("dave"), failing, &policy)
        .await
        .unwrap_err();
    assert_eq!(mediator.breaker_status(), BreakerStatus::Open);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Still open: denied without an upstream call.
    let (healthy, calls) = common::flaky_upstream(0, 200);
    let err = mediator
        .mediate(&CallerKey::from_identity("erin"), healthy.clone(), &policy)
        .await
        .unwrap_err();
    assert_eq!(err, MediatorError::BreakerOpen);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;

    clock.advance_ms(5_001);
    let served = mediator
        .mediate(&CallerKey::from_identity("erin"), healthy, &policy)
        .await
        .unwrap();
    assert_eq!(served.cache_status, CacheStatus::Miss);
    assert_eq!(served.breaker_status, BreakerStatus::Closed);
    assert_eq!(mediator.breaker_snapshot().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_failing_store_degrades_without_failing_requests() {
    let mut config = config();
    config.rate_limit.max_requests = 1;
    let clock = Arc::new(ManualClock::new(START_MS));
    let mediator = build(&config, &clock, Arc::new(common::FailingStore));
    let policy = config.policy();
    let caller = CallerKey::from_identity("frank");
    let (upstream, calls) = common::flaky_upstream(0, 200);

    for _ in 0..2 {
        let served = mediator.mediate(&caller, upstream.clone(), &policy).await.unwrap();
        assert_eq!(served.cache_status, CacheStatus::Bypass);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2, "Rate limiter fails open on store errors");
}
