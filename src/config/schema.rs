//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mediator.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheTtl;
use crate::mediator::MediationPolicy;
use crate::resilience::RetryPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MediatorConfig {
    /// HTTP listener for the mediator service.
    pub listener: ListenerConfig,

    /// Upstream endpoint and per-call retry settings.
    pub upstream: UpstreamConfig,

    /// Circuit breaker settings.
    pub breaker: BreakerConfig,

    /// Stale-while-revalidate cache settings.
    pub cache: CacheConfig,

    /// In-flight deduplication settings.
    pub dedup: DedupConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Counter/cache store settings.
    pub store: StoreConfig,

    /// Background refresh worker settings.
    pub refresh: RefreshConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl MediatorConfig {
    /// Per-call policy derived from the upstream and cache sections.
    pub fn policy(&self) -> MediationPolicy {
        MediationPolicy {
            retry: RetryPolicy {
                timeout: Duration::from_millis(self.upstream.timeout_ms),
                max_retries: self.upstream.max_retries,
                base_delay: Duration::from_millis(self.upstream.base_delay_ms),
                max_delay: Duration::from_millis(self.upstream.max_delay_ms),
                jitter: self.upstream.jitter,
            },
            ttl: CacheTtl {
                fresh: Duration::from_millis(self.cache.fresh_ttl_ms),
                stale: Duration::from_millis(self.cache.stale_ttl_ms),
                retention: Duration::from_millis(self.cache.retention_ttl_ms),
            },
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Header carrying the already-resolved caller identity.
    pub identity_header: String,

    /// Whole-request timeout applied by the HTTP layer, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            identity_header: "x-caller-identity".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Upstream GraphQL endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// GraphQL endpoint URL.
    pub url: String,

    /// GraphQL document sent on every lookup. Receives `$identity`.
    pub query: String,

    /// Deadline per attempt in milliseconds.
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to backoff delays.
    pub jitter: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:4000/graphql".to_string(),
            query: "query Lookup($identity: String!) { lookup(identity: $identity) }".to_string(),
            timeout_ms: 5_000,
            max_retries: 2,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failed calls before the circuit opens.
    pub failure_threshold: u32,

    /// Time after the last failure before trial requests pass, in milliseconds.
    pub reset_interval_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_interval_ms: 30_000,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching. When off, every call is a BYPASS.
    pub enabled: bool,

    /// Age below which entries are served without refresh.
    pub fresh_ttl_ms: u64,

    /// Age below which entries are served while refreshing.
    pub stale_ttl_ms: u64,

    /// How long the store keeps an entry. Entries past `stale_ttl_ms` are
    /// only used as fallbacks when the upstream fails or the breaker is open.
    pub retention_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fresh_ttl_ms: 60_000,
            stale_ttl_ms: 300_000,
            retention_ttl_ms: 86_400_000,
        }
    }
}

/// Deduplication configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DedupConfig {
    /// Maximum age of an in-flight execution that new callers may join.
    /// Must cover the executor's worst-case call duration.
    pub window_ms: u64,

    /// Delay before a finished execution is forgotten.
    pub grace_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            grace_ms: 100,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per caller per window.
    pub max_requests: u64,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Which store backs counters and cache entries.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process map.
    Memory,
    /// No store: rate limiting fails open, caching is bypassed.
    None,
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Deadline for every store operation in milliseconds.
    pub op_timeout_ms: u64,

    /// Namespace prepended to every key.
    pub key_prefix: String,

    /// How often the memory store drops expired keys, in milliseconds.
    pub purge_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            op_timeout_ms: 250,
            key_prefix: "mediator".to_string(),
            purge_interval_ms: 60_000,
        }
    }
}

/// Background refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Pending refreshes beyond this are dropped.
    pub queue_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
