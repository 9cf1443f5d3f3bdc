//! Cached values and their freshness labels.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Opaque upstream payload. Shared, never mutated after creation.
pub type Payload = Arc<serde_json::Value>;

/// A value as written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Payload,
    /// Epoch millis when the value was fetched.
    pub cached_at_ms: u64,
}

#[derive(Serialize)]
struct EncodedEntry<'a> {
    value: &'a serde_json::Value,
    cached_at_ms: u64,
}

#[derive(Deserialize)]
struct DecodedEntry {
    value: serde_json::Value,
    cached_at_ms: u64,
}

impl CacheEntry {
    pub fn new(value: Payload, cached_at_ms: u64) -> Self {
        Self { value, cached_at_ms }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&EncodedEntry {
            value: &self.value,
            cached_at_ms: self.cached_at_ms,
        })
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        let decoded: DecodedEntry = serde_json::from_str(raw)?;
        Ok(Self {
            value: Arc::new(decoded.value),
            cached_at_ms: decoded.cached_at_ms,
        })
    }

    /// Milliseconds since the value was fetched.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.cached_at_ms)
    }
}

/// Freshness windows for one lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    /// Served without refresh while younger than this.
    pub fresh: Duration,
    /// Served with a background refresh while younger than this. Older
    /// entries count as absent for lookups.
    pub stale: Duration,
    /// Store expiry for written entries. Entries past `stale` but within
    /// this window remain readable as last-known-good fallbacks.
    pub retention: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            fresh: Duration::from_secs(60),
            stale: Duration::from_secs(300),
            retention: Duration::from_secs(86_400),
        }
    }
}

/// How a response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheStatus {
    #[serde(rename = "HIT")]
    Hit,
    #[serde(rename = "STALE")]
    Stale,
    #[serde(rename = "MISS")]
    Miss,
    /// No store available; fetched directly.
    #[serde(rename = "BYPASS")]
    Bypass,
    /// A store operation failed; the value came from the upstream.
    #[serde(rename = "ERROR")]
    Error,
    /// Breaker open; last known value served without contacting upstream.
    #[serde(rename = "STALE-CIRCUIT-OPEN")]
    StaleCircuitOpen,
    /// Upstream failed; last known value served instead.
    #[serde(rename = "STALE-ERROR")]
    StaleError,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
            CacheStatus::Error => "ERROR",
            CacheStatus::StaleCircuitOpen => "STALE-CIRCUIT-OPEN",
            CacheStatus::StaleError => "STALE-ERROR",
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
