//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! SwrCache::get(key, producer)
//!     → store lookup (entry.rs decodes CacheEntry)
//!     → fresh: serve; stale: serve + refresh.rs job; missing: fetch
//!     → fetches go through the Deduplicator, one store write per execution
//! ```
//!
//! # Design Decisions
//! - Cache errors never mask a successful upstream fetch
//! - Background refreshes are decoupled from the request lifecycle
//! - Entries expire from the store at the stale TTL

pub mod entry;
pub mod refresh;
pub mod swr;

pub use entry::{CacheEntry, CacheStatus, CacheTtl, Payload};
pub use refresh::RefreshQueue;
pub use swr::{Cached, Fetched, Producer, SwrCache};
