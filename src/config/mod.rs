//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MediatorConfig (validated, immutable)
//!     → policy() for per-call settings, sections for component wiring
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    BreakerConfig, CacheConfig, DedupConfig, ListenerConfig, LogFormat, MediatorConfig,
    ObservabilityConfig, RateLimitConfig, RefreshConfig, StoreBackend, StoreConfig,
    UpstreamConfig,
};
