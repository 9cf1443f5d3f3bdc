//! Resilient upstream call mediator.
//!
//! Wraps calls to a slow or unreliable upstream with per-caller rate
//! limiting, a circuit breaker, per-attempt timeouts with retry, in-flight
//! deduplication and a stale-while-revalidate cache.

// Core
pub mod cache;
pub mod clock;
pub mod dedup;
pub mod error;
pub mod mediator;
pub mod resilience;
pub mod security;
pub mod store;
pub mod upstream;

// Service glue
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::MediatorConfig;
pub use error::{MediatorError, MediatorResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use mediator::{Mediated, MediationPolicy, Mediator};
