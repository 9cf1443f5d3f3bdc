//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router, middleware stack)
//!     → request.rs (request ID, caller identity extraction)
//!     → Mediator::mediate (GraphQL upstream via reqwest)
//!     → response.rs (diagnostic headers, error → status mapping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use response::{ApiError, X_BREAKER_STATUS, X_CACHE_STATUS};
pub use server::{AppState, HttpServer};
