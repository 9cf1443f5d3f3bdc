//! Caller-facing protections.
//!
//! # Data Flow
//! ```text
//! Resolved caller identity:
//!     → identity.rs (normalize, hash to CallerKey)
//!     → rate_limit.rs (count request against the caller's window)
//!     → Pass to the mediator
//! ```
//!
//! # Design Decisions
//! - Keys derive from a fixed-output hash of the normalized identity
//! - Fail open: a broken counter store never blocks callers
//! - Increment-then-check: a rejected request still uses a slot

pub mod identity;
pub mod rate_limit;

pub use identity::CallerKey;
pub use rate_limit::{RateDecision, RateLimiter};
