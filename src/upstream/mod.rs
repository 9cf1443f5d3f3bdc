//! Upstream call types.
//!
//! The mediator never speaks HTTP itself: callers hand it a closure that
//! produces an `UpstreamResponse`. `http.rs` provides one such closure for a
//! GraphQL endpoint.

pub mod http;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::GraphqlUpstream;

/// Status and JSON body returned by the upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Transient server-side fault; worth retrying.
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// Failure to obtain any response from the upstream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}
