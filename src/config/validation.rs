//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and cross-field rules.
//! Every problem is reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{MediatorConfig, StoreBackend};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &MediatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.identity_header.trim().is_empty() {
        errors.push(ValidationError::new("listener.identity_header", "must not be empty"));
    }

    if let Err(e) = url::Url::parse(&config.upstream.url) {
        errors.push(ValidationError::new(
            "upstream.url",
            format!("'{}' is not a valid URL: {}", config.upstream.url, e),
        ));
    }
    if config.upstream.timeout_ms == 0 {
        errors.push(ValidationError::new("upstream.timeout_ms", "must be greater than 0"));
    }
    if config.upstream.max_delay_ms < config.upstream.base_delay_ms {
        errors.push(ValidationError::new(
            "upstream.max_delay_ms",
            "must be at least upstream.base_delay_ms",
        ));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be greater than 0"));
    }

    if config.cache.stale_ttl_ms <= config.cache.fresh_ttl_ms {
        errors.push(ValidationError::new(
            "cache.stale_ttl_ms",
            "must be greater than cache.fresh_ttl_ms",
        ));
    }
    if config.cache.retention_ttl_ms < config.cache.stale_ttl_ms {
        errors.push(ValidationError::new(
            "cache.retention_ttl_ms",
            "must be at least cache.stale_ttl_ms",
        ));
    }

    // A caller arriving after the window starts a second execution, so the
    // window must outlast the slowest possible call.
    let worst_case_ms = config.policy().retry.worst_case_duration().as_millis() as u64;
    if config.dedup.window_ms < worst_case_ms {
        errors.push(ValidationError::new(
            "dedup.window_ms",
            format!(
                "must be at least {}ms, the worst-case upstream call duration",
                worst_case_ms
            ),
        ));
    }

    if config.rate_limit.enabled && config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
    }

    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError::new("store.op_timeout_ms", "must be greater than 0"));
    }
    if config.store.key_prefix.is_empty() {
        errors.push(ValidationError::new("store.key_prefix", "must not be empty"));
    }
    if config.store.backend == StoreBackend::Memory && config.store.purge_interval_ms == 0 {
        errors.push(ValidationError::new("store.purge_interval_ms", "must be greater than 0"));
    }

    if config.refresh.queue_capacity == 0 {
        errors.push(ValidationError::new("refresh.queue_capacity", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
