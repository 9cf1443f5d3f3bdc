//! Response shaping.
//!
//! Successful lookups carry the cache and breaker diagnostics as headers.
//! Failures map to status codes by error kind; upstream 4xx responses pass
//! through with their original status and body.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error::MediatorError;
use crate::mediator::Mediated;

pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");
pub const X_BREAKER_STATUS: HeaderName = HeaderName::from_static("x-breaker-status");

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing caller identity header '{0}'")]
    MissingIdentity(String),

    #[error(transparent)]
    Mediation(#[from] MediatorError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingIdentity(_) => StatusCode::UNAUTHORIZED,
            ApiError::Mediation(err) => mediation_status(err),
        }
    }
}

fn mediation_status(err: &MediatorError) -> StatusCode {
    match err {
        MediatorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        MediatorError::BreakerOpen => StatusCode::SERVICE_UNAVAILABLE,
        MediatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        MediatorError::UpstreamClientError { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        MediatorError::UpstreamUnavailable { last, .. } => match last.as_ref() {
            MediatorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        },
        MediatorError::UpstreamServerError { .. }
        | MediatorError::Transport(_)
        | MediatorError::InvalidResponse(_)
        | MediatorError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Mediation(MediatorError::UpstreamClientError { body, .. }) => {
                (status, Json(body)).into_response()
            }
            ApiError::Mediation(err) => (
                status,
                Json(json!({ "error": err.kind(), "message": err.to_string() })),
            )
                .into_response(),
            err @ ApiError::MissingIdentity(_) => (
                status,
                Json(json!({ "error": "missing_identity", "message": err.to_string() })),
            )
                .into_response(),
        }
    }
}

/// JSON payload plus diagnostic headers.
pub fn lookup_response(mediated: Mediated) -> Response {
    let mut response = Json(mediated.value.as_ref().clone()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        X_CACHE_STATUS,
        HeaderValue::from_static(mediated.cache_status.as_str()),
    );
    headers.insert(
        X_BREAKER_STATUS,
        HeaderValue::from_static(mediated.breaker_status.as_str()),
    );
    response
}
