//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Resolve the caller and hand the lookup to the mediator
//! - Serve until the shutdown broadcast fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::MediatorConfig;
use crate::http::request::{caller_identity, request_id, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::response::{lookup_response, ApiError};
use crate::mediator::{HealthReport, MediationPolicy, Mediator};
use crate::security::CallerKey;
use crate::upstream::GraphqlUpstream;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<Mediator>,
    pub upstream: GraphqlUpstream,
    pub policy: Arc<MediationPolicy>,
    pub identity_header: HeaderName,
}

/// HTTP front end for the mediator.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Errors if the configured identity header is not a valid header name.
    pub fn new(
        config: &MediatorConfig,
        mediator: Arc<Mediator>,
    ) -> Result<Self, axum::http::header::InvalidHeaderName> {
        let identity_header = HeaderName::try_from(config.listener.identity_header.as_str())?;
        let upstream = GraphqlUpstream::new(
            reqwest::Client::new(),
            &config.upstream.url,
            &config.upstream.query,
        );
        let state = AppState {
            mediator,
            upstream,
            policy: Arc::new(config.policy()),
            identity_header,
        };
        Ok(Self {
            router: Self::build_router(config, state),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &MediatorConfig, state: AppState) -> Router {
        Router::new()
            .route("/lookup", get(lookup_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.listener.request_timeout_secs,
                    )))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
            )
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn lookup_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let identity = caller_identity(&headers, &state.identity_header)?;
    let caller = CallerKey::from_identity(identity);

    tracing::debug!(request_id = %request_id(&headers), caller = %caller, "Lookup");

    let upstream = state.upstream.for_identity(identity);
    let mediated = state.mediator.mediate(&caller, upstream, &state.policy).await?;
    Ok(lookup_response(mediated))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json::<HealthReport>(state.mediator.health())
}
