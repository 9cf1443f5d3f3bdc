//! Upstream mediator service.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                   UPSTREAM MEDIATOR                   │
//!                         │                                                       │
//!   GET /lookup           │  ┌────────┐   ┌────────────┐   ┌─────────┐            │
//!   ──────────────────────┼─▶│  http  │──▶│ rate limit │──▶│   SWR   │            │
//!                         │  │ server │   │            │   │  cache  │            │
//!                         │  └────────┘   └────────────┘   └────┬────┘            │
//!                         │                                     │ miss / stale    │
//!                         │                                     ▼                 │
//!                         │                               ┌───────────┐           │
//!                         │                               │   dedup   │           │
//!                         │                               └─────┬─────┘           │
//!                         │                                     ▼                 │
//!                         │  ┌───────────┐   ┌──────────────────────────┐         │
//!                         │  │  breaker  │◀──│ executor (timeout/retry) │─────────┼──▶ GraphQL
//!                         │  └───────────┘   └──────────────────────────┘         │    upstream
//!                         └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use upstream_mediator::config::{load_config, MediatorConfig};
use upstream_mediator::http::HttpServer;
use upstream_mediator::lifecycle::{signals, startup, Shutdown};
use upstream_mediator::observability::logging;

#[derive(Parser)]
#[command(name = "upstream-mediator")]
#[command(about = "Resilient caching mediator for a GraphQL upstream", long_about = None)]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => MediatorConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "upstream-mediator starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        cache_enabled = config.cache.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    startup::init_metrics(&config)?;

    let shutdown = Shutdown::new();
    let mediator = Arc::new(startup::build_mediator(&config, shutdown.subscribe()));
    let server = HttpServer::new(&config, mediator)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        signal_shutdown.trigger();
    });

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
