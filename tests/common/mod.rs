//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use upstream_mediator::config::MediatorConfig;
use upstream_mediator::lifecycle::{startup, Shutdown};
use upstream_mediator::store::{Store, StoreError, StoreResult};
use upstream_mediator::upstream::{UpstreamError, UpstreamResponse};
use upstream_mediator::HttpServer;

pub type UpstreamFuture = BoxFuture<'static, Result<UpstreamResponse, UpstreamError>>;

/// Start a programmable mock backend on an ephemeral port. `f` receives the
/// request body and returns the status and body to send back.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let body = read_request_body(&mut socket).await;
                        let (status, body) = f(body).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read one HTTP/1.1 request and return its body.
async fn read_request_body(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            while buf.len() < body_start + length {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }
            let body_end = buf.len().min(body_start + length);
            return String::from_utf8_lossy(&buf[body_start..body_end]).into_owned();
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Config pointing at `backend`, tuned for fast tests.
pub fn test_config(backend: SocketAddr) -> MediatorConfig {
    let mut config = MediatorConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.url = format!("http://{}/graphql", backend);
    config.upstream.timeout_ms = 1_000;
    config.upstream.max_retries = 2;
    config.upstream.base_delay_ms = 10;
    config.upstream.max_delay_ms = 50;
    config.upstream.jitter = false;
    config.dedup.grace_ms = 10;
    config
}

/// Start the mediator HTTP service on an ephemeral port.
pub async fn start_mediator(config: &MediatorConfig) -> (SocketAddr, Shutdown) {
    let shutdown = Shutdown::new();
    let mediator = Arc::new(startup::build_mediator(config, shutdown.subscribe()));
    let server = HttpServer::new(config, mediator).unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    (addr, shutdown)
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Upstream closure that fails with `fail_status` for the first `failures`
/// calls, then answers 200 with `{"call": n}`.
pub fn flaky_upstream(
    failures: u32,
    fail_status: u16,
) -> (impl Fn() -> UpstreamFuture + Send + Sync + Clone + 'static, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let upstream = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let response = if n < failures {
                UpstreamResponse::new(fail_status, json!({"error": "unavailable"}))
            } else {
                UpstreamResponse::new(200, json!({ "call": n }))
            };
            Ok::<_, UpstreamError>(response)
        }
        .boxed()
    };
    (upstream, calls)
}

/// Upstream closure that sleeps before answering, counting calls.
pub fn slow_upstream(
    delay: Duration,
    body: Value,
) -> (impl Fn() -> UpstreamFuture + Send + Sync + Clone + 'static, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let body = Arc::new(body);
    let upstream = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let body = body.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, UpstreamError>(UpstreamResponse::new(200, body.as_ref().clone()))
        }
        .boxed()
    };
    (upstream, calls)
}

/// A store where every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("injected".into()))
    }

    async fn set_ex(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
        Err(StoreError::Unavailable("injected".into()))
    }

    async fn incr(&self, _key: &str) -> StoreResult<u64> {
        Err(StoreError::Unavailable("injected".into()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StoreResult<bool> {
        Err(StoreError::Unavailable("injected".into()))
    }
}
