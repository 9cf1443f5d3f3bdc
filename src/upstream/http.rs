//! GraphQL-over-HTTP upstream.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Serialize;

use crate::upstream::{UpstreamError, UpstreamResponse};

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Variables<'a>,
}

#[derive(Serialize)]
struct Variables<'a> {
    identity: &'a str,
}

/// Posts a fixed query to a GraphQL endpoint, parameterized by caller identity.
#[derive(Debug, Clone)]
pub struct GraphqlUpstream {
    client: reqwest::Client,
    url: Arc<str>,
    query: Arc<str>,
}

impl GraphqlUpstream {
    pub fn new(client: reqwest::Client, url: &str, query: &str) -> Self {
        Self {
            client,
            url: Arc::from(url),
            query: Arc::from(query),
        }
    }

    /// One attempt for `identity`. Non-2xx statuses are returned as
    /// responses, not errors; the executor decides what they mean.
    pub fn fetch(&self, identity: &str) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'static {
        let this = self.clone();
        let identity = identity.to_string();
        async move { this.send(&identity).await }
    }

    /// A reusable attempt factory for [`Mediator::mediate`](crate::mediator::Mediator::mediate).
    pub fn for_identity(
        &self,
        identity: &str,
    ) -> impl Fn() -> BoxFuture<'static, Result<UpstreamResponse, UpstreamError>> + Send + Sync + 'static {
        let this = self.clone();
        let identity: Arc<str> = Arc::from(identity);
        move || this.fetch(&identity).boxed()
    }

    async fn send(&self, identity: &str) -> Result<UpstreamResponse, UpstreamError> {
        let request = GraphqlRequest {
            query: &self.query,
            variables: Variables { identity },
        };
        let response = self
            .client
            .post(self.url.as_ref())
            .json(&request)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let body = match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) if status.is_success() => return Err(UpstreamError::Decode(e.to_string())),
            // Error pages are often not JSON; keep them readable.
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        };

        tracing::debug!(status = status.as_u16(), "Upstream responded");
        Ok(UpstreamResponse::new(status.as_u16(), body))
    }
}
