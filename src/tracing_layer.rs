//! MCP request tracing middleware.
//!
//! [`McpTracingLayer`] wraps the router and records, for every request, a
//! span carrying the method, request id, tool name and the authenticated
//! client id, followed by one completion event with the duration.
//!
//! Successful requests log at the configured level (`INFO` by default);
//! JSON-RPC errors log at `WARN`.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::Layer;
use tower_service::Service;
use tracing::{Instrument, Level};

use crate::oauth::AccessToken;
use crate::protocol::McpRequest;
use crate::router::{RouterRequest, RouterResponse};

/// Tower layer that adds structured tracing to MCP requests.
///
/// ```rust
/// use mcp_resource_server::{McpRouter, McpTracingLayer};
/// use tower::Layer;
///
/// let router = McpRouter::new().server_info("my-server", "1.0.0");
/// let service = McpTracingLayer::new().layer(router);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct McpTracingLayer {
    level: Level,
}

impl Default for McpTracingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl McpTracingLayer {
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Level for successful requests. Default is `INFO`.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl<S> Layer<S> for McpTracingLayer {
    type Service = McpTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        McpTracingService {
            inner,
            level: self.level,
        }
    }
}

/// Tower service created by [`McpTracingLayer`].
#[derive(Debug, Clone)]
pub struct McpTracingService<S> {
    inner: S,
    level: Level,
}

impl<S> Service<RouterRequest> for McpTracingService<S>
where
    S: Service<RouterRequest, Response = RouterResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = RouterResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<RouterResponse, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RouterRequest) -> Self::Future {
        let method = req.inner.method_name().to_string();
        let tool = match &req.inner {
            McpRequest::CallTool(params) => Some(params.name.clone()),
            _ => None,
        };
        let client_id = req
            .extensions
            .get::<AccessToken>()
            .map(|t| t.client_id.clone());

        let span = tracing::info_span!(
            "mcp_request",
            method = %method,
            request_id = ?req.id,
            tool = tool.as_deref(),
            client_id = client_id.as_deref(),
        );

        let start = Instant::now();
        let fut = self.inner.call(req);
        let level = self.level;

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

                if let Ok(response) = &result {
                    match &response.inner {
                        Ok(_) => log_success(level, &method, duration_ms),
                        Err(err) => tracing::warn!(
                            method = %method,
                            error_code = err.code,
                            error_message = %err.message,
                            duration_ms,
                            "MCP request failed"
                        ),
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

fn log_success(level: Level, method: &str, duration_ms: f64) {
    match level {
        Level::ERROR => tracing::error!(method, duration_ms, "MCP request completed"),
        Level::WARN => tracing::warn!(method, duration_ms, "MCP request completed"),
        Level::INFO => tracing::info!(method, duration_ms, "MCP request completed"),
        Level::DEBUG => tracing::debug!(method, duration_ms, "MCP request completed"),
        Level::TRACE => tracing::trace!(method, duration_ms, "MCP request completed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McpRouter;
    use crate::protocol::RequestId;
    use crate::router::Extensions;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_passes_responses_through() {
        let service = McpTracingLayer::new().level(Level::DEBUG).layer(McpRouter::new());

        let mut extensions = Extensions::new();
        extensions.insert(AccessToken {
            token: "t".to_string(),
            client_id: "client-1".to_string(),
            scopes: vec![],
            expires_at: None,
            resource: None,
        });

        let ok = service
            .clone()
            .oneshot(RouterRequest {
                id: RequestId::Number(1),
                inner: McpRequest::Ping,
                extensions,
            })
            .await
            .unwrap();
        assert!(ok.inner.is_ok());

        let err = service
            .oneshot(RouterRequest {
                id: RequestId::Number(2),
                inner: McpRequest::Unknown {
                    method: "nope".to_string(),
                    params: None,
                },
                extensions: Extensions::new(),
            })
            .await
            .unwrap();
        assert!(err.inner.is_err());
    }
}
