//! JSON-RPC 2.0 framing over an MCP service.
//!
//! [`JsonRpcService`] turns JSON-RPC requests into [`RouterRequest`]s and the
//! results back into JSON-RPC responses. Batches run concurrently. Every
//! failure becomes an error response, so callers always get something to
//! send back.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::Layer;
use tower::ServiceExt;
use tower_service::Service;

use crate::error::JsonRpcError;
use crate::protocol::{
    JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseMessage, McpRequest,
};
use crate::router::{Extensions, RouterRequest, RouterResponse};

/// Tower layer that adds JSON-RPC 2.0 framing to an MCP service.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcLayer {
    _priv: (),
}

impl JsonRpcLayer {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

impl<S> Layer<S> for JsonRpcLayer {
    type Service = JsonRpcService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JsonRpcService::new(inner)
    }
}

/// Service that handles JSON-RPC framing.
///
/// Values in [`with_extensions`](Self::with_extensions) are attached to every
/// request it forwards.
///
/// ```rust
/// use mcp_resource_server::{JsonRpcService, McpRouter};
///
/// let router = McpRouter::new().server_info("my-server", "1.0.0");
/// let service = JsonRpcService::new(router);
/// ```
#[derive(Debug, Clone)]
pub struct JsonRpcService<S> {
    inner: S,
    extensions: Extensions,
}

impl<S> JsonRpcService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            extensions: Extensions::new(),
        }
    }

    /// Attach request-scoped values, such as the caller's access token.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }
}

impl<S> JsonRpcService<S>
where
    S: Service<RouterRequest, Response = RouterResponse, Error = Infallible>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    /// Process a single JSON-RPC request
    pub async fn call_single(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        process_single_request(self.inner.clone(), self.extensions.clone(), req).await
    }

    /// Process a batch of JSON-RPC requests concurrently
    pub async fn call_batch(&self, requests: Vec<JsonRpcRequest>) -> JsonRpcResponseMessage {
        if requests.is_empty() {
            return JsonRpcResponseMessage::Single(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("Empty batch request"),
            ));
        }

        let futures = requests.into_iter().map(|req| {
            process_single_request(self.inner.clone(), self.extensions.clone(), req)
        });
        JsonRpcResponseMessage::Batch(futures::future::join_all(futures).await)
    }

    /// Process a JSON-RPC message (single or batch)
    pub async fn call_message(&self, msg: JsonRpcMessage) -> JsonRpcResponseMessage {
        match msg {
            JsonRpcMessage::Single(req) => JsonRpcResponseMessage::Single(self.call_single(req).await),
            JsonRpcMessage::Batch(requests) => self.call_batch(requests).await,
        }
    }
}

impl<S> Service<JsonRpcMessage> for JsonRpcService<S>
where
    S: Service<RouterRequest, Response = RouterResponse, Error = Infallible>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    type Response = JsonRpcResponseMessage;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, msg: JsonRpcMessage) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { Ok(this.call_message(msg).await) })
    }
}

async fn process_single_request<S>(
    inner: S,
    extensions: Extensions,
    req: JsonRpcRequest,
) -> JsonRpcResponse
where
    S: Service<RouterRequest, Response = RouterResponse, Error = Infallible> + Send + 'static,
    S::Future: Send,
{
    if let Err(err) = req.validate() {
        return JsonRpcResponse::error(Some(req.id), err);
    }

    let mcp_request = match McpRequest::from_jsonrpc(&req) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(method = %req.method, error = %err, "Invalid request params");
            return JsonRpcResponse::error(
                Some(req.id),
                JsonRpcError::invalid_params(err.to_string()),
            );
        }
    };

    let router_req = RouterRequest {
        id: req.id,
        inner: mcp_request,
        extensions,
    };

    match inner.oneshot(router_req).await {
        Ok(response) => response.into_jsonrpc(),
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::McpRouter;
    use serde_json::json;

    fn service() -> JsonRpcService<McpRouter> {
        JsonRpcService::new(McpRouter::new())
    }

    fn to_json(resp: JsonRpcResponseMessage) -> serde_json::Value {
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_single_ping() {
        let resp = service()
            .call_single(JsonRpcRequest::new(1, "ping"))
            .await;
        let json = serde_json::to_value(resp).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["result"], json!({}));
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let mut req = JsonRpcRequest::new("a", "ping");
        req.jsonrpc = "1.0".to_string();
        let json = serde_json::to_value(service().call_single(req).await).unwrap();
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["id"], "a");
    }

    #[tokio::test]
    async fn test_bad_params_are_invalid_params() {
        let req = JsonRpcRequest::new(2, "initialize").with_params(json!({"nope": true}));
        let json = serde_json::to_value(service().call_single(req).await).unwrap();
        assert_eq!(json["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_batch() {
        let msg = JsonRpcMessage::Batch(vec![
            JsonRpcRequest::new(1, "ping"),
            JsonRpcRequest::new(2, "does/not/exist"),
        ]);
        let json = to_json(service().call_message(msg).await);
        assert_eq!(json[0]["id"], 1);
        assert!(json[0].get("result").is_some());
        assert_eq!(json[1]["id"], 2);
        assert_eq!(json[1]["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let json = to_json(service().call_message(JsonRpcMessage::Batch(vec![])).await);
        assert_eq!(json["error"]["code"], -32600);
        assert_eq!(json["id"], serde_json::Value::Null);
    }
}
