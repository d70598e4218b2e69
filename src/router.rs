//! MCP request router
//!
//! [`McpRouter`] answers the MCP requests this server supports. It is a
//! [`tower::Service`] over [`RouterRequest`], so it composes with tower
//! middleware such as [`McpTracingLayer`](crate::McpTracingLayer).
//!
//! ```rust
//! use mcp_resource_server::{CallToolResult, McpRouter, ToolBuilder};
//! use mcp_resource_server::oauth::ScopePolicy;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct Input {
//!     value: f64,
//! }
//!
//! let tool = ToolBuilder::new("negate")
//!     .description("Negate a number")
//!     .handler(|input: Input| async move { Ok(CallToolResult::text((-input.value).to_string())) })
//!     .build()
//!     .unwrap();
//!
//! let router = McpRouter::new()
//!     .server_info("my-server", "1.0.0")
//!     .scope_policy(ScopePolicy::new().default_scope("mcp:tools"))
//!     .tool(tool);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower_service::Service;

use crate::error::{Error, JsonRpcError, Result};
use crate::oauth::{AccessToken, OAuthError, ScopePolicy};
use crate::protocol::{
    CallToolParams, EmptyResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcResponse, ListToolsResult, McpNotification, McpRequest, McpResponse, RequestId,
    ServerCapabilities, ToolsCapability, negotiate_protocol_version,
};
use crate::session::SessionState;
use crate::tool::Tool;

/// Routes MCP requests to tools.
///
/// Clones share configuration and the session phase. Use
/// [`with_fresh_session`](Self::with_fresh_session) to start a new
/// session over the same configuration.
#[derive(Clone)]
pub struct McpRouter {
    inner: Arc<McpRouterInner>,
    session: SessionState,
}

impl std::fmt::Debug for McpRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpRouter")
            .field("server_name", &self.inner.server_name)
            .field("server_version", &self.inner.server_version)
            .field("tools_count", &self.inner.tools.len())
            .field("session_phase", &self.session.phase())
            .finish()
    }
}

#[derive(Clone)]
struct McpRouterInner {
    server_name: String,
    server_version: String,
    instructions: Option<String>,
    /// Registration order is the `tools/list` order.
    tools: Vec<Arc<Tool>>,
    scope_policy: ScopePolicy,
}

impl McpRouter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(McpRouterInner {
                server_name: env!("CARGO_PKG_NAME").to_string(),
                server_version: env!("CARGO_PKG_VERSION").to_string(),
                instructions: None,
                tools: Vec::new(),
                scope_policy: ScopePolicy::new(),
            }),
            session: SessionState::new(),
        }
    }

    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.server_name = name.into();
        inner.server_version = version.into();
        self
    }

    /// Usage hints returned from `initialize`.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.inner).instructions = Some(instructions.into());
        self
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn tool(mut self, tool: Tool) -> Self {
        let tools = &mut Arc::make_mut(&mut self.inner).tools;
        match tools.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => *existing = Arc::new(tool),
            None => tools.push(Arc::new(tool)),
        }
        self
    }

    pub fn tools(self, tools: impl IntoIterator<Item = Tool>) -> Self {
        tools.into_iter().fold(self, |router, tool| router.tool(tool))
    }

    /// Scopes checked at `tools/call` against the caller's [`AccessToken`].
    pub fn scope_policy(mut self, policy: ScopePolicy) -> Self {
        Arc::make_mut(&mut self.inner).scope_policy = policy;
        self
    }

    /// A router over the same configuration with a new, uninitialized session.
    pub fn with_fresh_session(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            session: SessionState::new(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.inner.tools.is_empty()).then(ToolsCapability::default),
        }
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<Tool>> {
        self.inner.tools.iter().find(|t| t.name == name)
    }

    async fn handle(&self, request: McpRequest, extensions: &Extensions) -> Result<McpResponse> {
        let method = request.method_name();
        if !self.session.is_request_allowed(method) {
            tracing::warn!(
                method = %method,
                phase = ?self.session.phase(),
                "Request rejected: session not initialized"
            );
            return Err(Error::JsonRpc(JsonRpcError::invalid_request(format!(
                "Session not initialized. Only 'initialize' and 'ping' are allowed before initialization. Got: {}",
                method
            ))));
        }

        match request {
            McpRequest::Initialize(params) => Ok(McpResponse::Initialize(self.initialize(params))),
            McpRequest::Ping => Ok(McpResponse::Pong(EmptyResult {})),
            McpRequest::ListTools(_params) => Ok(McpResponse::ListTools(ListToolsResult {
                tools: self.inner.tools.iter().map(|t| t.definition()).collect(),
                next_cursor: None,
            })),
            McpRequest::CallTool(params) => self.call_tool(params, extensions).await,
            McpRequest::Unknown { method, .. } => {
                Err(Error::JsonRpc(JsonRpcError::method_not_found(&method)))
            }
        }
    }

    fn initialize(&self, params: InitializeParams) -> InitializeResult {
        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            requested = %params.protocol_version,
            "Client initializing"
        );
        self.session.mark_initializing();

        InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: self.capabilities(),
            server_info: Implementation {
                name: self.inner.server_name.clone(),
                version: self.inner.server_version.clone(),
            },
            instructions: self.inner.instructions.clone(),
        }
    }

    async fn call_tool(&self, params: CallToolParams, extensions: &Extensions) -> Result<McpResponse> {
        let tool = self.find_tool(&params.name).ok_or_else(|| {
            Error::JsonRpc(JsonRpcError::invalid_params(format!(
                "Unknown tool: {}",
                params.name
            )))
        })?;

        let policy = &self.inner.scope_policy;
        if policy.requires_scopes_for(&tool.name) {
            let token = extensions
                .get::<AccessToken>()
                .ok_or(OAuthError::MissingToken)
                .and_then(|token| policy.check_tool(&tool.name, token).map(|()| token));
            if let Err(err) = token {
                tracing::warn!(tool = %tool.name, error = %err, "Tool call rejected");
                return Err(Error::JsonRpc(err.into()));
            }
        }

        tracing::debug!(tool = %tool.name, "Calling tool");
        Ok(McpResponse::CallTool(tool.call(params.arguments).await))
    }

    /// Handle an MCP notification (no response expected)
    pub fn handle_notification(&self, notification: McpNotification) {
        match notification {
            McpNotification::Initialized => {
                if self.session.mark_initialized() {
                    tracing::info!("Session initialized, entering operation phase");
                } else {
                    tracing::warn!(
                        phase = ?self.session.phase(),
                        "Received initialized notification in unexpected state"
                    );
                }
            }
            McpNotification::Cancelled(params) => {
                // Requests here run to completion; nothing to cancel.
                tracing::debug!(
                    request_id = ?params.request_id,
                    reason = ?params.reason,
                    "Cancellation notification ignored"
                );
            }
            McpNotification::Unknown { method, .. } => {
                tracing::debug!(method = %method, "Unknown notification received");
            }
        }
    }
}

impl Default for McpRouter {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tower Service implementation
// =============================================================================

/// A minimal type-map for passing request-scoped values, such as the
/// caller's [`AccessToken`], from HTTP middleware to the router.
///
/// ```rust
/// use mcp_resource_server::Extensions;
///
/// let mut ext = Extensions::new();
/// ext.insert(42u32);
/// assert_eq!(ext.get::<u32>(), Some(&42));
/// ```
#[derive(Default, Clone)]
pub struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, val: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(val));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|val| val.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Request type for the tower Service implementation
#[derive(Debug)]
pub struct RouterRequest {
    pub id: RequestId,
    pub inner: McpRequest,
    pub extensions: Extensions,
}

/// Response type for the tower Service implementation
#[derive(Debug)]
pub struct RouterResponse {
    pub id: RequestId,
    pub inner: std::result::Result<McpResponse, JsonRpcError>,
}

impl RouterResponse {
    pub fn into_jsonrpc(self) -> JsonRpcResponse {
        match self.inner {
            Ok(response) => match serde_json::to_value(response) {
                Ok(result) => JsonRpcResponse::result(self.id, result),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize response");
                    JsonRpcResponse::error(
                        Some(self.id),
                        JsonRpcError::internal_error(format!("Serialization error: {}", e)),
                    )
                }
            },
            Err(error) => JsonRpcResponse::error(Some(self.id), error),
        }
    }
}

impl Service<RouterRequest> for McpRouter {
    type Response = RouterResponse;
    type Error = std::convert::Infallible;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RouterRequest) -> Self::Future {
        let router = self.clone();
        Box::pin(async move {
            let result = router.handle(req.inner, &req.extensions).await;
            Ok(RouterResponse {
                id: req.id,
                inner: result.map_err(|e| match e {
                    Error::JsonRpc(err) => err,
                    Error::Serialization(err) => JsonRpcError::invalid_params(err.to_string()),
                    e => JsonRpcError::internal_error(e.to_string()),
                }),
            })
        })
    }
}
