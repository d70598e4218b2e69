//! Streamable HTTP transport for MCP
//!
//! One endpoint carries the whole conversation:
//!
//! - `POST` delivers JSON-RPC requests, batches and notifications. An
//!   `initialize` request opens a session whose id is returned in the
//!   `mcp-session-id` header; every later request must echo it.
//! - `DELETE` ends a session.
//! - `GET` answers `405`: this server never pushes messages on its own.
//!
//! Idle sessions expire after the configured TTL (30 minutes by default) and
//! the number of live sessions is capped.
//!
//! The verified [`AccessToken`] that the OAuth middleware stored in the
//! HTTP request extensions is handed to the router with every request.
//!
//! ```rust,no_run
//! use mcp_resource_server::McpRouter;
//! use mcp_resource_server::transport::http::HttpTransport;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let app = HttpTransport::new(McpRouter::new())
//!     .session_ttl(Duration::from_secs(60 * 60))
//!     .max_sessions(1000)
//!     .into_router();
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use tokio::sync::RwLock;
use tower::Layer;

use super::{MAX_BODY_BYTES, request_extensions};
use crate::error::JsonRpcError;
use crate::jsonrpc::JsonRpcService;
use crate::protocol::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcResponse, JsonRpcResponseMessage,
    McpNotification, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::router::McpRouter;
use crate::tracing_layer::McpTracingLayer;

/// Header name for MCP session ID
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header name for MCP protocol version
pub const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Default session TTL: 30 minutes
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

/// Default maximum number of sessions
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

#[derive(Debug)]
struct Session {
    id: String,
    /// Router with this session's own lifecycle phase
    router: McpRouter,
    /// Milliseconds since the UNIX epoch
    last_accessed: AtomicU64,
}

impl Session {
    fn new(router: McpRouter) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            router,
            last_accessed: AtomicU64::new(current_timestamp_ms()),
        }
    }

    fn touch(&self) {
        self.last_accessed
            .store(current_timestamp_ms(), Ordering::Relaxed);
    }

    fn is_expired(&self, ttl_ms: u64) -> bool {
        let last = self.last_accessed.load(Ordering::Relaxed);
        current_timestamp_ms().saturating_sub(last) > ttl_ms
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug)]
struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl_ms: u64,
    max_sessions: usize,
}

impl SessionStore {
    fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl_ms: ttl.as_millis() as u64,
            max_sessions,
        }
    }

    /// Open a session, or `None` when the store is full.
    async fn create(&self, router: McpRouter) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            tracing::warn!(
                max = self.max_sessions,
                "Session limit reached, rejecting new session"
            );
            return None;
        }

        let session = Arc::new(Session::new(router));
        sessions.insert(session.id.clone(), session.clone());
        tracing::debug!(session_id = %session.id, total = sessions.len(), "Created new session");
        Some(session)
    }

    async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(id)?;
        if session.is_expired(self.ttl_ms) {
            tracing::debug!(session_id = %id, "Session expired on access");
            return None;
        }
        session.touch();
        Some(session.clone())
    }

    async fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, total = sessions.len(), "Removed session");
        }
        removed
    }

    async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.ttl_ms));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(
                removed,
                remaining = sessions.len(),
                "Cleaned up expired sessions"
            );
        }
        removed
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

struct AppState {
    /// Configuration shared by all sessions; each session gets a fresh phase
    router_template: McpRouter,
    sessions: SessionStore,
}

/// Streamable HTTP transport for MCP servers
pub struct HttpTransport {
    router: McpRouter,
    session_ttl: Duration,
    max_sessions: usize,
}

impl HttpTransport {
    pub fn new(router: McpRouter) -> Self {
        Self {
            router,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Idle time after which a session is dropped. Default is 30 minutes.
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Maximum concurrent sessions. Further `initialize` requests get `503`.
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Build the axum router, serving the endpoint at `/`.
    ///
    /// Must be called inside a tokio runtime: it starts the task that evicts
    /// expired sessions. The task stops once the router is dropped.
    pub fn into_router(self) -> Router {
        let state = self.create_app_state();
        Router::new()
            .route("/", post(handle_post).get(handle_get).delete(handle_delete))
            .with_state(state)
    }

    /// Build the axum router with the endpoint nested under `path`.
    pub fn into_router_at(self, path: &str) -> Router {
        Router::new().nest(path, self.into_router())
    }

    fn create_app_state(self) -> Arc<AppState> {
        let state = Arc::new(AppState {
            router_template: self.router,
            sessions: SessionStore::new(self.session_ttl, self.max_sessions),
        });

        let weak: Weak<AppState> = Arc::downgrade(&state);
        let every = (self.session_ttl / 2).max(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(state) = weak.upgrade() else { break };
                state.sessions.cleanup_expired().await;
            }
        });

        state
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_initialize_request(body: &serde_json::Value) -> bool {
    body.get("method").and_then(|m| m.as_str()) == Some("initialize")
}

fn json_rpc_error_response(status: StatusCode, error: JsonRpcError) -> Response {
    (status, axum::Json(JsonRpcResponse::error(None, error))).into_response()
}

async fn handle_post(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let extensions = request_extensions(&req);
    let (parts, body) = req.into_parts();
    let headers = parts.headers;

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return json_rpc_error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                JsonRpcError::invalid_request(format!("Unreadable body: {}", e)),
            );
        }
    };

    let parsed: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            return json_rpc_error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
            );
        }
    };

    let is_init = is_initialize_request(&parsed);

    let session = if is_init {
        match state
            .sessions
            .create(state.router_template.with_fresh_session())
            .await
        {
            Some(s) => s,
            None => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Server at capacity, try again later",
                )
                    .into_response();
            }
        }
    } else {
        let Some(session_id) = header_str(&headers, MCP_SESSION_ID_HEADER) else {
            return (StatusCode::BAD_REQUEST, "Missing MCP-Session-Id header").into_response();
        };
        match state.sessions.get(session_id).await {
            Some(s) => s,
            None => {
                return (StatusCode::NOT_FOUND, "Session not found or expired").into_response();
            }
        }
    };

    if !is_init
        && let Some(version) = header_str(&headers, MCP_PROTOCOL_VERSION_HEADER)
        && !SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
    {
        return (
            StatusCode::BAD_REQUEST,
            format!("Unsupported protocol version: {}", version),
        )
            .into_response();
    }

    // Notifications carry no id and get no body back.
    if parsed.is_object() && parsed.get("id").is_none() {
        match serde_json::from_value::<JsonRpcNotification>(parsed)
            .map_err(crate::error::Error::from)
            .and_then(|n| McpNotification::from_jsonrpc(&n))
        {
            Ok(notification) => session.router.handle_notification(notification),
            Err(e) => tracing::debug!(error = %e, "Dropping malformed notification"),
        }
        return StatusCode::ACCEPTED.into_response();
    }

    let message: JsonRpcMessage = match serde_json::from_value(parsed) {
        Ok(m) => m,
        Err(e) => {
            return json_rpc_error_response(
                StatusCode::BAD_REQUEST,
                JsonRpcError::invalid_request(format!("Invalid request: {}", e)),
            );
        }
    };

    let service = JsonRpcService::new(McpTracingLayer::new().layer(session.router.clone()))
        .with_extensions(extensions);
    let response = service.call_message(message).await;

    if is_init {
        if let JsonRpcResponseMessage::Single(JsonRpcResponse::Error(_)) = &response {
            state.sessions.remove(&session.id).await;
            return axum::Json(response).into_response();
        }
        let mut resp = axum::Json(response).into_response();
        if let Ok(value) = HeaderValue::from_str(&session.id) {
            resp.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
        return resp;
    }

    axum::Json(response).into_response()
}

async fn handle_get() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST, DELETE")],
        "Server-initiated streams are not supported",
    )
        .into_response()
}

async fn handle_delete(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(session_id) = header_str(&headers, MCP_SESSION_ID_HEADER) else {
        return (StatusCode::BAD_REQUEST, "Missing MCP-Session-Id header").into_response();
    };

    if state.sessions.remove(session_id).await {
        tracing::info!(session_id = %session_id, "Session terminated");
        StatusCode::OK.into_response()
    } else {
        (StatusCode::NOT_FOUND, "Session not found").into_response()
    }
}
