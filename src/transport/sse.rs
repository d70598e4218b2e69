//! HTTP+SSE transport for MCP
//!
//! The client opens `GET /sse` and keeps it open. The first event,
//! `endpoint`, names the URL to post messages to:
//!
//! ```text
//! event: endpoint
//! data: /messages/?session_id=3f2a...
//! ```
//!
//! Each `POST` there is answered `202 Accepted` right away; the JSON-RPC
//! response arrives later on the stream as a `message` event. Closing the
//! stream ends the session.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::Layer;

use super::{MAX_BODY_BYTES, request_extensions};
use crate::error::Error;
use crate::jsonrpc::JsonRpcService;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, McpNotification};
use crate::router::McpRouter;
use crate::tracing_layer::McpTracingLayer;

/// Default path of the event stream.
pub const DEFAULT_SSE_PATH: &str = "/sse";

/// Default path clients post messages to.
pub const DEFAULT_MESSAGES_PATH: &str = "/messages/";

/// Responses buffered per session before senders wait.
const SESSION_BUFFER: usize = 64;

#[derive(Clone)]
struct SseSession {
    router: McpRouter,
    outbound: mpsc::Sender<String>,
}

#[derive(Default)]
struct SessionMap {
    sessions: Mutex<HashMap<String, SseSession>>,
}

impl SessionMap {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, SseSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: String, session: SseSession) {
        let mut sessions = self.lock();
        sessions.insert(id, session);
        tracing::debug!(total = sessions.len(), "Opened SSE session");
    }

    fn get(&self, id: &str) -> Option<SseSession> {
        self.lock().get(id).cloned()
    }

    fn remove(&self, id: &str) {
        let mut sessions = self.lock();
        if sessions.remove(id).is_some() {
            tracing::debug!(session_id = %id, total = sessions.len(), "Closed SSE session");
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes the session when the event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Arc<SessionMap>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
    }
}

struct AppState {
    router_template: McpRouter,
    sessions: Arc<SessionMap>,
    messages_path: String,
}

/// HTTP+SSE transport for MCP servers
///
/// ```rust
/// use mcp_resource_server::McpRouter;
/// use mcp_resource_server::transport::SseTransport;
///
/// let app = SseTransport::new(McpRouter::new()).into_router();
/// ```
pub struct SseTransport {
    router: McpRouter,
    sse_path: String,
    messages_path: String,
    keep_alive: Duration,
}

impl SseTransport {
    pub fn new(router: McpRouter) -> Self {
        Self {
            router,
            sse_path: DEFAULT_SSE_PATH.to_string(),
            messages_path: DEFAULT_MESSAGES_PATH.to_string(),
            keep_alive: Duration::from_secs(30),
        }
    }

    pub fn sse_path(mut self, path: impl Into<String>) -> Self {
        self.sse_path = path.into();
        self
    }

    pub fn messages_path(mut self, path: impl Into<String>) -> Self {
        self.messages_path = path.into();
        self
    }

    /// Interval of keep-alive comments on idle streams. Default 30 seconds.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn into_router(self) -> Router {
        let keep_alive = self.keep_alive;
        let state = Arc::new(AppState {
            router_template: self.router,
            sessions: Arc::new(SessionMap::default()),
            messages_path: self.messages_path.clone(),
        });

        Router::new()
            .route(
                &self.sse_path,
                get(move |state: State<Arc<AppState>>| handle_stream(state, keep_alive)),
            )
            .route(&self.messages_path, post(handle_message))
            .with_state(state)
    }
}

async fn handle_stream(State(state): State<Arc<AppState>>, keep_alive: Duration) -> Response {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let (outbound, rx) = mpsc::channel(SESSION_BUFFER);

    state.sessions.insert(
        id.clone(),
        SseSession {
            router: state.router_template.with_fresh_session(),
            outbound,
        },
    );
    tracing::info!(session_id = %id, "SSE stream opened");

    let endpoint = format!("{}?session_id={}", state.messages_path, id);
    let guard = SessionGuard {
        id,
        sessions: state.sessions.clone(),
    };

    Sse::new(event_stream(endpoint, rx, guard))
        .keep_alive(KeepAlive::new().interval(keep_alive).text("ping"))
        .into_response()
}

fn event_stream(
    endpoint: String,
    rx: mpsc::Receiver<String>,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let first = stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) });
    let messages = ReceiverStream::new(rx).map(move |message| {
        // The guard lives as long as the stream.
        let _ = &guard;
        Ok(Event::default().event("message").data(message))
    });
    first.chain(messages)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Option<String>,
}

async fn handle_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
    req: Request,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };
    if uuid::Uuid::try_parse(&session_id).is_err() {
        return (StatusCode::BAD_REQUEST, "Invalid session ID").into_response();
    }
    let Some(session) = state.sessions.get(&session_id) else {
        return (StatusCode::NOT_FOUND, "Could not find session").into_response();
    };

    let extensions = request_extensions(&req);
    let bytes = match axum::body::to_bytes(req.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::PAYLOAD_TOO_LARGE, "Unreadable body").into_response(),
    };
    let parsed: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Unparseable message");
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };

    if parsed.is_object() && parsed.get("id").is_none() {
        match serde_json::from_value::<JsonRpcNotification>(parsed)
            .map_err(Error::from)
            .and_then(|n| McpNotification::from_jsonrpc(&n))
        {
            Ok(notification) => session.router.handle_notification(notification),
            Err(e) => tracing::debug!(error = %e, "Dropping malformed notification"),
        }
        return (StatusCode::ACCEPTED, "Accepted").into_response();
    }

    let message: JsonRpcMessage = match serde_json::from_value(parsed) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "Invalid JSON-RPC message");
            return (StatusCode::BAD_REQUEST, "Could not parse message").into_response();
        }
    };

    tokio::spawn(async move {
        let service = JsonRpcService::new(McpTracingLayer::new().layer(session.router))
            .with_extensions(extensions);
        let response = service.call_message(message).await;
        match serde_json::to_string(&response) {
            Ok(json) => {
                if session.outbound.send(json).await.is_err() {
                    tracing::debug!(session_id = %session_id, "Stream closed before response");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize response"),
        }
    });

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            router_template: McpRouter::new(),
            sessions: Arc::new(SessionMap::default()),
            messages_path: DEFAULT_MESSAGES_PATH.to_string(),
        })
    }

    fn post(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_message_requires_session_id() {
        let app = SseTransport::new(McpRouter::new()).into_router();
        let resp = app
            .oneshot(post("/messages/", json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_message_unknown_session() {
        let app = SseTransport::new(McpRouter::new()).into_router();
        let uri = format!("/messages/?session_id={}", uuid::Uuid::new_v4().simple());
        let resp = app
            .oneshot(post(&uri, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_response_delivered_as_message_event() {
        let state = state();
        let (outbound, mut rx) = mpsc::channel(4);
        let id = uuid::Uuid::new_v4().simple().to_string();
        state.sessions.insert(
            id.clone(),
            SseSession {
                router: McpRouter::new(),
                outbound,
            },
        );

        let app = Router::new()
            .route(DEFAULT_MESSAGES_PATH, axum::routing::post(handle_message))
            .with_state(state);
        let uri = format!("/messages/?session_id={id}");
        let resp = app
            .oneshot(post(&uri, json!({"jsonrpc": "2.0", "id": 9, "method": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let delivered: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(delivered["id"], 9);
        assert_eq!(delivered["result"], json!({}));
    }

    #[tokio::test]
    async fn test_stream_starts_with_endpoint_and_cleans_up() {
        let sessions = Arc::new(SessionMap::default());
        let (outbound, rx) = mpsc::channel(4);
        sessions.insert(
            "abc".to_string(),
            SseSession {
                router: McpRouter::new(),
                outbound: outbound.clone(),
            },
        );
        let guard = SessionGuard {
            id: "abc".to_string(),
            sessions: sessions.clone(),
        };

        let mut events = Box::pin(event_stream("/messages/?session_id=abc".to_string(), rx, guard));
        assert!(events.next().await.is_some());
        outbound.send("{}".to_string()).await.unwrap();
        assert!(events.next().await.is_some());
        assert_eq!(sessions.len(), 1);

        drop(events);
        assert_eq!(sessions.len(), 0);
    }
}
