//! MCP transport implementations
//!
//! Two HTTP transports serve the same [`McpRouter`](crate::McpRouter):
//! - `http` - Streamable HTTP (`POST`/`DELETE` on a single endpoint)
//! - `sse` - Server-Sent Events (`GET /sse` plus `POST /messages/`)
//!
//! Both read the caller's [`AccessToken`], inserted by
//! [`OAuthLayer`](crate::oauth::OAuthLayer), from the HTTP request and pass it
//! to the router in the request [`Extensions`].
//!
//! Session state lives in memory and is lost on restart.

pub mod http;
pub mod sse;

pub use http::HttpTransport;
pub use sse::SseTransport;

use crate::oauth::AccessToken;
use crate::router::Extensions;

/// Largest request body accepted by either transport.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Copy the values the router cares about out of an HTTP request.
pub(crate) fn request_extensions<B>(req: &axum::http::Request<B>) -> Extensions {
    let mut extensions = Extensions::new();
    if let Some(token) = req.extensions().get::<AccessToken>() {
        extensions.insert(token.clone());
    }
    extensions
}
