//! # mcp-resource-server
//!
//! An MCP server that acts as an OAuth 2.0 protected resource. Bearer tokens
//! are verified by asking the authorization server about them (RFC 7662
//! token introspection) and are only accepted when they were issued for this
//! server (RFC 8707 resource indicators).
//!
//! The MCP side is plain [Tower](https://docs.rs/tower): [`McpRouter`] is a
//! `Service`, [`JsonRpcService`] adds JSON-RPC framing and
//! [`McpTracingLayer`] adds request logging. Authentication is an HTTP-level
//! layer, [`oauth::OAuthLayer`], wrapped around whichever transport is served.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mcp_resource_server::config::TransportMode;
//! use mcp_resource_server::oauth::{
//!     IntrospectionTokenVerifier, ProtectedResourceMetadata, ScopePolicy,
//! };
//! use mcp_resource_server::{BoxError, server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let verifier = IntrospectionTokenVerifier::new(
//!         "http://localhost:8080/realms/master/protocol/openid-connect/token/introspect",
//!         "http://localhost:3000",
//!         "mcp-server",
//!         "secret",
//!     )?;
//!     let metadata = ProtectedResourceMetadata::new("http://localhost:3000")
//!         .authorization_server("http://localhost:8080/realms/master/")
//!         .scope("mcp:tools");
//!     let policy = ScopePolicy::new().default_scope("mcp:tools");
//!
//!     let app = server::protected_app(
//!         server::mcp_router(policy.clone())?,
//!         TransportMode::StreamableHttp,
//!         verifier,
//!         metadata,
//!         policy,
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! - [`oauth::IntrospectionTokenVerifier`] - token verification by introspection
//! - [`oauth::OAuthLayer`] - bearer extraction and `WWW-Authenticate` challenges
//! - [`oauth::ProtectedResourceMetadata`] - RFC 9728 discovery document
//! - [`McpRouter`] - MCP request dispatch and tool registry
//! - [`transport::HttpTransport`], [`transport::SseTransport`] - HTTP transports

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod oauth;
pub mod protocol;
pub mod router;
pub mod secret;
pub mod server;
pub mod session;
pub mod tool;
pub mod tools;
pub mod tracing_layer;
pub mod transport;

// Re-exports
pub use config::{Config, ConfigError, TransportMode};
pub use error::{BoxError, Error, ErrorCode, JsonRpcError, Result};
pub use jsonrpc::{JsonRpcLayer, JsonRpcService};
pub use protocol::{
    CallToolResult, Content, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponseMessage, McpRequest, McpResponse,
};
pub use router::{Extensions, McpRouter, RouterRequest, RouterResponse};
pub use secret::SecretString;
pub use server::{StartupError, build_app};
pub use session::{SessionPhase, SessionState};
pub use tool::{Tool, ToolBuilder, ToolHandler};
pub use tracing_layer::{McpTracingLayer, McpTracingService};
pub use transport::{HttpTransport, SseTransport};
