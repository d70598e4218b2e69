//! Startup wiring: configuration in, protected axum application out.
//!
//! ```text
//!            ┌───────────────── OAuthLayer ─────────────────┐
//! request ──▶│ /.well-known/oauth-protected-resource (public) │
//!            │ MCP transport (streamable-http | sse)          │──▶ McpRouter ──▶ tools
//!            └───────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!            IntrospectionTokenVerifier ──▶ authorization server
//! ```

use axum::Router;

use crate::config::{Config, ConfigError, TransportMode};
use crate::error::Error;
use crate::oauth::{
    AuthorizationServerUrls, IntrospectionTokenVerifier, OAuthLayer, ProtectedResourceMetadata,
    ScopePolicy, TokenVerifier, VerifierBuildError,
};
use crate::router::McpRouter;
use crate::tools;
use crate::transport::{HttpTransport, SseTransport};

/// Name reported in `initialize`.
pub const SERVER_NAME: &str = "MCP Resource Server";

/// Instructions reported in `initialize`.
pub const SERVER_INSTRUCTIONS: &str =
    "Resource Server that validates tokens via Authorization Server introspection";

/// Why the application could not be assembled.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid authorization server URL: {0}")]
    AuthorizationServer(#[source] url::ParseError),

    #[error("Failed to build token verifier: {0}")]
    Verifier(#[from] VerifierBuildError),

    #[error("Failed to register tools: {0}")]
    Tools(#[from] Error),
}

/// The MCP router with every demo tool registered.
pub fn mcp_router(scope_policy: ScopePolicy) -> Result<McpRouter, Error> {
    Ok(McpRouter::new()
        .server_info(SERVER_NAME, env!("CARGO_PKG_VERSION"))
        .instructions(SERVER_INSTRUCTIONS)
        .scope_policy(scope_policy)
        .tools(tools::all()?))
}

/// Assemble the protected application from configuration.
pub fn build_app(config: &Config) -> Result<Router, StartupError> {
    let mode = config.validate()?;
    let server_url = config.server_url();
    let auth_urls = AuthorizationServerUrls::from_realm_base(&config.auth_base_url())
        .map_err(StartupError::AuthorizationServer)?;

    tracing::debug!(
        introspection_endpoint = %auth_urls.introspection_endpoint,
        client_id = %config.client_id,
        "Configuring token introspection"
    );
    let verifier = IntrospectionTokenVerifier::new(
        auth_urls.introspection_endpoint.clone(),
        server_url.clone(),
        config.client_id.clone(),
        config.client_secret.clone(),
    )?;

    let metadata = ProtectedResourceMetadata::new(server_url)
        .authorization_server(auth_urls.issuer)
        .scope(config.mcp_scope.clone());

    let scope_policy = ScopePolicy::new().default_scope(config.mcp_scope.clone());
    Ok(protected_app(
        mcp_router(scope_policy.clone())?,
        mode,
        verifier,
        metadata,
        scope_policy,
    ))
}

/// Serve `router` over `mode`, next to the metadata document, behind bearer
/// authentication with `verifier`.
pub fn protected_app<V: TokenVerifier>(
    router: McpRouter,
    mode: TransportMode,
    verifier: V,
    metadata: ProtectedResourceMetadata,
    scope_policy: ScopePolicy,
) -> Router {
    let transport = match mode {
        TransportMode::StreamableHttp => HttpTransport::new(router).into_router(),
        TransportMode::Sse => SseTransport::new(router).into_router(),
    };

    let auth = OAuthLayer::new(verifier, metadata.clone()).scope_policy(scope_policy);
    transport.merge(metadata.into_router()).layer(auth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{AccessToken, OAuthError};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use clap::Parser;
    use tower::ServiceExt;

    #[derive(Clone)]
    struct RejectAll;

    impl TokenVerifier for RejectAll {
        async fn verify_token(&self, _token: &str) -> Result<AccessToken, OAuthError> {
            Err(OAuthError::InvalidToken {
                description: "token verification failed".to_string(),
            })
        }
    }

    fn app(mode: TransportMode) -> Router {
        let metadata = ProtectedResourceMetadata::new("http://localhost:3000")
            .authorization_server("http://localhost:8080/realms/master/")
            .scope("mcp:tools");
        let policy = ScopePolicy::new().default_scope("mcp:tools");
        protected_app(
            mcp_router(policy.clone()).unwrap(),
            mode,
            RejectAll,
            metadata,
            policy,
        )
    }

    #[test]
    fn test_router_lists_demo_tools() {
        let router = mcp_router(ScopePolicy::new()).unwrap();
        let debug = format!("{:?}", router);
        assert!(debug.contains("MCP Resource Server"));
        assert!(debug.contains("tools_count: 2"));
    }

    #[tokio::test]
    async fn test_metadata_is_public() {
        for mode in [TransportMode::StreamableHttp, TransportMode::Sse] {
            let resp = app(mode)
                .oneshot(
                    Request::builder()
                        .uri("/.well-known/oauth-protected-resource")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_transport_requires_token() {
        let resp = app(TransportMode::Sse)
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.contains(
            "resource_metadata=\"http://localhost:3000/.well-known/oauth-protected-resource\""
        ));
    }

    #[tokio::test]
    async fn test_build_app_rejects_bad_transport() {
        let config = Config::try_parse_from([
            "mcp-resource-server",
            "--client-secret",
            "s",
            "--transport",
            "websocket",
        ])
        .unwrap();
        assert!(matches!(
            build_app(&config),
            Err(StartupError::Config(ConfigError::InvalidTransport(_)))
        ));
    }
}
