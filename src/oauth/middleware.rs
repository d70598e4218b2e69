//! Tower middleware that enforces bearer authentication on HTTP requests.
//!
//! Provides [`OAuthLayer`] and [`OAuthService`]. Every request outside the
//! public paths must carry `Authorization: Bearer <token>`; the token is
//! handed to a [`TokenVerifier`] and, once verified, checked against the
//! default scopes of the [`ScopePolicy`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower::Layer;

use super::error::OAuthError;
use super::metadata::ProtectedResourceMetadata;
use super::scope::ScopePolicy;
use super::token::TokenVerifier;
use crate::error::ErrorCode;

/// Tower layer that wraps services with bearer token verification.
///
/// On success the verified [`AccessToken`](super::AccessToken) is inserted
/// into the request extensions for downstream handlers.
///
/// # Example
///
/// ```rust,no_run
/// use mcp_resource_server::oauth::{
///     IntrospectionTokenVerifier, OAuthLayer, ProtectedResourceMetadata, ScopePolicy,
/// };
///
/// # fn build() -> Result<(), mcp_resource_server::BoxError> {
/// let verifier = IntrospectionTokenVerifier::new(
///     "https://auth.example.com/realms/master/protocol/openid-connect/token/introspect",
///     "https://mcp.example.com",
///     "mcp-server",
///     "secret",
/// )?;
/// let metadata = ProtectedResourceMetadata::new("https://mcp.example.com")
///     .authorization_server("https://auth.example.com/realms/master/");
///
/// let layer = OAuthLayer::new(verifier, metadata)
///     .scope_policy(ScopePolicy::new().default_scope("mcp:tools"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OAuthLayer<V: TokenVerifier> {
    verifier: V,
    challenge: Arc<Challenge>,
    scope_policy: ScopePolicy,
    public_paths: Arc<Vec<String>>,
}

/// What every rejection advertises back to the client.
#[derive(Debug)]
struct Challenge {
    resource_metadata_url: String,
    scope_hint: Option<String>,
}

impl<V: TokenVerifier> OAuthLayer<V> {
    /// Create a layer that verifies tokens with `verifier`.
    ///
    /// The metadata document's own path is public from the start.
    pub fn new(verifier: V, metadata: ProtectedResourceMetadata) -> Self {
        Self {
            verifier,
            challenge: Arc::new(Challenge {
                resource_metadata_url: metadata.metadata_url(),
                scope_hint: None,
            }),
            scope_policy: ScopePolicy::new(),
            public_paths: Arc::new(vec![metadata.metadata_path()]),
        }
    }

    /// Set the scope policy. Its default scopes are checked here and
    /// advertised in challenges.
    pub fn scope_policy(mut self, policy: ScopePolicy) -> Self {
        self.challenge = Arc::new(Challenge {
            resource_metadata_url: self.challenge.resource_metadata_url.clone(),
            scope_hint: policy.default_scope_hint(),
        });
        self.scope_policy = policy;
        self
    }

    /// Add a path that does not require authentication.
    pub fn public_path(mut self, path: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.public_paths).push(path.into());
        self
    }
}

impl<S, V: TokenVerifier> Layer<S> for OAuthLayer<V> {
    type Service = OAuthService<S, V>;

    fn layer(&self, inner: S) -> Self::Service {
        OAuthService {
            inner,
            verifier: self.verifier.clone(),
            challenge: self.challenge.clone(),
            scope_policy: self.scope_policy.clone(),
            public_paths: self.public_paths.clone(),
        }
    }
}

/// Tower service created by [`OAuthLayer`].
///
/// For each request:
///
/// 1. Public paths pass straight through.
/// 2. The bearer token is read from the `Authorization` header.
/// 3. The [`TokenVerifier`] decides whether it is valid.
/// 4. The default scopes of the [`ScopePolicy`] are checked.
/// 5. The [`AccessToken`](super::AccessToken) is inserted into the request
///    extensions and the request is forwarded.
///
/// Failures end the request with 401 or 403, a `WWW-Authenticate` challenge
/// and a JSON-RPC error body.
#[derive(Clone)]
pub struct OAuthService<S, V: TokenVerifier> {
    inner: S,
    verifier: V,
    challenge: Arc<Challenge>,
    scope_policy: ScopePolicy,
    public_paths: Arc<Vec<String>>,
}

impl<S, V> tower_service::Service<Request<Body>> for OAuthService<S, V>
where
    S: tower_service::Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
    V: TokenVerifier,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.is_public(req.uri().path()) {
            return Box::pin(inner.call(req));
        }

        let verifier = self.verifier.clone();
        let challenge = self.challenge.clone();
        let scope_policy = self.scope_policy.clone();

        Box::pin(async move {
            let Some(token) = bearer_token(req.headers()) else {
                tracing::debug!(path = %req.uri().path(), "Request without bearer token");
                return Ok(oauth_error_response(&OAuthError::MissingToken, &challenge));
            };

            let access_token = match verifier.verify_token(&token).await {
                Ok(access_token) => access_token,
                Err(error) => return Ok(oauth_error_response(&error, &challenge)),
            };

            if let Err(error) = scope_policy.check_default(&access_token) {
                tracing::debug!(
                    client_id = %access_token.client_id,
                    error = %error,
                    "Token lacks default scope"
                );
                return Ok(oauth_error_response(&error, &challenge));
            }

            req.extensions_mut().insert(access_token);
            inner.call(req).await
        })
    }
}

impl<S, V: TokenVerifier> OAuthService<S, V> {
    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }
}

/// Read the bearer token from the `Authorization` header.
///
/// The scheme is matched case-insensitively. A header with an empty token
/// counts as no token.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn oauth_error_response(error: &OAuthError, challenge: &Challenge) -> Response {
    let status = match error.status_code() {
        403 => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    };

    let www_authenticate = error.www_authenticate(
        Some(&challenge.resource_metadata_url),
        challenge.scope_hint.as_deref(),
    );

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "error": {
            "code": ErrorCode::Unauthorized as i32,
            "message": error.to_string()
        },
        "id": null
    });

    let mut response = (status, axum::Json(body)).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_str(&www_authenticate)
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::AccessToken;
    use tower::ServiceExt;

    /// Inner service that echoes the verified client id, or "anonymous".
    #[derive(Clone)]
    struct EchoClient;

    impl tower_service::Service<Request<Body>> for EchoClient {
        type Response = Response;
        type Error = std::convert::Infallible;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Body>) -> Self::Future {
            let client = req
                .extensions()
                .get::<AccessToken>()
                .map(|t| t.client_id.clone())
                .unwrap_or_else(|| "anonymous".to_string());
            Box::pin(async move { Ok(client.into_response()) })
        }
    }

    /// Accepts `good` (scope mcp:tools) and `narrow` (scope other).
    #[derive(Clone)]
    struct StaticVerifier;

    impl TokenVerifier for StaticVerifier {
        async fn verify_token(&self, token: &str) -> Result<AccessToken, OAuthError> {
            let scopes = match token {
                "good" => vec!["mcp:tools".to_string()],
                "narrow" => vec!["other".to_string()],
                _ => {
                    return Err(OAuthError::InvalidToken {
                        description: "token verification failed".to_string(),
                    });
                }
            };
            Ok(AccessToken {
                token: token.to_string(),
                client_id: "client-1".to_string(),
                scopes,
                expires_at: None,
                resource: None,
            })
        }
    }

    fn layer() -> OAuthLayer<StaticVerifier> {
        OAuthLayer::new(
            StaticVerifier,
            ProtectedResourceMetadata::new("https://mcp.example.com"),
        )
        .scope_policy(ScopePolicy::new().default_scope("mcp:tools"))
    }

    async fn send(layer: OAuthLayer<StaticVerifier>, req: Request<Body>) -> Response {
        layer.layer(EchoClient).oneshot(req).await.unwrap()
    }

    fn request(authorization: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/mcp");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn challenge_of(resp: &Response) -> String {
        resp.headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_token_returns_401_with_discovery() {
        let resp = send(layer(), request(None)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            challenge_of(&resp),
            "Bearer resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\", scope=\"mcp:tools\""
        );

        let body: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["error"]["code"], -32001);
        assert_eq!(body["id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_valid_token_reaches_inner_with_principal() {
        let resp = send(layer(), request(Some("Bearer good"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "client-1");
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let resp = send(layer(), request(Some("bearer good"))).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_or_foreign_credentials_count_as_missing() {
        for value in ["Bearer ", "Bearer", "Basic dXNlcjpwYXNz", "good"] {
            let resp = send(layer(), request(Some(value))).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{value}");
            assert!(!challenge_of(&resp).contains("error="), "{value}");
        }
    }

    #[tokio::test]
    async fn test_rejected_token_returns_invalid_token() {
        let resp = send(layer(), request(Some("Bearer forged"))).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = challenge_of(&resp);
        assert!(challenge.contains("error=\"invalid_token\""));
        assert!(challenge.contains("resource_metadata="));
    }

    #[tokio::test]
    async fn test_missing_default_scope_returns_403() {
        let resp = send(layer(), request(Some("Bearer narrow"))).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let challenge = challenge_of(&resp);
        assert!(challenge.contains("error=\"insufficient_scope\""));
        assert!(challenge.contains("scope=\"mcp:tools\""));
    }

    #[tokio::test]
    async fn test_metadata_path_is_public() {
        let req = Request::builder()
            .uri("/.well-known/oauth-protected-resource")
            .body(Body::empty())
            .unwrap();
        let resp = send(layer(), req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "anonymous");
    }

    #[tokio::test]
    async fn test_nested_metadata_path_is_public() {
        let layer = OAuthLayer::new(
            StaticVerifier,
            ProtectedResourceMetadata::new("https://mcp.example.com/tenant"),
        );
        let req = Request::builder()
            .uri("/.well-known/oauth-protected-resource/tenant")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(layer.clone(), req).await.status(), StatusCode::OK);

        let resp = send(layer, request(None)).await;
        assert!(challenge_of(&resp).contains(
            "resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource/tenant\""
        ));
    }

    #[tokio::test]
    async fn test_custom_public_path() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = send(layer().public_path("/health"), req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_path_is_exact() {
        let req = Request::builder()
            .uri("/.well-known/oauth-protected-resource-extra")
            .body(Body::empty())
            .unwrap();
        let resp = send(layer(), req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("BEARER  abc "));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc"));
    }
}
