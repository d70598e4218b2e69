//! Token verification through OAuth 2.0 Token Introspection (RFC 7662).
//!
//! [`IntrospectionTokenVerifier`] asks a remote authorization server whether a
//! bearer token is active, then checks that the token's audience names this
//! resource server (RFC 8707) before accepting it.
//!
//! Each verification runs the same steps:
//!
//! 1. Refuse plaintext endpoints unless they are on loopback.
//! 2. `POST` the token with this server's client credentials.
//! 3. Require a `200` response carrying a JSON object.
//! 4. Require `"active": true`.
//! 5. Require an audience entry covering this server's resource URL.
//! 6. Build the [`AccessToken`].
//!
//! [`introspect`](IntrospectionTokenVerifier::introspect) reports which step
//! failed. The [`TokenVerifier`] implementation folds every failure into one
//! [`OAuthError::InvalidToken`] so unauthenticated callers cannot probe the
//! authorization server through this one.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_resource_server::oauth::{IntrospectionTokenVerifier, TokenVerifier};
//!
//! # async fn run() -> Result<(), mcp_resource_server::BoxError> {
//! let verifier = IntrospectionTokenVerifier::new(
//!     "https://idp.example.com/realms/master/protocol/openid-connect/token/introspect",
//!     "https://mcp.example.com",
//!     "mcp-server",
//!     "client-secret",
//! )?;
//!
//! let principal = verifier.verify_token("opaque-token").await?;
//! println!("{} {:?}", principal.client_id, principal.scopes);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Semaphore;
use url::Url;

use super::error::OAuthError;
use super::resource::{check_resource_allowed, resource_url_from_server_url};
use super::token::{AccessToken, TokenAudience, TokenVerifier};
use crate::secret::SecretString;

/// Total time allowed for one introspection call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed to establish the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Introspection calls allowed in flight at once.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Idle keep-alive connections kept in the pool.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 5;

/// Client id reported when the authorization server omits one.
pub const UNKNOWN_CLIENT_ID: &str = "unknown";

const REJECTION_DESCRIPTION: &str = "token verification failed";

/// Error building an [`IntrospectionTokenVerifier`].
#[derive(Debug, thiserror::Error)]
pub enum VerifierBuildError {
    #[error("invalid server URL: {0}")]
    ServerUrl(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Why a single introspection did not produce a principal.
#[derive(Debug, thiserror::Error)]
pub enum IntrospectionError {
    #[error("refusing to send credentials to non-HTTPS endpoint {endpoint}")]
    InsecureEndpoint { endpoint: String },

    #[error("introspection request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("introspection did not complete within {0:?}")]
    Timeout(Duration),

    #[error("introspection endpoint returned {0}")]
    Status(StatusCode),

    #[error("malformed introspection response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("token is not active")]
    Inactive,

    #[error("token audience does not include {resource}")]
    ResourceMismatch { resource: String },

    #[error("introspection limiter closed")]
    LimiterClosed,
}

impl IntrospectionError {
    /// True for decisions about the token itself, as opposed to failures of
    /// the call or of the configuration.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            IntrospectionError::Inactive | IntrospectionError::ResourceMismatch { .. }
        )
    }
}

/// Body of an RFC 7662 introspection response.
///
/// Only the members this server acts on are modeled; anything else the
/// authorization server sends is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionResponse {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Space-delimited granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub exp: Option<serde_json::Number>,
    #[serde(default)]
    pub aud: Option<TokenAudience>,
}

impl IntrospectionResponse {
    fn into_access_token(self, token: &str) -> AccessToken {
        AccessToken {
            token: token.to_string(),
            client_id: self
                .client_id
                .unwrap_or_else(|| UNKNOWN_CLIENT_ID.to_string()),
            scopes: self
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from)
                .collect(),
            expires_at: self.exp,
            resource: self.aud,
        }
    }
}

/// Verifies bearer tokens against a remote introspection endpoint.
///
/// Cheap to clone: clones share configuration, the connection pool and the
/// in-flight limit. The verifier keeps no per-token state and never caches
/// results, so every call is an independent round trip.
#[derive(Clone)]
pub struct IntrospectionTokenVerifier {
    inner: Arc<VerifierInner>,
}

struct VerifierInner {
    introspection_endpoint: String,
    server_url: String,
    resource_url: String,
    client_id: String,
    client_secret: SecretString,
    http: reqwest::Client,
    in_flight: Semaphore,
    /// Bounds the wait for a permit and the round trip together.
    timeout: Duration,
}

impl std::fmt::Debug for IntrospectionTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionTokenVerifier")
            .field("introspection_endpoint", &self.inner.introspection_endpoint)
            .field("server_url", &self.inner.server_url)
            .field("resource_url", &self.inner.resource_url)
            .field("client_id", &self.inner.client_id)
            .field("client_secret", &self.inner.client_secret)
            .finish_non_exhaustive()
    }
}

impl IntrospectionTokenVerifier {
    /// Create a verifier with the default timeouts and connection limits.
    ///
    /// # Errors
    ///
    /// Fails if `server_url` cannot be turned into a resource URL or the HTTP
    /// client cannot be built. The introspection endpoint itself is checked
    /// on every call instead, see [`introspect`](Self::introspect).
    pub fn new(
        introspection_endpoint: impl Into<String>,
        server_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
    ) -> Result<Self, VerifierBuildError> {
        Self::builder(introspection_endpoint, server_url, client_id, client_secret).build()
    }

    /// Start a builder to tune timeouts and connection limits.
    pub fn builder(
        introspection_endpoint: impl Into<String>,
        server_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<SecretString>,
    ) -> IntrospectionTokenVerifierBuilder {
        IntrospectionTokenVerifierBuilder {
            introspection_endpoint: introspection_endpoint.into(),
            server_url: server_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }

    pub fn introspection_endpoint(&self) -> &str {
        &self.inner.introspection_endpoint
    }

    pub fn server_url(&self) -> &str {
        &self.inner.server_url
    }

    /// The canonical resource URL audiences are matched against.
    pub fn resource_url(&self) -> &str {
        &self.inner.resource_url
    }

    /// Run one introspection and report exactly why it failed, if it did.
    pub async fn introspect(&self, token: &str) -> Result<AccessToken, IntrospectionError> {
        let inner = &self.inner;
        if !is_allowed_endpoint(&inner.introspection_endpoint) {
            return Err(IntrospectionError::InsecureEndpoint {
                endpoint: inner.introspection_endpoint.clone(),
            });
        }

        let introspection = tokio::time::timeout(inner.timeout, self.fetch(token))
            .await
            .map_err(|_| IntrospectionError::Timeout(inner.timeout))??;

        if !introspection.active {
            return Err(IntrospectionError::Inactive);
        }
        if !self.validate_resource(&introspection) {
            return Err(IntrospectionError::ResourceMismatch {
                resource: inner.resource_url.clone(),
            });
        }

        Ok(introspection.into_access_token(token))
    }

    /// Wait for an in-flight slot, then run the round trip.
    async fn fetch(&self, token: &str) -> Result<IntrospectionResponse, IntrospectionError> {
        let inner = &self.inner;
        let _permit = inner
            .in_flight
            .acquire()
            .await
            .map_err(|_| IntrospectionError::LimiterClosed)?;

        let response = inner
            .http
            .post(&inner.introspection_endpoint)
            .form(&[
                ("token", token),
                ("client_id", inner.client_id.as_str()),
                ("client_secret", inner.client_secret.expose()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(IntrospectionError::Status(status));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Check that the response's audience covers this resource server.
    ///
    /// A list audience passes if any entry matches. A missing audience never
    /// passes.
    pub fn validate_resource(&self, response: &IntrospectionResponse) -> bool {
        let inner = &self.inner;
        if inner.server_url.is_empty() || inner.resource_url.is_empty() {
            return false;
        }

        response.aud.as_ref().is_some_and(|aud| {
            aud.as_slice()
                .iter()
                .any(|entry| check_resource_allowed(&inner.resource_url, entry))
        })
    }
}

impl TokenVerifier for IntrospectionTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<AccessToken, OAuthError> {
        match self.introspect(token).await {
            Ok(access_token) => {
                tracing::debug!(
                    client_id = %access_token.client_id,
                    scopes = ?access_token.scopes,
                    "Token verified"
                );
                Ok(access_token)
            }
            Err(error) => {
                if error.is_policy_rejection() {
                    tracing::debug!(error = %error, "Token rejected");
                } else {
                    tracing::warn!(
                        error = %error,
                        endpoint = %self.inner.introspection_endpoint,
                        "Token introspection failed"
                    );
                }
                Err(OAuthError::InvalidToken {
                    description: REJECTION_DESCRIPTION.to_string(),
                })
            }
        }
    }
}

/// Builder for [`IntrospectionTokenVerifier`].
#[derive(Debug)]
pub struct IntrospectionTokenVerifierBuilder {
    introspection_endpoint: String,
    server_url: String,
    client_id: String,
    client_secret: SecretString,
    timeout: Duration,
    connect_timeout: Duration,
    max_connections: usize,
    max_idle_connections: usize,
}

impl IntrospectionTokenVerifierBuilder {
    /// Total time allowed for one introspection call, including the wait for
    /// an in-flight slot. Default 10 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Time allowed to connect. Default 5 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Maximum introspection calls in flight. Default 10; clamped to at least 1.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Maximum idle keep-alive connections. Default 5.
    pub fn max_idle_connections(mut self, max: usize) -> Self {
        self.max_idle_connections = max;
        self
    }

    pub fn build(self) -> Result<IntrospectionTokenVerifier, VerifierBuildError> {
        let resource_url = resource_url_from_server_url(&self.server_url)?;

        let mut http = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.max_idle_connections)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ));
        // Loopback endpoints never go through a proxy.
        if is_loopback_endpoint(&self.introspection_endpoint) {
            http = http.no_proxy();
        }

        Ok(IntrospectionTokenVerifier {
            inner: Arc::new(VerifierInner {
                introspection_endpoint: self.introspection_endpoint,
                server_url: self.server_url,
                resource_url,
                client_id: self.client_id,
                client_secret: self.client_secret,
                http: http.build()?,
                in_flight: Semaphore::new(self.max_connections),
                timeout: self.timeout,
            }),
        })
    }
}

const LOOPBACK_HOSTS: [&str; 2] = ["localhost", "127.0.0.1"];

/// HTTPS anywhere, plain HTTP only to loopback.
fn is_allowed_endpoint(endpoint: &str) -> bool {
    endpoint.starts_with("https://") || is_loopback_endpoint(endpoint)
}

/// Plain HTTP whose parsed host is loopback. Userinfo is refused, so
/// `http://localhost:80@evil.test` does not count.
fn is_loopback_endpoint(endpoint: &str) -> bool {
    let Ok(url) = Url::parse(endpoint) else {
        return false;
    };
    url.scheme() == "http"
        && url.username().is_empty()
        && url.password().is_none()
        && url.host_str().is_some_and(|host| LOOPBACK_HOSTS.contains(&host))
}
