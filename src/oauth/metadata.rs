//! Discovery documents.
//!
//! [`ProtectedResourceMetadata`] is the RFC 9728 document this server
//! publishes so clients can find its authorization server.
//! [`AuthorizationServerUrls`] derives the endpoints of a Keycloak-style realm
//! from its base URL.

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use url::Url;

/// Well-known path for Protected Resource Metadata (RFC 9728 Section 3).
pub const WELL_KNOWN_PATH: &str = "/.well-known/oauth-protected-resource";

/// Protected Resource Metadata per RFC 9728 Section 3.
///
/// # Example
///
/// ```rust
/// use mcp_resource_server::oauth::ProtectedResourceMetadata;
///
/// let metadata = ProtectedResourceMetadata::new("https://mcp.example.com")
///     .authorization_server("https://auth.example.com/realms/master/")
///     .scope("mcp:tools");
///
/// assert_eq!(
///     metadata.metadata_url(),
///     "https://mcp.example.com/.well-known/oauth-protected-resource"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The resource server's identifier URL.
    pub resource: String,

    /// Authorization server issuer URLs that can issue tokens for this resource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,

    /// OAuth scopes supported by this resource server.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes_supported: Vec<String>,

    /// Methods supported for sending bearer tokens. Defaults to `["header"]`.
    #[serde(default = "default_bearer_methods")]
    pub bearer_methods_supported: Vec<String>,
}

fn default_bearer_methods() -> Vec<String> {
    vec!["header".to_string()]
}

impl ProtectedResourceMetadata {
    /// Create new metadata with the resource server's identifier URL.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: Vec::new(),
            scopes_supported: Vec::new(),
            bearer_methods_supported: default_bearer_methods(),
        }
    }

    /// Add an authorization server issuer URL.
    pub fn authorization_server(mut self, issuer_url: impl Into<String>) -> Self {
        self.authorization_servers.push(issuer_url.into());
        self
    }

    /// Add a supported OAuth scope.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes_supported.push(scope.into());
        self
    }

    /// Path the document is served at.
    ///
    /// RFC 9728 Section 3.1 inserts the well-known segment between the host
    /// and the resource path, so `https://host/mcp` publishes its metadata at
    /// `/.well-known/oauth-protected-resource/mcp`.
    pub fn metadata_path(&self) -> String {
        let resource_path = Url::parse(&self.resource)
            .map(|url| url.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        format!("{WELL_KNOWN_PATH}{resource_path}")
    }

    /// Absolute URL of the document, as advertised in `WWW-Authenticate`.
    pub fn metadata_url(&self) -> String {
        match Url::parse(&self.resource) {
            Ok(url) if url.origin().is_tuple() => {
                format!("{}{}", url.origin().ascii_serialization(), self.metadata_path())
            }
            _ => format!("{}{}", self.resource.trim_end_matches('/'), WELL_KNOWN_PATH),
        }
    }

    /// An axum router serving this document at [`metadata_path`](Self::metadata_path).
    pub fn into_router(self) -> Router {
        let path = self.metadata_path();
        Router::new().route(
            &path,
            get(move || {
                let document = self.clone();
                async move { Json(document) }
            }),
        )
    }
}

/// Endpoints of an OpenID Connect realm (Keycloak layout).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationServerUrls {
    pub issuer: String,
    pub introspection_endpoint: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
}

impl AuthorizationServerUrls {
    /// Derive the endpoints from a realm base URL such as
    /// `http://localhost:8080/realms/master/`.
    ///
    /// Endpoints are RFC 3986 references resolved against the base, so the
    /// base needs its trailing slash: without it the last path segment is
    /// replaced rather than extended. The issuer is the base URL as given.
    pub fn from_realm_base(base: &str) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(base)?;
        let endpoint = |suffix: &str| base_url.join(suffix).map(String::from);

        Ok(Self {
            issuer: base.to_string(),
            introspection_endpoint: endpoint("protocol/openid-connect/token/introspect")?,
            authorization_endpoint: endpoint("protocol/openid-connect/auth")?,
            token_endpoint: endpoint("protocol/openid-connect/token")?,
        })
    }
}
