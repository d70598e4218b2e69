//! Verified access tokens and the verifier capability.
//!
//! Provides [`AccessToken`], the principal produced by a successful
//! verification, and the [`TokenVerifier`] trait consumed by the HTTP
//! middleware.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use super::error::OAuthError;

/// Audience claim value, which can be a single string or array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenAudience {
    /// A single audience string.
    Single(String),
    /// Multiple audience strings.
    Multiple(Vec<String>),
}

impl TokenAudience {
    /// View the audience as a uniform list of entries.
    pub fn as_slice(&self) -> &[String] {
        match self {
            TokenAudience::Single(aud) => std::slice::from_ref(aud),
            TokenAudience::Multiple(auds) => auds,
        }
    }
}

/// A bearer token that passed verification.
///
/// Lives only as long as the request it authorizes. The middleware places it
/// in the request extensions so transports and handlers can read the caller's
/// client id and granted scopes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The raw bearer token.
    pub token: String,
    /// Client the token was issued to.
    pub client_id: String,
    /// Granted scopes, in the order the authorization server listed them.
    pub scopes: Vec<String>,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<serde_json::Number>,
    /// Audience value exactly as the authorization server returned it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<TokenAudience>,
}

impl AccessToken {
    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// The granted scopes as a set.
    pub fn scope_set(&self) -> HashSet<String> {
        self.scopes.iter().cloned().collect()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Trait for verifying bearer tokens.
///
/// Implementations decide whether a token is currently valid for this
/// resource server. Every failure is reported as an [`OAuthError`]; callers
/// never learn more than "not verified".
///
/// # Example
///
/// ```rust
/// use mcp_resource_server::oauth::{AccessToken, OAuthError, TokenVerifier};
///
/// #[derive(Clone)]
/// struct AllowList(Vec<String>);
///
/// impl TokenVerifier for AllowList {
///     async fn verify_token(&self, token: &str) -> Result<AccessToken, OAuthError> {
///         if !self.0.iter().any(|t| t == token) {
///             return Err(OAuthError::InvalidToken {
///                 description: "unknown token".to_string(),
///             });
///         }
///         Ok(AccessToken {
///             token: token.to_string(),
///             client_id: "local".to_string(),
///             scopes: vec!["mcp:tools".to_string()],
///             expires_at: None,
///             resource: None,
///         })
///     }
/// }
/// ```
pub trait TokenVerifier: Clone + Send + Sync + 'static {
    /// Verify a bearer token and return the principal it represents.
    fn verify_token(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<AccessToken, OAuthError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(scopes: &[&str]) -> AccessToken {
        AccessToken {
            token: "secret-token".to_string(),
            client_id: "c1".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_at: Some(9_999_999_999u64.into()),
            resource: Some(TokenAudience::Single("https://res.test".to_string())),
        }
    }

    #[test]
    fn test_audience_single_and_list() {
        let single: TokenAudience = serde_json::from_value(serde_json::json!("https://a.test")).unwrap();
        assert_eq!(single.as_slice(), ["https://a.test".to_string()]);

        let list: TokenAudience =
            serde_json::from_value(serde_json::json!(["https://a.test", "https://b.test"])).unwrap();
        assert_eq!(list.as_slice().len(), 2);
        assert_eq!(list.as_slice()[1], "https://b.test");
    }

    #[test]
    fn test_audience_rejects_other_shapes() {
        assert!(serde_json::from_value::<TokenAudience>(serde_json::json!(42)).is_err());
        assert!(serde_json::from_value::<TokenAudience>(serde_json::json!([1, 2])).is_err());
        assert!(serde_json::from_value::<TokenAudience>(serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_audience_serializes_as_received() {
        let single = TokenAudience::Single("https://a.test".to_string());
        assert_eq!(serde_json::to_value(&single).unwrap(), "https://a.test");

        let list = TokenAudience::Multiple(vec!["x".to_string()]);
        assert_eq!(serde_json::to_value(&list).unwrap(), serde_json::json!(["x"]));
    }

    #[test]
    fn test_has_scope() {
        let t = token(&["mcp:tools", "admin"]);
        assert!(t.has_scope("mcp:tools"));
        assert!(t.has_scope("admin"));
        assert!(!t.has_scope("mcp"));
        assert_eq!(t.scope_set().len(), 2);
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", token(&[]));
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("c1"));
    }
}
