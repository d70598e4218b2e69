//! OAuth 2.0 bearer token errors and WWW-Authenticate header construction.
//!
//! Implements error responses per RFC 6750 Section 3, including the
//! `resource_metadata` parameter from RFC 9728 for Protected Resource
//! Metadata discovery.

use std::fmt;

/// Rejection of a bearer-token request.
///
/// Each variant maps to an HTTP status code and a `WWW-Authenticate` header
/// value per RFC 6750 Section 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// No bearer token was provided in the request.
    /// Returns HTTP 401 with no error code.
    MissingToken,

    /// The token could not be verified.
    /// Returns HTTP 401 with `error="invalid_token"`.
    InvalidToken {
        /// Human-readable description sent to the client.
        description: String,
    },

    /// The token's scopes are insufficient for the requested operation.
    /// Returns HTTP 403 with `error="insufficient_scope"`.
    InsufficientScope {
        /// Scopes required by the operation.
        required: Vec<String>,
        /// Scopes present in the token.
        provided: Vec<String>,
    },
}

impl OAuthError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            OAuthError::InsufficientScope { .. } => 403,
            _ => 401,
        }
    }

    /// Builds the `WWW-Authenticate` header value per RFC 6750 Section 3.
    ///
    /// `resource_metadata_url` adds the RFC 9728 discovery parameter and
    /// `scope` advertises the scopes a client should request. For
    /// [`OAuthError::InsufficientScope`] the required scopes take precedence
    /// over `scope`.
    pub fn www_authenticate(&self, resource_metadata_url: Option<&str>, scope: Option<&str>) -> String {
        let mut parts = Vec::new();

        if let Some(url) = resource_metadata_url {
            parts.push(format!("resource_metadata=\"{}\"", url));
        }

        match self {
            // RFC 6750 Section 3: no error code when the request carried no credentials.
            OAuthError::MissingToken => {}
            OAuthError::InvalidToken { description } => {
                parts.push("error=\"invalid_token\"".to_string());
                parts.push(format!(
                    "error_description=\"{}\"",
                    description.replace('"', "'")
                ));
            }
            OAuthError::InsufficientScope { .. } => {
                parts.push("error=\"insufficient_scope\"".to_string());
            }
        }

        let scope = match self {
            OAuthError::InsufficientScope { required, .. } if !required.is_empty() => {
                Some(required.join(" "))
            }
            _ => scope.filter(|s| !s.is_empty()).map(str::to_string),
        };
        if let Some(scope) = scope {
            parts.push(format!("scope=\"{}\"", scope));
        }

        if parts.is_empty() {
            "Bearer".to_string()
        } else {
            format!("Bearer {}", parts.join(", "))
        }
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OAuthError::MissingToken => write!(f, "missing bearer token"),
            OAuthError::InvalidToken { description } => {
                write!(f, "invalid token: {}", description)
            }
            OAuthError::InsufficientScope { required, provided } => write!(
                f,
                "insufficient scope: required [{}], provided [{}]",
                required.join(", "),
                provided.join(", ")
            ),
        }
    }
}

impl std::error::Error for OAuthError {}
