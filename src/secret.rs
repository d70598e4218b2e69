//! Redacting wrapper for credentials.
//!
//! The resource server holds its own OAuth client secret for the lifetime of
//! the process and forwards it on every introspection call. [`SecretString`]
//! keeps it out of `Debug`/`Display` output so configuration dumps, startup
//! logs and error messages never contain it.
//!
//! ```rust
//! use mcp_resource_server::SecretString;
//!
//! let secret = SecretString::with_label("s3cr3t", "OAUTH_CLIENT_SECRET");
//! assert_eq!(format!("{:?}", secret), "[OAUTH_CLIENT_SECRET]");
//! assert_eq!(secret.expose(), "s3cr3t");
//! ```

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

const DEFAULT_LABEL: &str = "REDACTED";

/// A string whose contents never appear in formatted output.
///
/// Use [`expose()`](SecretString::expose) at the single point where the value
/// has to leave the process.
#[derive(Clone)]
pub struct SecretString {
    value: String,
    label: Cow<'static, str>,
}

impl SecretString {
    /// Wrap a value with the default `[REDACTED]` label.
    pub fn new(s: impl Into<String>) -> Self {
        Self {
            value: s.into(),
            label: Cow::Borrowed(DEFAULT_LABEL),
        }
    }

    /// Wrap a value with a custom redaction label, shown as `[LABEL]`.
    pub fn with_label(s: impl Into<String>, label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            value: s.into(),
            label: label.into(),
        }
    }

    /// Expose the underlying secret value.
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl Debug for SecretString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label)
    }
}

impl Display for SecretString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.label)
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SecretString {}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lets command-line and environment parsers produce secrets directly.
impl FromStr for SecretString {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_are_redacted() {
        let secret = SecretString::new("my-secret-key");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_custom_label() {
        let secret = SecretString::with_label("value", "CLIENT_SECRET");
        assert_eq!(format!("{:?}", secret), "[CLIENT_SECRET]");
        assert_eq!(secret.label(), "CLIENT_SECRET");
        assert_eq!(secret.expose(), "value");
    }

    #[test]
    fn test_equality_ignores_label() {
        assert_eq!(
            SecretString::new("same"),
            SecretString::with_label("same", "OTHER")
        );
        assert_ne!(SecretString::new("a"), SecretString::new("b"));
    }

    #[test]
    fn test_from_str() {
        let secret: SecretString = "from-env".parse().unwrap();
        assert_eq!(secret.expose(), "from-env");
        assert!(!secret.is_empty());
        assert!(SecretString::from("").is_empty());
    }

    #[test]
    fn test_struct_debug_hides_secret() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Credentials {
            client_id: String,
            client_secret: SecretString,
        }

        let creds = Credentials {
            client_id: "mcp-server".to_string(),
            client_secret: SecretString::new("super-secret"),
        };

        let debug_output = format!("{:?}", creds);
        assert!(debug_output.contains("mcp-server"));
        assert!(!debug_output.contains("super-secret"));
    }
}
