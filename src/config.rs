//! Server configuration
//!
//! Every setting is a command-line flag with an environment variable
//! fallback, so the server runs unchanged under a container orchestrator or
//! from a shell:
//!
//! ```text
//! OAUTH_CLIENT_SECRET=... mcp-resource-server --port 3000 --transport sse
//! ```

use std::fmt;

use clap::Parser;
use url::Url;

use crate::secret::SecretString;

/// Configuration errors, reported before the server binds.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid transport: {0}. Must be 'sse' or 'streamable-http'")]
    InvalidTransport(String),

    #[error("Invalid {name} '{value}': {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("OAUTH_CLIENT_SECRET must not be empty")]
    EmptyClientSecret,
}

/// Which MCP transport the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// `POST /` with `mcp-session-id` sessions.
    StreamableHttp,
    /// `GET /sse` event stream plus `POST /messages/`.
    Sse,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportMode::StreamableHttp => "streamable-http",
            TransportMode::Sse => "sse",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streamable-http" => Ok(TransportMode::StreamableHttp),
            "sse" => Ok(TransportMode::Sse),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

/// MCP resource server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-resource-server", version, about)]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub host: String,

    /// Port to bind
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Authorization server host
    #[arg(long, env = "AUTH_HOST", default_value = "localhost")]
    pub auth_host: String,

    /// Authorization server port
    #[arg(long, env = "AUTH_PORT", default_value_t = 8080)]
    pub auth_port: u16,

    /// Authorization server realm
    #[arg(long, env = "AUTH_REALM", default_value = "master")]
    pub auth_realm: String,

    /// Client id this server authenticates to the introspection endpoint with
    #[arg(long, env = "OAUTH_CLIENT_ID", default_value = "mcp-server")]
    pub client_id: String,

    /// Client secret for the introspection endpoint
    #[arg(long, env = "OAUTH_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: SecretString,

    /// Scope every request must carry
    #[arg(long, env = "MCP_SCOPE", default_value = "mcp:tools")]
    pub mcp_scope: String,

    /// `streamable-http` or `sse`
    #[arg(long, env = "TRANSPORT", default_value = "streamable-http")]
    pub transport: String,

    /// Public URL of this server [default: http://{host}:{port}]
    #[arg(long, env = "SERVER_URL")]
    pub server_url: Option<String>,

    /// Realm base URL [default: http://{auth_host}:{auth_port}/realms/{auth_realm}/]
    #[arg(long, env = "AUTH_BASE_URL")]
    pub auth_base_url: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Public URL of this server, which is also its resource identifier.
    pub fn server_url(&self) -> String {
        self.server_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }

    /// Base URL of the authorization server realm, with a trailing slash.
    pub fn auth_base_url(&self) -> String {
        self.auth_base_url.clone().unwrap_or_else(|| {
            format!(
                "http://{}:{}/realms/{}/",
                self.auth_host, self.auth_port, self.auth_realm
            )
        })
    }

    /// Address to bind, as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the settings that cannot be checked by the parser.
    pub fn validate(&self) -> Result<TransportMode, ConfigError> {
        let mode = self.transport.parse::<TransportMode>()?;

        for (name, value) in [
            ("server URL", self.server_url()),
            ("authorization server URL", self.auth_base_url()),
        ] {
            if let Err(source) = Url::parse(&value) {
                return Err(ConfigError::InvalidUrl {
                    name,
                    value,
                    source,
                });
            }
        }

        if self.client_secret.is_empty() {
            return Err(ConfigError::EmptyClientSecret);
        }

        Ok(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["mcp-resource-server", "--client-secret", "s3cr3t"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_derived_urls() {
        let config = parse(&["--host", "0.0.0.0", "--port", "9000", "--auth-realm", "mcp"]);
        assert_eq!(config.server_url(), "http://0.0.0.0:9000");
        assert_eq!(config.auth_base_url(), "http://localhost:8080/realms/mcp/");
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
        assert_eq!(config.validate().unwrap(), TransportMode::StreamableHttp);
    }

    #[test]
    fn test_explicit_urls_win() {
        let config = parse(&[
            "--server-url",
            "https://mcp.example.com",
            "--auth-base-url",
            "https://idp.example.com/realms/prod/",
        ]);
        assert_eq!(config.server_url(), "https://mcp.example.com");
        assert_eq!(config.auth_base_url(), "https://idp.example.com/realms/prod/");
    }

    #[test]
    fn test_transport_validation() {
        assert_eq!(
            parse(&["--transport", "sse"]).validate().unwrap(),
            TransportMode::Sse
        );

        let err = parse(&["--transport", "stdio"]).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid transport: stdio. Must be 'sse' or 'streamable-http'"
        );
    }

    #[test]
    fn test_invalid_server_url() {
        let err = parse(&["--server-url", "not a url"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { name: "server URL", .. }));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let config = Config::try_parse_from(["mcp-resource-server", "--client-secret", ""]).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyClientSecret)));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = parse(&[]);
        assert!(!format!("{:?}", config).contains("s3cr3t"));
    }
}
