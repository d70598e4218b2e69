//! Error types for the MCP resource server

use serde::{Deserialize, Serialize};

/// Type-erased error used at service boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// JSON-RPC error codes used by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid JSON was received
    ParseError = -32700,
    /// The JSON sent is not a valid Request object
    InvalidRequest = -32600,
    /// The method does not exist / is not available
    MethodNotFound = -32601,
    /// Invalid method parameter(s)
    InvalidParams = -32602,
    /// Internal JSON-RPC error
    InternalError = -32603,
    /// The caller is not authenticated or lacks a required scope
    Unauthorized = -32001,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Rejection of a call the caller's token does not authorize.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }
}

impl From<crate::oauth::OAuthError> for JsonRpcError {
    fn from(err: crate::oauth::OAuthError) -> Self {
        Self::unauthorized(err.to_string())
    }
}

/// Error type for tool registration and execution
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("JSON-RPC error: {0:?}")]
    JsonRpc(JsonRpcError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tool error with a message
    pub fn tool(message: impl Into<String>) -> Self {
        Error::Tool(message.into())
    }
}

impl From<JsonRpcError> for Error {
    fn from(err: JsonRpcError) -> Self {
        Error::JsonRpc(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::OAuthError;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::Unauthorized.code(), -32001);
    }

    #[test]
    fn test_method_not_found_message() {
        let err = JsonRpcError::method_not_found("resources/list");
        assert_eq!(err.message, "Method not found: resources/list");
    }

    #[test]
    fn test_oauth_error_maps_to_unauthorized() {
        let err: JsonRpcError = OAuthError::InsufficientScope {
            required: vec!["mcp:math".to_string()],
            provided: vec!["mcp:tools".to_string()],
        }
        .into();
        assert_eq!(err.code, -32001);
        assert!(err.message.contains("mcp:math"));
    }

    #[test]
    fn test_data_is_omitted_when_absent() {
        let json = serde_json::to_value(JsonRpcError::internal_error("boom")).unwrap();
        assert!(json.get("data").is_none());
        let json =
            serde_json::to_value(JsonRpcError::invalid_params("x").with_data(serde_json::json!(1)))
                .unwrap();
        assert_eq!(json["data"], 1);
    }
}
