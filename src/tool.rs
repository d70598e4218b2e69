//! Tool definition and builder API
//!
//! Tools are built with a fluent builder. The handler receives a typed input
//! deserialized from the call arguments; its JSON Schema is derived with
//! `schemars` and published through `tools/list`.
//!
//! ```rust
//! use mcp_resource_server::{CallToolResult, ToolBuilder};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct EchoInput {
//!     message: String,
//! }
//!
//! let tool = ToolBuilder::new("echo")
//!     .description("Echo a message back")
//!     .read_only()
//!     .handler(|input: EchoInput| async move { Ok(CallToolResult::text(input.message)) })
//!     .build()
//!     .unwrap();
//! assert_eq!(tool.name, "echo");
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::protocol::{CallToolResult, ToolAnnotations, ToolDefinition};

/// Maximum tool name length.
pub const MAX_TOOL_NAME_LEN: usize = 128;

/// Validate a tool name.
///
/// Tool names must be 1-128 characters of ASCII letters, digits, `_`, `-`
/// or `.`.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::tool("Tool name cannot be empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::tool(format!(
            "Tool name '{}' exceeds maximum length of {} characters (got {})",
            name,
            MAX_TOOL_NAME_LEN,
            name.len()
        )));
    }
    if let Some(invalid_char) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
    {
        return Err(Error::tool(format!(
            "Tool name '{}' contains invalid character '{}'",
            name, invalid_char
        )));
    }
    Ok(())
}

/// A boxed future for tool handlers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes a tool from raw JSON arguments.
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: Value) -> BoxFuture<'_, Result<CallToolResult>>;

    /// JSON Schema of the accepted arguments.
    fn input_schema(&self) -> Value;
}

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: Option<String>,
    pub annotations: Option<ToolAnnotations>,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

impl Tool {
    pub fn builder(name: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(name)
    }

    /// The entry published by `tools/list`.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.handler.input_schema(),
            annotations: self.annotations.clone(),
        }
    }

    /// Run the tool.
    ///
    /// Handler failures, including arguments that do not match the input
    /// type, come back as a [`CallToolResult`] with `is_error` set.
    pub async fn call(&self, args: Value) -> CallToolResult {
        match self.handler.call(args).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!(tool = %self.name, error = %err, "Tool returned an error");
                CallToolResult::error(err.to_string())
            }
        }
    }
}

/// Builder for [`Tool`].
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    annotations: Option<ToolAnnotations>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            annotations: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Human-readable title, published as an annotation.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.annotations.get_or_insert_with(Default::default).title = Some(title.into());
        self
    }

    /// Mark the tool as not modifying any state.
    pub fn read_only(mut self) -> Self {
        self.annotations
            .get_or_insert_with(Default::default)
            .read_only_hint = true;
        self
    }

    /// Mark repeated calls with the same arguments as having the same effect.
    pub fn idempotent(mut self) -> Self {
        self.annotations
            .get_or_insert_with(Default::default)
            .idempotent_hint = true;
        self
    }

    /// Set the handler. Arguments are deserialized into `I` before it runs.
    pub fn handler<I, F, Fut>(self, handler: F) -> ToolBuilderWithHandler<I, F>
    where
        I: JsonSchema + DeserializeOwned + Send + Sync + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        ToolBuilderWithHandler {
            builder: self,
            handler,
            _phantom: PhantomData,
        }
    }
}

/// Builder state after the handler is set.
pub struct ToolBuilderWithHandler<I, F> {
    builder: ToolBuilder,
    handler: F,
    _phantom: PhantomData<fn(I)>,
}

impl<I, F, Fut> ToolBuilderWithHandler<I, F>
where
    I: JsonSchema + DeserializeOwned + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
{
    /// Build the tool. Fails if the name is invalid.
    pub fn build(self) -> Result<Tool> {
        validate_tool_name(&self.builder.name)?;
        Ok(Tool {
            name: self.builder.name,
            description: self.builder.description,
            annotations: self.builder.annotations,
            handler: Arc::new(TypedHandler {
                handler: self.handler,
                _phantom: PhantomData,
            }),
        })
    }
}

/// Handler that deserializes input to a specific type
struct TypedHandler<I, F> {
    handler: F,
    _phantom: PhantomData<fn(I)>,
}

impl<I, F, Fut> ToolHandler for TypedHandler<I, F>
where
    I: JsonSchema + DeserializeOwned + Send + Sync + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
{
    fn call(&self, args: Value) -> BoxFuture<'_, Result<CallToolResult>> {
        Box::pin(async move {
            let input: I = serde_json::from_value(args)
                .map_err(|e| Error::tool(format!("Invalid input: {}", e)))?;
            (self.handler)(input).await
        })
    }

    fn input_schema(&self) -> Value {
        let schema = schemars::schema_for!(I);
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct GreetInput {
        name: String,
    }

    fn greet() -> Tool {
        ToolBuilder::new("greet")
            .description("Greet someone")
            .read_only()
            .handler(|input: GreetInput| async move {
                Ok(CallToolResult::text(format!("Hello, {}!", input.name)))
            })
            .build()
            .expect("valid tool name")
    }

    #[tokio::test]
    async fn test_builder_tool() {
        let tool = greet();
        assert_eq!(tool.name, "greet");
        assert_eq!(tool.description.as_deref(), Some("Greet someone"));

        let result = tool.call(serde_json::json!({"name": "World"})).await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_invalid_arguments_become_tool_error() {
        let result = greet().call(serde_json::json!({"nom": "World"})).await;
        assert!(result.is_error);
    }

    #[test]
    fn test_definition_has_schema_and_annotations() {
        let definition = greet().definition();
        assert_eq!(definition.input_schema["type"], "object");
        assert!(definition.input_schema["properties"]["name"].is_object());
        assert!(definition.annotations.unwrap().read_only_hint);
    }

    #[test]
    fn test_invalid_tool_names() {
        assert!(
            validate_tool_name("")
                .unwrap_err()
                .to_string()
                .contains("cannot be empty")
        );
        assert!(
            validate_tool_name(&"a".repeat(129))
                .unwrap_err()
                .to_string()
                .contains("exceeds maximum")
        );
        assert!(
            validate_tool_name("my tool!")
                .unwrap_err()
                .to_string()
                .contains("invalid character")
        );
    }

    #[test]
    fn test_valid_tool_names() {
        for name in ["add_numbers", "a", "tool-1.v2", &"x".repeat(128)] {
            assert!(validate_tool_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_build_rejects_invalid_name() {
        let result = ToolBuilder::new("bad name")
            .handler(|input: GreetInput| async move { Ok(CallToolResult::text(input.name)) })
            .build();
        assert!(result.is_err());
    }
}
