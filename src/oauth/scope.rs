//! OAuth scope requirements.
//!
//! [`ScopeRequirement`] is a set of scopes that must all be granted.
//! [`ScopePolicy`] pairs a requirement applied to every authenticated request
//! with optional per-tool requirements checked at `tools/call`.

use std::collections::{HashMap, HashSet};

use super::error::OAuthError;
use super::token::AccessToken;

/// A set of required OAuth scopes (AND semantics).
#[derive(Debug, Clone, Default)]
pub struct ScopeRequirement {
    required: HashSet<String>,
}

impl ScopeRequirement {
    /// Create an empty scope requirement (no scopes needed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope requirement from a single scope.
    pub fn one(scope: impl Into<String>) -> Self {
        Self::new().require(scope)
    }

    /// Create a scope requirement from multiple scopes.
    pub fn all(scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a required scope to this requirement.
    pub fn require(mut self, scope: impl Into<String>) -> Self {
        self.required.insert(scope.into());
        self
    }

    /// Check that every required scope was granted to `token`.
    ///
    /// On failure the error lists the required and the granted scopes, both
    /// sorted so challenges are stable.
    pub fn check(&self, token: &AccessToken) -> Result<(), OAuthError> {
        if self.required.is_subset(&token.scope_set()) {
            return Ok(());
        }
        Err(OAuthError::InsufficientScope {
            required: self.sorted(),
            provided: token.scopes.clone(),
        })
    }

    /// The required scopes as a space-delimited string, if any.
    pub fn to_scope_string(&self) -> Option<String> {
        (!self.required.is_empty()).then(|| self.sorted().join(" "))
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    fn sorted(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.required.iter().cloned().collect();
        scopes.sort();
        scopes
    }
}

/// Policy mapping MCP operations to their required OAuth scopes.
///
/// # Example
///
/// ```rust
/// use mcp_resource_server::oauth::ScopePolicy;
///
/// let policy = ScopePolicy::new()
///     .default_scope("mcp:tools")
///     .tool_scope("multiply_numbers", "mcp:math");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScopePolicy {
    default_scopes: ScopeRequirement,
    tool_scopes: HashMap<String, ScopeRequirement>,
}

impl ScopePolicy {
    /// Create an empty scope policy (no scopes required for anything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a scope on every authenticated request.
    pub fn default_scope(mut self, scope: impl Into<String>) -> Self {
        self.default_scopes = self.default_scopes.require(scope);
        self
    }

    /// Require a scope for one tool, on top of the default scopes.
    pub fn tool_scope(mut self, tool_name: impl Into<String>, scope: impl Into<String>) -> Self {
        let entry = self.tool_scopes.entry(tool_name.into()).or_default();
        entry.required.insert(scope.into());
        self
    }

    /// Check the default requirement.
    pub fn check_default(&self, token: &AccessToken) -> Result<(), OAuthError> {
        self.default_scopes.check(token)
    }

    /// Check the default requirement and the one registered for `tool_name`.
    pub fn check_tool(&self, tool_name: &str, token: &AccessToken) -> Result<(), OAuthError> {
        self.default_scopes.check(token)?;
        if let Some(req) = self.tool_scopes.get(tool_name) {
            req.check(token)?;
        }
        Ok(())
    }

    /// True when a tool call needs any scope at all.
    pub fn requires_scopes_for(&self, tool_name: &str) -> bool {
        !self.default_scopes.is_empty()
            || self.tool_scopes.get(tool_name).is_some_and(|r| !r.is_empty())
    }

    /// Scope hint advertised in challenges for unauthenticated requests.
    pub fn default_scope_hint(&self) -> Option<String> {
        self.default_scopes.to_scope_string()
    }
}
