//! OAuth 2.0 protected resource support.
//!
//! The MCP server acts as a **resource server**: it never issues tokens. It
//! asks an external authorization server about each bearer token it receives
//! and publishes Protected Resource Metadata so clients can find that
//! authorization server.
//!
//! # Architecture
//!
//! - **Resource URLs** ([`resource`]): canonical form of the server's public
//!   URL and the hierarchical audience match of RFC 8707.
//!
//! - **Token verification** ([`TokenVerifier`]): pluggable capability that
//!   turns a bearer token into an [`AccessToken`].
//!   [`IntrospectionTokenVerifier`] implements it with RFC 7662 introspection.
//!
//! - **Protected Resource Metadata** ([`ProtectedResourceMetadata`]): the
//!   RFC 9728 discovery document. [`AuthorizationServerUrls`] derives the
//!   realm endpoints it points at.
//!
//! - **Scope policy** ([`ScopePolicy`]): scopes required on every request and
//!   per tool.
//!
//! - **HTTP middleware** ([`OAuthLayer`]/[`OAuthService`]): extracts bearer
//!   tokens, verifies them, checks default scopes and injects the
//!   [`AccessToken`] into request extensions.
//!
//! # Discovery flow
//!
//! 1. Client calls the MCP endpoint without a token.
//! 2. Server answers `401` with `WWW-Authenticate: Bearer resource_metadata="..."`.
//! 3. Client fetches the metadata document to find the authorization server.
//! 4. Client obtains a token for this resource and retries with
//!    `Authorization: Bearer <token>`.

pub mod error;
pub mod introspection;
pub mod metadata;
pub mod middleware;
pub mod resource;
pub mod scope;
pub mod token;

pub use error::OAuthError;
pub use introspection::{
    IntrospectionError, IntrospectionResponse, IntrospectionTokenVerifier,
    IntrospectionTokenVerifierBuilder, VerifierBuildError,
};
pub use metadata::{AuthorizationServerUrls, ProtectedResourceMetadata};
pub use middleware::{OAuthLayer, OAuthService};
pub use resource::{check_resource_allowed, resource_url_from_server_url};
pub use scope::{ScopePolicy, ScopeRequirement};
pub use token::{AccessToken, TokenAudience, TokenVerifier};
