//! Canonical resource identifiers (RFC 8707).
//!
//! A protected resource names itself with a URL derived from the base URL it
//! is reachable at. Access tokens carry the resources they were issued for in
//! their `aud` claim, and [`check_resource_allowed`] is the one place that
//! decides whether an audience entry names this server.

use url::{ParseError, Position, Url};

/// Derive the canonical resource identifier for a server base URL.
///
/// Scheme and host are lower-cased and any fragment is dropped, since RFC 8707
/// forbids fragments in resource indicators. Port, path and query are kept.
/// A base URL without a path stays without one, so `https://Res.Test` becomes
/// `https://res.test` rather than `https://res.test/`.
///
/// # Errors
///
/// Returns the parse error for malformed input, and [`ParseError::EmptyHost`]
/// for URLs that have no authority (`mailto:`, `data:` and the like).
///
/// # Example
///
/// ```rust
/// use mcp_resource_server::oauth::resource_url_from_server_url;
///
/// assert_eq!(
///     resource_url_from_server_url("HTTPS://MCP.Example.com:8443/api#frag").unwrap(),
///     "https://mcp.example.com:8443/api"
/// );
/// ```
pub fn resource_url_from_server_url(server_url: &str) -> Result<String, ParseError> {
    let mut url = Url::parse(server_url)?;
    if !url.has_host() || url.host_str().is_some_and(str::is_empty) {
        return Err(ParseError::EmptyHost);
    }
    url.set_fragment(None);

    // The parser inserts "/" for special schemes that were given no path.
    if url.path() == "/" && !has_explicit_path(server_url) {
        return Ok(format!(
            "{}{}",
            &url[..Position::BeforePath],
            &url[Position::AfterPath..]
        ));
    }
    Ok(url.into())
}

/// True when the raw URL spells out a path after its authority.
fn has_explicit_path(raw: &str) -> bool {
    let Some((_, rest)) = raw.split_once("://") else {
        return true;
    };
    rest.find(['/', '?', '#'])
        .is_some_and(|idx| rest[idx..].starts_with('/'))
}

/// Decide whether `configured` (an audience entry) covers `requested`.
///
/// Both values must parse as URLs with the same origin (scheme, host and
/// effective port). The path of `configured` must then be a hierarchical
/// prefix of the path of `requested`: a token for `https://api.test/v1`
/// covers `https://api.test/v1/tools` but not `https://api.test/v10`, and a
/// token for the bare origin covers every path on it.
///
/// Anything that fails to parse never matches.
pub fn check_resource_allowed(requested: &str, configured: &str) -> bool {
    let (Ok(requested), Ok(configured)) = (Url::parse(requested), Url::parse(configured)) else {
        return false;
    };

    let origin = requested.origin();
    if !origin.is_tuple() || origin != configured.origin() {
        return false;
    }

    let requested_path = with_trailing_slash(requested.path());
    let configured_path = with_trailing_slash(configured.path());
    requested_path.starts_with(configured_path.as_str())
}

fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}
