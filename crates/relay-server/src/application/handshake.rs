//! Handshake inspection.
//!
//! Runs inside the WebSocket upgrade, before the `101 Switching Protocols`
//! response is sent.  Two questions are answered here:
//!
//! 1. Is the request for the relay endpoint?  Only one path is upgraded.
//! 2. Which role did the client ask for?  Read from the query string,
//!    `mode` first (what existing clients send), then `role`.
//!
//! The query string is decoded as `application/x-www-form-urlencoded`
//! (`%XX` escapes and `+` for space), so `?mode=%6Cisten` asks for `listen`.
//! Values are not case-folded; resolving them is the hub's job.

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use url::form_urlencoded;

/// Query keys that carry the role, in order of precedence.
pub const ROLE_QUERY_KEYS: [&str; 2] = ["mode", "role"];

/// Why a socket never became a relay connection.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The upgrade request was for some other path; answered with 404.
    #[error("request path '{actual}' does not match '{expected}'")]
    WrongPath { expected: String, actual: String },

    /// The WebSocket upgrade itself failed (bad request, I/O error, ...).
    #[error("WebSocket upgrade failed: {0}")]
    Upgrade(#[from] tungstenite::Error),
}

/// Checks the request path and extracts the raw role parameter.
///
/// Returns `Ok(None)` when the path matches but no role key is present.
///
/// # Errors
///
/// [`HandshakeError::WrongPath`] if `path` is not exactly `expected_path`.
pub fn inspect_request(
    expected_path: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Option<String>, HandshakeError> {
    if path != expected_path {
        return Err(HandshakeError::WrongPath {
            expected: expected_path.to_string(),
            actual: path.to_string(),
        });
    }
    Ok(query.and_then(role_param))
}

/// Finds the decoded role value in a query string (without the leading `?`).
///
/// The first occurrence of `mode` wins; `role` is only consulted when no
/// `mode` key exists.  A key without `=` yields an empty value.
pub fn role_param(query: &str) -> Option<String> {
    ROLE_QUERY_KEYS.iter().find_map(|key| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k.as_ref() == *key)
            .map(|(_, v)| v.into_owned())
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
