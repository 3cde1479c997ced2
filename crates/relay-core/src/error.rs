//! Hub-level error type.

use thiserror::Error;

/// Errors produced by the hub itself.
///
/// Per-connection I/O failures are [`crate::ConnectionError`]s and stay
/// inside the handler or relay loop that observed them; only these two
/// conditions are ever returned to the caller of the hub.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The role parameter was missing or not one of the recognised values.
    ///
    /// The string is the raw value the client supplied (empty if absent).
    #[error("unrecognised role '{0}'")]
    InvalidRole(String),

    /// The relay loop has stopped, so payloads can no longer be ingested.
    #[error("relay loop is no longer running")]
    QueueClosed,
}
