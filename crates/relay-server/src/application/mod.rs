//! Application layer: decisions made while a WebSocket upgrade is in flight.

pub mod handshake;

pub use handshake::{inspect_request, role_param, HandshakeError, ROLE_QUERY_KEYS};
