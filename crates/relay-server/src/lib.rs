//! relay-server library crate.
//!
//! Puts the `relay-core` hub behind a WebSocket endpoint.  Every accepted
//! socket is upgraded, its role parameter extracted, and the resulting
//! [`infrastructure::WsConnection`] handed to
//! [`relay_core::handle_connection`].
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients (?mode=broadcast | listen | both)
//!         ↕
//! [relay-server]
//!   ├── domain/           ServerConfig and the TOML file schema
//!   ├── application/      Handshake inspection: path check, role parameter
//!   └── infrastructure/
//!         ├── ws_connection/  Connection port over tokio-tungstenite
//!         └── ws_server/      Accept loop, one task per socket
//!         ↕
//! [relay-core]  Registry, RelayLoop, handle_connection
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O beyond reading its own config file.
//! - `application` is pure string handling and is tested without sockets.
//! - `infrastructure` owns every socket and every spawned task.

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: handshake inspection.
pub mod application;

/// Infrastructure layer: WebSocket transport and accept loop.
pub mod infrastructure;

pub use application::HandshakeError;
pub use domain::{ConfigError, FileConfig, ServerConfig};
pub use infrastructure::{run_server, serve, WsConnection};
