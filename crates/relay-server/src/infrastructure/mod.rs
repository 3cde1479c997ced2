//! Infrastructure layer: sockets, WebSocket framing, and task management.

pub mod ws_connection;
pub mod ws_server;

pub use ws_connection::WsConnection;
pub use ws_server::{run_server, serve};
