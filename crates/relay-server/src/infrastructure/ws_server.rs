//! WebSocket server: accept loop and per-socket session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding the TCP listener and starting the hub's relay loop.
//! 2. Accepting TCP connections, one Tokio task per socket.
//! 3. Upgrading each socket to a WebSocket, rejecting any path other than
//!    the configured one with a 404 and capturing the role parameter.
//! 4. Handing the upgraded connection to [`handle_connection`] and logging
//!    how the session ended.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Nothing a single client does (a failed handshake, a bad role, a broken
//! socket) can stop the accept loop; only failing to bind is fatal.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{error, info, warn};

use relay_core::{handle_connection, Connection, RelayHub};

use crate::application::{inspect_request, HandshakeError};
use crate::domain::ServerConfig;
use crate::infrastructure::ws_connection::WsConnection;

/// How often the accept loop wakes up to check the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr`, starts the relay, and serves until `running`
/// is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (port in use,
/// missing permission, ...).
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

    info!(
        "relay listening on ws://{}{} (unknown roles: {}, queue capacity: {}, forward subscribers: {})",
        config.bind_addr,
        config.path,
        config.hub.on_unknown_role,
        config.hub.queue_capacity,
        config.hub.forward_subscriber_messages
    );

    let (hub, relay_loop) = RelayHub::new(config.hub.clone());
    tokio::spawn(relay_loop.run());

    serve(listener, hub, Arc::new(config), running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out of [`run_server`] so callers (and tests) can bind an
/// ephemeral port and keep a handle on the hub.
///
/// # Errors
///
/// Never fails today; the `Result` leaves room for fatal listener errors.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<RelayHub>,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the shutdown flag is checked even when idle.
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let hub = Arc::clone(&hub);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_socket(stream, peer_addr, hub, config).await;
                });
            }
            Ok(Err(e)) => {
                // Usually transient (e.g. out of file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-socket session ────────────────────────────────────────────────────────

async fn handle_socket(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<RelayHub>,
    config: Arc<ServerConfig>,
) {
    let (ws, role_param) = match upgrade(stream, &config.path).await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!("handshake with {peer_addr} failed: {e}");
            return;
        }
    };

    let connection = Arc::new(WsConnection::new(ws, peer_addr, config.write_timeout));
    let id = connection.id();
    info!("WebSocket session {id} established with {peer_addr}");

    match handle_connection(&hub, connection, role_param.as_deref()).await {
        Ok(summary) => info!(
            "session {id} ({peer_addr}) ended: {:?}, {} received, {} forwarded",
            summary.end, summary.messages_received, summary.messages_forwarded
        ),
        Err(e) => warn!("session {id} ({peer_addr}) rejected: {e}"),
    }
}

/// Completes the WebSocket upgrade and returns the raw role parameter.
async fn upgrade(
    stream: TcpStream,
    expected_path: &str,
) -> Result<(WebSocketStream<TcpStream>, Option<String>), HandshakeError> {
    let mut role_param = None;
    let mut rejection = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let uri = request.uri();
        match inspect_request(expected_path, uri.path(), uri.query()) {
            Ok(param) => {
                role_param = param;
                Ok(response)
            }
            Err(e) => {
                let mut not_found = ErrorResponse::new(Some(e.to_string()));
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                rejection = Some(e);
                Err(not_found)
            }
        }
    };

    let result = accept_hdr_async(stream, callback).await;
    match result {
        Ok(ws) => Ok((ws, role_param)),
        Err(e) => Err(rejection.unwrap_or(HandshakeError::Upgrade(e))),
    }
}
