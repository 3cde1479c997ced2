//! Per-connection handler: role negotiation, registration, read loop, teardown.
//!
//! # State machine
//!
//! ```text
//! handshake done ──► resolve role ──(invalid)──► close ──► Err(InvalidRole)
//!                         │
//!                         ▼
//!                     register
//!                         │
//!                         ▼
//!                     read loop ◄──┐  publisher: ingest for subscribers
//!                         │    └───┘  subscriber: discard (or ingest for publishers)
//!                         ▼
//!            teardown: deregister, then close   (exactly once)
//! ```
//!
//! While a subscriber's handler sits in its read loop, the relay loop writes
//! to the same connection from another task; the handler only reads.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::domain::{ClientRole, ConnectionId, RelayMessage};
use crate::error::RelayError;

use super::{Audience, Envelope, RelayHub};

/// Why a session's read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection, or it was closed locally (e.g. by the
    /// relay loop after a failed write).
    PeerClosed,
    /// Reading from the connection failed.
    ReadError(String),
    /// The relay loop is gone, so nothing read could be delivered.
    RelayStopped,
}

/// What happened during one connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub connection_id: ConnectionId,
    pub role: ClientRole,
    /// Data messages read from the connection.
    pub messages_received: u64,
    /// Of those, how many were handed to the relay loop.
    pub messages_forwarded: u64,
    pub end: SessionEnd,
}

/// Owns `connection` from the end of its handshake until teardown.
///
/// `role_param` is the raw role value from the handshake (`None` if the
/// client sent none); it is resolved with the hub's
/// [`UnknownRolePolicy`](crate::UnknownRolePolicy).
///
/// Read failures never escape this function: they end the session and are
/// reported through [`SessionSummary::end`].
///
/// # Errors
///
/// Returns [`RelayError::InvalidRole`] if the role was rejected.  The
/// connection has already been closed and was never registered.
pub async fn handle_connection(
    hub: &RelayHub,
    connection: Arc<dyn Connection>,
    role_param: Option<&str>,
) -> Result<SessionSummary, RelayError> {
    let id = connection.id();

    let role = match ClientRole::resolve(role_param, hub.config().on_unknown_role) {
        Ok(role) => role,
        Err(e) => {
            warn!("connection {id}: {e}; closing");
            connection.close().await;
            return Err(e);
        }
    };

    hub.registry().register_all(&connection, role);
    info!(
        "connection {id} registered as {role} (requested {role_param:?}; publishers={}, subscribers={})",
        hub.registry().publisher_count(),
        hub.registry().subscriber_count()
    );

    let mut summary = SessionSummary {
        connection_id: id,
        role,
        messages_received: 0,
        messages_forwarded: 0,
        end: SessionEnd::PeerClosed,
    };
    let end = read_loop(hub, connection.as_ref(), role, &mut summary).await;
    summary.end = end;

    // Teardown: deregister first so no new fan-out pass picks this client up,
    // then release the transport.
    hub.registry().deregister(id);
    connection.close().await;

    info!(
        "connection {id} ({role}) closed: {:?}, received={}, forwarded={}",
        summary.end, summary.messages_received, summary.messages_forwarded
    );
    Ok(summary)
}

async fn read_loop(
    hub: &RelayHub,
    connection: &dyn Connection,
    role: ClientRole,
    summary: &mut SessionSummary,
) -> SessionEnd {
    let id = connection.id();
    loop {
        let message = match connection.receive().await {
            Ok(Some(message)) => message,
            Ok(None) => return SessionEnd::PeerClosed,
            Err(e) => {
                warn!("connection {id}: read failed: {e}");
                return SessionEnd::ReadError(e.to_string());
            }
        };
        summary.messages_received += 1;

        let Some(audience) = audience_for(hub, role) else {
            debug!(
                "connection {id}: discarding {} byte message from subscriber",
                message.len()
            );
            continue;
        };

        if forward(hub, id, audience, message).await.is_err() {
            warn!("connection {id}: relay loop stopped; ending session");
            return SessionEnd::RelayStopped;
        }
        summary.messages_forwarded += 1;
    }
}

/// Where a message read from a client with `role` should go, if anywhere.
fn audience_for(hub: &RelayHub, role: ClientRole) -> Option<Audience> {
    if role.publishes() {
        Some(Audience::Subscribers)
    } else if hub.config().forward_subscriber_messages {
        Some(Audience::Publishers)
    } else {
        None
    }
}

async fn forward(
    hub: &RelayHub,
    origin: ConnectionId,
    audience: Audience,
    message: RelayMessage,
) -> Result<(), RelayError> {
    hub.ingest(Envelope {
        origin,
        audience,
        message,
    })
    .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
