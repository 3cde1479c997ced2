//! The `Connection` port: how the hub talks to a transport.
//!
//! The hub never touches sockets.  A transport (the WebSocket adapter in
//! `relay-server`, or [`mock::MockConnection`] in tests) implements this trait
//! and hands an `Arc<dyn Connection>` to [`crate::handle_connection`].
//!
//! # Concurrency contract
//!
//! Implementations must allow `receive` (called only by the owning handler)
//! and `send` (called by the relay loop) to run at the same time from
//! different tasks.  `close` may be called from either side, any number of
//! times:
//!
//! - every call after the first is a no-op;
//! - a pending `receive` wakes up and returns `Ok(None)`;
//! - any later `send` fails fast with [`ConnectionError::Closed`].
//!
//! These rules are what make the handler's teardown and the relay loop's
//! failed-send cleanup safe to race on the same connection.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::domain::{ConnectionId, RelayMessage};

pub mod mock;

/// I/O failure on a single connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection was already closed locally.
    #[error("connection is closed")]
    Closed,

    /// A write did not complete within the transport's deadline.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport failure (reset, protocol violation, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// A duplex channel of discrete text/binary messages.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Identity of this connection; stable for its whole lifetime.
    fn id(&self) -> ConnectionId;

    /// Waits for the next data message.
    ///
    /// Returns `Ok(None)` when the peer closed cleanly or the connection was
    /// closed locally, and `Err` on a transport failure.  Either way the
    /// connection is finished.
    async fn receive(&self) -> Result<Option<RelayMessage>, ConnectionError>;

    /// Writes one message, preserving its kind.
    async fn send(&self, message: &RelayMessage) -> Result<(), ConnectionError>;

    /// Releases the connection.  Idempotent.
    async fn close(&self);
}

/// Idempotent "closed" flag that async readers can wait on.
///
/// Transports embed one of these so that `close` can wake a `receive` that
/// is parked on the network, and so that a second `close` is a no-op.
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Marks the connection closed.  Returns `true` only for the call that
    /// actually flipped the flag.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set (immediately if it already is).
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        }
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
