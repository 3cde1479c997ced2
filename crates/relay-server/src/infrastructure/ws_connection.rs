//! The relay-core `Connection` port implemented over a WebSocket.
//!
//! The stream is split into its read and write halves, each behind its own
//! `tokio::sync::Mutex`.  The connection handler is the only reader and the
//! relay loop is the only writer, so the two never contend for the same lock
//! and a subscriber can be written to while its handler waits for input.
//!
//! # Frame mapping
//!
//! | WebSocket frame           | Result of `receive`                       |
//! |---------------------------|-------------------------------------------|
//! | Text / Binary             | `Ok(Some(RelayMessage))`, kind preserved  |
//! | Ping / Pong / raw frame   | skipped (tungstenite answers pings)       |
//! | Close, end of stream      | `Ok(None)`                                |
//! | anything else             | `Err(ConnectionError::Transport)`         |
//!
//! # Closing
//!
//! `close` may be called by the handler's teardown and by the relay loop
//! after a failed write, possibly at the same time.  A [`CloseSignal`] makes
//! the first call win: it wakes a pending `receive`, makes later `send`s
//! fail fast, and is the only call that sends a Close frame.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use relay_core::connection::CloseSignal;
use relay_core::{Connection, ConnectionError, ConnectionId, MessageKind, RelayMessage};

/// A WebSocket session adapted to [`Connection`].
pub struct WsConnection<S> {
    id: ConnectionId,
    peer_addr: SocketAddr,
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    closed: CloseSignal,
    write_timeout: Duration,
}

impl<S> WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already-upgraded WebSocket.
    ///
    /// Every write, including the final Close frame, is abandoned after
    /// `write_timeout`.
    pub fn new(ws: WebSocketStream<S>, peer_addr: SocketAddr, write_timeout: Duration) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: ConnectionId::new(),
            peer_addr,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closed: CloseSignal::new(),
            write_timeout,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[async_trait]
impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn receive(&self) -> Result<Option<RelayMessage>, ConnectionError> {
        let closed = self.closed.closed();
        tokio::pin!(closed);
        let mut stream = self.stream.lock().await;

        loop {
            let frame = tokio::select! {
                _ = &mut closed => return Ok(None),
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(RelayMessage::text(text))),
                Some(Ok(WsMessage::Binary(data))) => return Ok(Some(RelayMessage::binary(data))),
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("{} ({}) sent close: {frame:?}", self.id, self.peer_addr);
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    trace!("{}: skipping control frame {other:?}", self.id);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Ok(None);
                }
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }

    async fn send(&self, message: &RelayMessage) -> Result<(), ConnectionError> {
        if self.closed.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let frame = to_ws_message(message)?;

        let mut sink = self.sink.lock().await;
        match timeout(self.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Transport(e.to_string())),
            Err(_) => Err(ConnectionError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&self) {
        if !self.closed.trigger() {
            return;
        }

        let mut sink = self.sink.lock().await;
        match timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => debug!("{} ({}) closed", self.id, self.peer_addr),
            // The peer is usually already gone when we get here.
            Ok(Err(e)) => debug!("{} ({}): close frame not sent: {e}", self.id, self.peer_addr),
            Err(_) => debug!("{} ({}): close timed out", self.id, self.peer_addr),
        }
    }
}

fn to_ws_message(message: &RelayMessage) -> Result<WsMessage, ConnectionError> {
    match message.kind {
        MessageKind::Binary => Ok(WsMessage::Binary(message.payload.clone())),
        MessageKind::Text => String::from_utf8(message.payload.clone())
            .map(WsMessage::Text)
            .map_err(|_| ConnectionError::Transport("text payload is not valid UTF-8".to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
