//! In-memory connection for tests and benchmarks.
//!
//! [`MockConnection`] lets a test play the remote peer: push inbound
//! messages, hang up, make writes fail, and inspect everything the relay sent.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{CloseSignal, Connection, ConnectionError};
use crate::domain::{ConnectionId, RelayMessage};

type Inbound = Result<RelayMessage, ConnectionError>;

/// A scriptable [`Connection`] backed by channels.
pub struct MockConnection {
    id: ConnectionId,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    sent: Mutex<Vec<RelayMessage>>,
    sent_count: watch::Sender<usize>,
    fail_sends: AtomicBool,
    closed: CloseSignal,
    close_calls: AtomicUsize,
}

impl MockConnection {
    /// Creates a new open connection with a fresh id.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sent_count, _) = watch::channel(0);
        Arc::new(Self {
            id: ConnectionId::new(),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            sent_count,
            fail_sends: AtomicBool::new(false),
            closed: CloseSignal::new(),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Queues a message as if the peer had sent it.
    ///
    /// Silently ignored after [`hang_up`](Self::hang_up).
    pub fn push(&self, message: RelayMessage) {
        self.push_inbound(Ok(message));
    }

    /// Queues a read failure; the handler sees it after any earlier pushes.
    pub fn push_error(&self, error: ConnectionError) {
        self.push_inbound(Err(error));
    }

    /// Simulates the peer closing the connection cleanly.
    pub fn hang_up(&self) {
        self.inbound_tx.lock().expect("lock poisoned").take();
    }

    /// Makes every subsequent `send` fail (or succeed again with `false`).
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Everything successfully sent to this connection, in order.
    pub fn sent(&self) -> Vec<RelayMessage> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    /// Waits until at least `count` messages were sent, or `limit` elapses.
    ///
    /// Returns the messages sent so far either way.
    pub async fn wait_for_sent(&self, count: usize, limit: Duration) -> Vec<RelayMessage> {
        let mut rx = self.sent_count.subscribe();
        let _ = tokio::time::timeout(limit, rx.wait_for(|n| *n >= count)).await;
        self.sent()
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// How many times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Waits until the connection is closed, or `limit` elapses.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let _ = tokio::time::timeout(limit, self.closed.closed()).await;
        self.is_closed()
    }

    fn push_inbound(&self, item: Inbound) {
        if let Some(tx) = self.inbound_tx.lock().expect("lock poisoned").as_ref() {
            let _ = tx.send(item);
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn receive(&self) -> Result<Option<RelayMessage>, ConnectionError> {
        if self.is_closed() {
            return Ok(None);
        }

        let closed = self.closed.closed();
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            _ = closed => Ok(None),
            next = inbound.recv() => match next {
                Some(Ok(message)) => Ok(Some(message)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            },
        }
    }

    async fn send(&self, message: &RelayMessage) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ConnectionError::Transport("injected send failure".to_string()));
        }

        self.sent.lock().expect("lock poisoned").push(message.clone());
        self.sent_count.send_modify(|n| *n += 1);
        Ok(())
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.trigger();
    }
}
