//! The relay hub: registry, ingestion queue, fan-out loop, and handlers.
//!
//! [`RelayHub`] is the single owned object that replaces process-wide
//! globals.  It is built once at startup with [`RelayHub::new`], which also
//! returns the [`RelayLoop`] that drains its queue:
//!
//! ```rust
//! use relay_core::{HubConfig, RelayHub};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (hub, relay_loop) = RelayHub::new(HubConfig::default());
//! let worker = tokio::spawn(relay_loop.run());
//! // ... hand `Arc::clone(&hub)` to every connection handler ...
//! # drop(hub);
//! # worker.await.unwrap();
//! # }
//! ```
//!
//! # Ingestion queue
//!
//! Publisher handlers push [`Envelope`]s into a bounded multi-producer,
//! single-consumer `tokio::sync::mpsc` channel.  When the relay loop falls
//! behind and the queue is full, `ingest` waits for space, which in turn
//! stops the publisher's read loop from pulling more frames off the socket.
//! Memory use is therefore capped at `queue_capacity` pending payloads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::{ConnectionId, RelayMessage, UnknownRolePolicy};
use crate::error::RelayError;

pub mod handler;
pub mod registry;
pub mod relay_loop;

pub use handler::{handle_connection, SessionEnd, SessionSummary};
pub use registry::{Client, Registry};
pub use relay_loop::{fan_out, FanOutReport, RelayLoop};

/// Default number of payloads that may wait for the relay loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Runtime settings for the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// What to do with a missing or unrecognised role parameter.
    pub on_unknown_role: UnknownRolePolicy,
    /// Capacity of the ingestion queue (must be at least 1).
    pub queue_capacity: usize,
    /// Forward payloads sent by subscribers to all publishers.
    pub forward_subscriber_messages: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            on_unknown_role: UnknownRolePolicy::Reject,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            forward_subscriber_messages: false,
        }
    }
}

/// Which registry set an envelope is fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Subscribers,
    Publishers,
}

/// A payload waiting in the ingestion queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Connection the payload was read from.
    pub origin: ConnectionId,
    pub audience: Audience,
    pub message: RelayMessage,
}

/// Shared hub state handed to every connection handler.
pub struct RelayHub {
    registry: Arc<Registry>,
    ingest_tx: mpsc::Sender<Envelope>,
    config: HubConfig,
}

impl RelayHub {
    /// Builds the hub and the relay loop that serves it.
    ///
    /// The loop must be spawned by the caller; until it runs, ingestion
    /// blocks once the queue is full.  A `queue_capacity` of 0 is treated
    /// as 1.
    pub fn new(config: HubConfig) -> (Arc<Self>, RelayLoop) {
        let (ingest_tx, ingest_rx) = mpsc::channel(config.queue_capacity.max(1));
        let registry = Arc::new(Registry::new());
        let relay_loop = RelayLoop::new(Arc::clone(&registry), ingest_rx);
        let hub = Arc::new(Self {
            registry,
            ingest_tx,
            config,
        });
        (hub, relay_loop)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Hands a payload to the relay loop, waiting for queue space if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::QueueClosed`] if the relay loop has stopped.
    pub async fn ingest(&self, envelope: Envelope) -> Result<(), RelayError> {
        trace!(
            "ingest {} bytes from {} for {:?}",
            envelope.message.len(),
            envelope.origin,
            envelope.audience
        );
        self.ingest_tx
            .send(envelope)
            .await
            .map_err(|_| RelayError::QueueClosed)
    }
}
