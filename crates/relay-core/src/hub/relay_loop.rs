//! The relay loop: drains the ingestion queue and fans each payload out.
//!
//! # One pass
//!
//! ```text
//! envelope ──► registry.snapshot(audience) ──► send to every client (concurrently)
//!                                                   │
//!                                     failed ───────┴──► close + deregister
//! ```
//!
//! All sends of one pass run concurrently, and the pass finishes before the
//! next envelope is taken.  Each subscriber therefore sees payloads in queue
//! order, while one slow subscriber only delays the pass by its own write
//! (bounded by the transport's write deadline) instead of serialising behind
//! every other subscriber.
//!
//! A failed send is treated as a disconnect: the connection is removed from
//! the registry right away instead of waiting for its own handler to notice,
//! and all connections that failed in a pass are then closed concurrently.
//! The handler's teardown may run at the same moment; both `close` and
//! `deregister` are idempotent, so the race is harmless.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::registry::Registry;
use super::Envelope;

/// Outcome of delivering one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    /// Clients the payload was written to.
    pub delivered: usize,
    /// Clients whose write failed; they have been closed and deregistered.
    pub failed: usize,
}

/// Delivers `envelope` to every client registered for its audience right now.
pub async fn fan_out(registry: &Registry, envelope: &Envelope) -> FanOutReport {
    let targets = registry.snapshot(envelope.audience);
    if targets.is_empty() {
        return FanOutReport::default();
    }

    let message = &envelope.message;
    let results = join_all(targets.iter().map(|client| async move {
        let result = client.connection.send(message).await;
        (client, result)
    }))
    .await;

    let mut report = FanOutReport::default();
    let mut dropped = Vec::new();
    for (client, result) in results {
        match result {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                let id = client.id();
                warn!("delivery to {} {id} failed: {e}; dropping it", client.role);
                registry.deregister(id);
                dropped.push(client);
            }
        }
    }
    report.failed = dropped.len();

    // Closing may itself wait on a dead peer, so all closes share one deadline.
    join_all(dropped.iter().map(|client| client.connection.close())).await;
    report
}

/// The single long-lived fan-out worker.
///
/// Created together with its hub by [`super::RelayHub::new`].
pub struct RelayLoop {
    registry: Arc<Registry>,
    ingest_rx: mpsc::Receiver<Envelope>,
}

impl RelayLoop {
    pub(crate) fn new(registry: Arc<Registry>, ingest_rx: mpsc::Receiver<Envelope>) -> Self {
        Self {
            registry,
            ingest_rx,
        }
    }

    /// Runs until every sender of the ingestion queue is gone, i.e. the hub
    /// and all handlers holding it have been dropped.
    pub async fn run(mut self) {
        info!("relay loop started");
        while let Some(envelope) = self.ingest_rx.recv().await {
            let report = fan_out(&self.registry, &envelope).await;
            debug!(
                "relayed {} bytes from {} to {:?}: delivered={} failed={}",
                envelope.message.len(),
                envelope.origin,
                envelope.audience,
                report.delivered,
                report.failed
            );
        }
        info!("relay loop stopped: ingestion queue closed");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
