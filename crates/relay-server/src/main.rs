//! Message relay server: entry point.
//!
//! Accepts WebSocket connections on a single path and relays every text or
//! binary message a publisher sends to all currently connected subscribers.
//! Clients choose their role in the query string:
//!
//! ```text
//! ws://host:8080/ws?mode=broadcast   publisher
//! ws://host:8080/ws?mode=listen      subscriber
//! ws://host:8080/ws?mode=both        both
//! ```
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>                 TOML configuration file
//!   --bind <IP>                     Bind address [default: 0.0.0.0]
//!   --port <PORT>                   Listener port [default: 8080]
//!   --path <PATH>                   WebSocket endpoint path [default: /ws]
//!   --on-unknown-role <POLICY>      reject | default_subscriber [default: reject]
//!   --queue-capacity <N>            Ingestion queue size [default: 1024]
//!   --forward-subscriber-messages   Relay subscriber messages to publishers
//!   --write-timeout <SECS>          Per-write deadline [default: 10]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                     | Flag                            |
//! |------------------------------|---------------------------------|
//! | `RELAY_CONFIG`               | `--config`                      |
//! | `RELAY_BIND`                 | `--bind`                        |
//! | `RELAY_PORT`                 | `--port`                        |
//! | `RELAY_PATH`                 | `--path`                        |
//! | `RELAY_UNKNOWN_ROLE`         | `--on-unknown-role`             |
//! | `RELAY_QUEUE_CAPACITY`       | `--queue-capacity`              |
//! | `RELAY_FORWARD_SUBSCRIBERS`  | `--forward-subscriber-messages` |
//! | `RELAY_WRITE_TIMEOUT`        | `--write-timeout`               |
//!
//! A flag (or its variable) beats the config file, which beats the built-in
//! default.  Log verbosity follows `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::UnknownRolePolicy;
use relay_server::domain::{FileConfig, ServerConfig};
use relay_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket pub/sub message relay.
///
/// Every option is optional: unset options fall back to the config file and
/// then to the built-in defaults, which is why none of them carries a clap
/// `default_value`.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Real-time WebSocket message relay (publishers to subscribers)",
    version
)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind to (`0.0.0.0` for all interfaces).
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Request path that is upgraded to a WebSocket.
    #[arg(long, env = "RELAY_PATH")]
    path: Option<String>,

    /// What to do with a missing or unrecognised role parameter.
    #[arg(long, env = "RELAY_UNKNOWN_ROLE")]
    on_unknown_role: Option<UnknownRolePolicy>,

    /// How many payloads may wait for the relay loop before publishers are
    /// slowed down.
    #[arg(long, env = "RELAY_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Relay messages sent by subscribers to every publisher.
    #[arg(long, env = "RELAY_FORWARD_SUBSCRIBERS")]
    forward_subscriber_messages: bool,

    /// Seconds a single WebSocket write may take before the subscriber is
    /// dropped.
    #[arg(long, env = "RELAY_WRITE_TIMEOUT")]
    write_timeout: Option<u64>,
}

impl Cli {
    /// Resolves the final [`ServerConfig`]: defaults, then the config file,
    /// then the flags that were actually given.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the merged values are invalid (bad bind address, zero queue capacity
    /// or write timeout).
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        self.apply_overrides(&mut file);
        file.into_server_config().context("invalid configuration")
    }

    fn apply_overrides(self, file: &mut FileConfig) {
        if let Some(bind) = self.bind {
            file.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.server.port = port;
        }
        if let Some(path) = self.path {
            file.server.path = path;
        }
        if let Some(secs) = self.write_timeout {
            file.server.write_timeout_secs = secs;
        }
        if let Some(policy) = self.on_unknown_role {
            file.relay.on_unknown_role = policy;
        }
        if let Some(capacity) = self.queue_capacity {
            file.relay.queue_capacity = capacity;
        }
        // A switch can only turn forwarding on; the file may also enable it.
        if self.forward_subscriber_messages {
            file.relay.forward_subscriber_messages = true;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "relay server starting: bind={}, path={}, write timeout={:?}",
        config.bind_addr, config.path, config.write_timeout
    );

    // Cleared by Ctrl+C; the accept loop polls it every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("relay server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
