//! Relay server configuration.
//!
//! [`ServerConfig`] is the resolved, validated set of runtime settings that
//! the accept loop works from.  It is produced in three layers, each one
//! overriding the previous:
//!
//! 1. built-in defaults ([`FileConfig::default`]);
//! 2. an optional TOML file ([`FileConfig::load`]);
//! 3. command-line flags and `RELAY_*` environment variables (applied in
//!    `main.rs`).
//!
//! The file schema:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! path = "/ws"
//! write_timeout_secs = 10
//!
//! [relay]
//! on_unknown_role = "reject"          # or "default_subscriber"
//! queue_capacity = 1024
//! forward_subscriber_messages = false
//! ```
//!
//! Every field is optional; missing fields take the default shown above.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::hub::DEFAULT_QUEUE_CAPACITY;
use relay_core::{HubConfig, UnknownRolePolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` is not an IP address.
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    /// `queue_capacity` was set to zero.
    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,

    /// `write_timeout_secs` was set to zero, which would fail every write.
    #[error("write_timeout_secs must be at least 1")]
    ZeroWriteTimeout,
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// All runtime configuration for the relay server.
///
/// ```rust
/// use relay_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert_eq!(cfg.path, "/ws");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_addr: SocketAddr,
    /// The only request path that is upgraded; everything else gets a 404.
    pub path: String,
    /// Upper bound on a single WebSocket write (including the close frame).
    pub write_timeout: Duration,
    /// Settings passed through to the hub.
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    /// | Field          | Default        |
    /// |----------------|----------------|
    /// | bind_addr      | `0.0.0.0:8080` |
    /// | path           | `/ws`          |
    /// | write_timeout  | 10 seconds     |
    /// | hub            | `HubConfig::default()` |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::from([0, 0, 0, 0]), default_port()),
            path: default_path(),
            write_timeout: Duration::from_secs(default_write_timeout_secs()),
            hub: HubConfig::default(),
        }
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

/// On-disk configuration, as written in the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub relay: RelaySection,
}

/// `[server]` table: where and how to listen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request path that is upgraded to a WebSocket.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

/// `[relay]` table: hub behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    #[serde(default)]
    pub on_unknown_role: UnknownRolePolicy,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Relay payloads sent by subscribers to every publisher.
    #[serde(default)]
    pub forward_subscriber_messages: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_path() -> String {
    "/ws".to_string()
}
fn default_write_timeout_secs() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            path: default_path(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            on_unknown_role: UnknownRolePolicy::default(),
            queue_capacity: default_queue_capacity(),
            forward_subscriber_messages: false,
        }
    }
}

impl FileConfig {
    /// Reads and parses the TOML file at `path`.
    ///
    /// Unlike a missing optional setting, a missing file is an error here:
    /// the caller asked for this file explicitly.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or wrongly-typed values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the file values and turns them into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidBindAddress`] if `bind_address` is not an IP
    /// address, [`ConfigError::ZeroQueueCapacity`] if `queue_capacity` is 0,
    /// [`ConfigError::ZeroWriteTimeout`] if `write_timeout_secs` is 0.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind_address.clone()))?;
        if self.relay.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.server.write_timeout_secs == 0 {
            return Err(ConfigError::ZeroWriteTimeout);
        }

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.server.port),
            path: self.server.path,
            write_timeout: Duration::from_secs(self.server.write_timeout_secs),
            hub: HubConfig {
                on_unknown_role: self.relay.on_unknown_role,
                queue_capacity: self.relay.queue_capacity,
                forward_subscriber_messages: self.relay.forward_subscriber_messages,
            },
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
