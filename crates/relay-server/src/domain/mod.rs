//! Domain layer for the relay server.

pub mod config;

pub use config::{ConfigError, FileConfig, RelaySection, ServerConfig, ServerSection};
