//! # relay-core
//!
//! The connection hub of the message relay: an in-memory pub/sub fan-out
//! engine that forwards text and binary payloads from publishers to every
//! currently connected subscriber.
//!
//! This crate knows nothing about sockets or WebSockets.  Every transport is
//! reached through the [`Connection`] trait, which `relay-server` implements
//! on top of `tokio-tungstenite` and which [`connection::mock`] implements in
//! memory for tests.
//!
//! # Architecture overview
//!
//! ```text
//!   publisher ──► handle_connection ──► ingest queue ──► RelayLoop
//!                       │                                   │
//!                       ▼                                   ▼
//!                   Registry  ◄──── snapshot_subscribers ───┘
//!                       ▲                                   │
//!   subscriber ◄── Connection::send ◄───────────────────────┘
//! ```
//!
//! - **`domain`** – Pure value types: messages, roles, connection ids.
//! - **`connection`** – The `Connection` port plus an in-memory double.
//! - **`hub`** – The [`Registry`], the [`RelayHub`] that owns it together
//!   with the ingestion queue, the [`RelayLoop`] fan-out worker, and the
//!   per-connection [`handle_connection`] state machine.

pub mod connection;
pub mod domain;
pub mod error;
pub mod hub;

pub use connection::{Connection, ConnectionError};
pub use domain::{ClientRole, ConnectionId, MessageKind, RelayMessage, Role, UnknownRolePolicy};
pub use error::RelayError;
pub use hub::{
    fan_out, handle_connection, Audience, Client, Envelope, FanOutReport, HubConfig, Registry,
    RelayHub, RelayLoop, SessionEnd, SessionSummary,
};
