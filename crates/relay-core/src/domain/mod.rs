//! Domain layer for relay-core.
//!
//! Pure value types with no I/O and no async code: the messages that travel
//! through the relay, the roles a connection can take, and the identity used
//! to key registry entries.

pub mod connection_id;
pub mod message;
pub mod role;

pub use connection_id::ConnectionId;
pub use message::{MessageKind, RelayMessage};
pub use role::{ClientRole, Role, UnknownRolePolicy};
