//! Connection identity.

use std::fmt;

use uuid::Uuid;

/// Identity of one live connection.
///
/// Every transport connection gets a fresh random id when it is created, so
/// two distinct connections never compare equal even if they come from the
/// same peer address.  Registry entries are keyed by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Log lines only need enough of the UUID to tell sessions apart.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}
