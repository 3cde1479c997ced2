//! Client roles and role negotiation.
//!
//! A client declares its role once, during the handshake, through a query
//! parameter.  The accepted spellings come from two generations of clients:
//!
//! | Parameter value            | Role                     |
//! |----------------------------|--------------------------|
//! | `broadcast`, `publisher`   | [`ClientRole::Publisher`] |
//! | `listen`, `subscriber`     | [`ClientRole::Subscriber`] |
//! | `both`                     | [`ClientRole::Both`]      |
//!
//! Anything else (or no parameter at all) is resolved by the configured
//! [`UnknownRolePolicy`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// The role of a single registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends payloads into the relay.
    Publisher,
    /// Receives fanned-out payloads.
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// The role a connection asked for.
///
/// `Both` registers the same connection twice, once per [`Role`]; the two
/// entries are independent in the registry but are removed together when the
/// connection is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientRole {
    Publisher,
    Subscriber,
    Both,
}

impl ClientRole {
    /// The registry roles this client role expands to.
    pub fn roles(self) -> &'static [Role] {
        match self {
            ClientRole::Publisher => &[Role::Publisher],
            ClientRole::Subscriber => &[Role::Subscriber],
            ClientRole::Both => &[Role::Publisher, Role::Subscriber],
        }
    }

    /// Whether payloads read from this client are published to subscribers.
    pub fn publishes(self) -> bool {
        matches!(self, ClientRole::Publisher | ClientRole::Both)
    }

    /// Resolves a raw role parameter according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRole`] when the value is missing or
    /// unrecognised and the policy is [`UnknownRolePolicy::Reject`].
    pub fn resolve(param: Option<&str>, policy: UnknownRolePolicy) -> Result<Self, RelayError> {
        let parsed = match param {
            Some(value) => value.parse::<ClientRole>(),
            None => Err(RelayError::InvalidRole(String::new())),
        };

        match (parsed, policy) {
            (Ok(role), _) => Ok(role),
            (Err(_), UnknownRolePolicy::DefaultSubscriber) => Ok(ClientRole::Subscriber),
            (Err(e), UnknownRolePolicy::Reject) => Err(e),
        }
    }
}

impl FromStr for ClientRole {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" | "publisher" => Ok(ClientRole::Publisher),
            "listen" | "subscriber" => Ok(ClientRole::Subscriber),
            "both" => Ok(ClientRole::Both),
            other => Err(RelayError::InvalidRole(other.to_string())),
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientRole::Publisher => f.write_str("publisher"),
            ClientRole::Subscriber => f.write_str("subscriber"),
            ClientRole::Both => f.write_str("both"),
        }
    }
}

/// What to do with a connection whose role parameter is missing or unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRolePolicy {
    /// Close the connection right after the handshake without registering it.
    #[default]
    Reject,
    /// Register the connection as a subscriber.
    DefaultSubscriber,
}

impl FromStr for UnknownRolePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(UnknownRolePolicy::Reject),
            "default_subscriber" | "default-subscriber" => Ok(UnknownRolePolicy::DefaultSubscriber),
            other => Err(format!(
                "unknown role policy '{other}' (expected 'reject' or 'default_subscriber')"
            )),
        }
    }
}

impl fmt::Display for UnknownRolePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownRolePolicy::Reject => f.write_str("reject"),
            UnknownRolePolicy::DefaultSubscriber => f.write_str("default_subscriber"),
        }
    }
}
