//! Registry of connected publishers and subscribers.
//!
//! Both sets live behind ONE mutex so that registration, deregistration and
//! the relay loop's snapshot are linearizable with respect to each other.
//!
//! # Lock discipline
//!
//! The lock is a plain `std::sync::Mutex`, held only for the map operation
//! itself and never across an `.await`.  Callers that need to do I/O against
//! registered connections take a snapshot (a cloned `Vec<Client>`) and work
//! on that copy, so one slow connection can never stall registration for
//! everyone else.
//!
//! # Both-role clients
//!
//! A connection that registered as [`ClientRole::Both`] has one entry in each
//! map under the same [`ConnectionId`].  [`Registry::deregister`] removes it
//! from both in a single critical section.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::Connection;
use crate::domain::{ClientRole, ConnectionId, Role};

use super::Audience;

/// A connection bound to one registry role.
#[derive(Clone)]
pub struct Client {
    pub connection: Arc<dyn Connection>,
    pub role: Role,
}

impl Client {
    pub fn new(connection: Arc<dyn Connection>, role: Role) -> Self {
        Self { connection, role }
    }

    pub fn id(&self) -> ConnectionId {
        self.connection.id()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id())
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Default)]
struct Sets {
    publishers: HashMap<ConnectionId, Client>,
    subscribers: HashMap<ConnectionId, Client>,
}

impl Sets {
    fn for_role(&mut self, role: Role) -> &mut HashMap<ConnectionId, Client> {
        match role {
            Role::Publisher => &mut self.publishers,
            Role::Subscriber => &mut self.subscribers,
        }
    }

    fn insert(&mut self, client: Client) -> bool {
        let set = self.for_role(client.role);
        let id = client.id();
        if set.contains_key(&id) {
            return false;
        }
        set.insert(id, client);
        true
    }
}

/// Concurrency-safe store of the currently connected clients.
#[derive(Default)]
pub struct Registry {
    sets: Mutex<Sets>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `client` into the set for its role.
    ///
    /// Returns `false` (and changes nothing) if the same connection is
    /// already registered under that role.
    pub fn register(&self, client: Client) -> bool {
        self.lock().insert(client)
    }

    /// Registers `connection` under every role `client_role` expands to,
    /// atomically.  Returns how many new entries were added.
    pub fn register_all(&self, connection: &Arc<dyn Connection>, client_role: ClientRole) -> usize {
        let mut sets = self.lock();
        client_role
            .roles()
            .iter()
            .filter(|role| sets.insert(Client::new(Arc::clone(connection), **role)))
            .count()
    }

    /// Removes the connection from whichever set(s) contain it.
    ///
    /// Idempotent: returns `false` if nothing was registered under `id`.
    pub fn deregister(&self, id: ConnectionId) -> bool {
        let mut sets = self.lock();
        let was_publisher = sets.publishers.remove(&id).is_some();
        let was_subscriber = sets.subscribers.remove(&id).is_some();
        was_publisher || was_subscriber
    }

    /// Point-in-time copy of the subscriber set.
    pub fn snapshot_subscribers(&self) -> Vec<Client> {
        self.lock().subscribers.values().cloned().collect()
    }

    /// Point-in-time copy of the publisher set.
    pub fn snapshot_publishers(&self) -> Vec<Client> {
        self.lock().publishers.values().cloned().collect()
    }

    /// Snapshot of the set an envelope for `audience` is delivered to.
    pub fn snapshot(&self, audience: Audience) -> Vec<Client> {
        match audience {
            Audience::Subscribers => self.snapshot_subscribers(),
            Audience::Publishers => self.snapshot_publishers(),
        }
    }

    pub fn contains(&self, id: ConnectionId, role: Role) -> bool {
        self.lock().for_role(role).contains_key(&id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn publisher_count(&self) -> usize {
        self.lock().publishers.len()
    }

    // Every critical section leaves both maps consistent, so a panic in
    // another holder does not invalidate the data.
    fn lock(&self) -> MutexGuard<'_, Sets> {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnection;

    fn conn() -> Arc<dyn Connection> {
        MockConnection::new()
    }

    #[test]
    fn test_register_inserts_into_matching_set() {
        // Arrange
        let registry = Registry::new();
        let publisher = conn();
        let subscriber = conn();

        // Act
        registry.register(Client::new(Arc::clone(&publisher), Role::Publisher));
        registry.register(Client::new(Arc::clone(&subscriber), Role::Subscriber));

        // Assert
        assert!(registry.contains(publisher.id(), Role::Publisher));
        assert!(!registry.contains(publisher.id(), Role::Subscriber));
        assert!(registry.contains(subscriber.id(), Role::Subscriber));
        assert_eq!(registry.publisher_count(), 1);
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = Registry::new();
        let c = conn();

        assert!(registry.register(Client::new(Arc::clone(&c), Role::Subscriber)));
        assert!(!registry.register(Client::new(Arc::clone(&c), Role::Subscriber)));

        assert_eq!(registry.subscriber_count(), 1);
        assert_eq!(registry.snapshot_subscribers().len(), 1);
    }

    #[test]
    fn test_deregister_removes_and_is_idempotent() {
        let registry = Registry::new();
        let c = conn();
        registry.register(Client::new(Arc::clone(&c), Role::Subscriber));

        assert!(registry.deregister(c.id()));
        assert!(!registry.deregister(c.id()));

        assert!(!registry.contains(c.id(), Role::Subscriber));
        assert!(registry.snapshot_subscribers().is_empty());
    }

    #[test]
    fn test_deregister_unknown_id_is_noop() {
        let registry = Registry::new();
        registry.register(Client::new(conn(), Role::Publisher));

        assert!(!registry.deregister(ConnectionId::new()));
        assert_eq!(registry.publisher_count(), 1);
    }

    #[test]
    fn test_both_role_registers_two_entries_removed_together() {
        // Arrange
        let registry = Registry::new();
        let c = conn();

        // Act
        let added = registry.register_all(&c, ClientRole::Both);

        // Assert
        assert_eq!(added, 2);
        assert!(registry.contains(c.id(), Role::Publisher));
        assert!(registry.contains(c.id(), Role::Subscriber));

        assert!(registry.deregister(c.id()));
        assert_eq!(registry.publisher_count(), 0);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = Registry::new();
        let c = conn();
        registry.register(Client::new(Arc::clone(&c), Role::Subscriber));

        let snapshot = registry.snapshot_subscribers();
        registry.deregister(c.id());

        // The snapshot taken before deregistration is unaffected.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), c.id());
        assert!(registry.snapshot_subscribers().is_empty());
    }

    #[test]
    fn test_snapshot_by_audience() {
        let registry = Registry::new();
        let p = conn();
        let s = conn();
        registry.register(Client::new(Arc::clone(&p), Role::Publisher));
        registry.register(Client::new(Arc::clone(&s), Role::Subscriber));

        let subs = registry.snapshot(Audience::Subscribers);
        let pubs = registry.snapshot(Audience::Publishers);

        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id(), s.id());
        assert_eq!(pubs.len(), 1);
        assert_eq!(pubs[0].id(), p.id());
    }

    #[test]
    fn test_concurrent_double_deregister_is_safe() {
        // Arrange: many clients, each deregistered from two threads at once.
        let registry = Arc::new(Registry::new());
        let conns: Vec<_> = (0..64).map(|_| conn()).collect();
        for c in &conns {
            registry.register_all(c, ClientRole::Both);
        }

        // Act
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ids: Vec<_> = conns.iter().map(|c| c.id()).collect();
                std::thread::spawn(move || {
                    ids.into_iter()
                        .filter(|id| registry.deregister(*id))
                        .count()
                })
            })
            .collect();
        let removed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Assert: each id was removed by exactly one of the two threads.
        assert_eq!(removed, conns.len());
        assert_eq!(registry.publisher_count(), 0);
        assert_eq!(registry.subscriber_count(), 0);
    }
}
