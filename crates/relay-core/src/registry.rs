//! Connection registry for Relay.
//!
//! Maps each user identity to its live connection. Shared by every
//! connection task; all access goes through the operations here.

use crate::connection::{ClientHandle, ConnectionId};
use dashmap::DashMap;
use tracing::{debug, warn};

/// Thread-safe user -> connection map.
///
/// A user identity maps to at most one connection at a time: a second
/// connection under the same identity replaces the first (the caller is
/// expected to close the returned handle).
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, ClientHandle>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its user identity.
    ///
    /// Returns the handle this one replaced, if any.
    pub fn register(&self, handle: ClientHandle) -> Option<ClientHandle> {
        let user = handle.user().to_string();
        let replaced = self.clients.insert(user.clone(), handle);
        if replaced.is_some() {
            warn!(user = %user, "Replacing existing connection for user");
        } else {
            debug!(user = %user, "Connection registered");
        }
        replaced
    }

    /// Deregister a connection.
    ///
    /// Removes the entry only if it still belongs to the given
    /// connection; a handle replaced by a newer connection leaves the
    /// newer entry untouched. Idempotent: absent identities are a no-op,
    /// so double cleanup on error paths is safe.
    ///
    /// Returns `true` if an entry was removed.
    pub fn deregister(&self, user: &str, id: ConnectionId) -> bool {
        let removed = self
            .clients
            .remove_if(user, |_, handle| handle.id() == id)
            .is_some();
        if removed {
            debug!(user = %user, "Connection deregistered");
        }
        removed
    }

    /// Look up the live connection for a user identity.
    #[must_use]
    pub fn get(&self, user: &str) -> Option<ClientHandle> {
        self.clients.get(user).map(|entry| entry.value().clone())
    }

    /// Check whether a user is currently connected.
    #[must_use]
    pub fn contains(&self, user: &str) -> bool {
        self.clients.contains_key(user)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup_deregister() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = ClientHandle::new("alice", "lobby");
        let id = handle.id();

        assert!(registry.register(handle).is_none());
        assert!(registry.contains("alice"));
        assert_eq!(registry.get("alice").unwrap().user(), "alice");

        assert!(registry.deregister("alice", id));
        assert!(registry.get("alice").is_none());
    }

    #[test]
    fn test_deregister_absent_is_noop() {
        let registry = ClientRegistry::new();
        let (handle, _rx) = ClientHandle::new("alice", "lobby");

        assert!(!registry.deregister("alice", handle.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_connection_replaces_first() {
        let registry = ClientRegistry::new();
        let (first, _rx1) = ClientHandle::new("alice", "lobby");
        let (second, _rx2) = ClientHandle::new("alice", "lobby");
        let first_id = first.id();
        let second_id = second.id();

        registry.register(first);
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.id(), first_id);

        // The replaced connection's teardown must not evict the new one.
        assert!(!registry.deregister("alice", first_id));
        assert_eq!(registry.get("alice").unwrap().id(), second_id);
    }
}
