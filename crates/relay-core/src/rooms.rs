//! Room registry for Relay.
//!
//! Rooms are named broadcast groups. Membership is transient, tied to
//! active connections: created lazily on first join, pruned when the
//! last member leaves.

use crate::connection::{ClientHandle, ConnectionId};
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::debug;

/// Thread-safe room -> members map.
///
/// The empty string is an ordinary room name (connections that give no
/// room land in the empty-named bucket).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, HashMap<String, ClientHandle>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// A member joining under a username already present replaces the
    /// previous membership, matching [`ClientRegistry::register`]
    /// semantics.
    ///
    /// [`ClientRegistry::register`]: crate::registry::ClientRegistry::register
    pub fn join(&self, room: &str, handle: ClientHandle) {
        let user = handle.user().to_string();
        let mut members = self.rooms.entry(room.to_string()).or_default();
        members.insert(user.clone(), handle);
        debug!(room = %room, user = %user, members = members.len(), "Joined room");
    }

    /// Remove a connection from a room.
    ///
    /// Removes the membership only if it still belongs to the given
    /// connection (see [`ClientRegistry::deregister`]). Idempotent for
    /// absent rooms and absent members. The room entry is pruned when it
    /// empties.
    ///
    /// Returns `true` if a membership was removed.
    ///
    /// [`ClientRegistry::deregister`]: crate::registry::ClientRegistry::deregister
    pub fn leave(&self, room: &str, user: &str, id: ConnectionId) -> bool {
        let mut removed = false;
        if let Some(mut members) = self.rooms.get_mut(room) {
            if members.get(user).is_some_and(|h| h.id() == id) {
                members.remove(user);
                removed = true;
                debug!(room = %room, user = %user, members = members.len(), "Left room");
            }

            if members.is_empty() {
                drop(members); // Release the lock
                if self
                    .rooms
                    .remove_if(room, |_, members| members.is_empty())
                    .is_some()
                {
                    debug!(room = %room, "Pruned empty room");
                }
            }
        }
        removed
    }

    /// Snapshot the current members of a room.
    ///
    /// Membership is read at call time, not cached: a user joining
    /// mid-broadcast may or may not appear in a given snapshot.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<ClientHandle> {
        self.rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of members currently in a room.
    #[must_use]
    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
