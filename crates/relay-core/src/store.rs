//! Durable storage seam for Relay.
//!
//! The router and delivery coordinator only need the four operations of
//! [`MessageStore`]; which engine answers them is a deployment choice.
//! [`MemoryStore`] is the in-process reference backend used by the
//! server default and the test suites.

use async_trait::async_trait;
use relay_protocol::{Message, MessageId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// No message with the given identifier.
    #[error("message not found: {0}")]
    NotFound(MessageId),
}

/// Durable message storage.
///
/// Implementations must be safe for concurrent use by all connection
/// tasks. Persisted records are [`Message`] values with a
/// store-assigned `id` and their `delivered` flag.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and assign it an identifier.
    async fn insert(&self, message: &Message) -> Result<MessageId, StoreError>;

    /// Flip a persisted message's `delivered` flag to `true`.
    async fn mark_delivered(&self, id: MessageId) -> Result<(), StoreError>;

    /// Find all undelivered messages addressed to a recipient, in any
    /// order.
    async fn undelivered_for(&self, recipient: &str) -> Result<Vec<Message>, StoreError>;

    /// Find the most recent messages for a room, newest first, capped
    /// at `limit`.
    async fn history_for_room(&self, room: &str, limit: usize) -> Result<Vec<Message>, StoreError>;
}

/// In-memory message store.
///
/// Append-only vec behind a lock; ids are sequential. The lock is never
/// held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    messages: RwLock<Vec<Message>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_poisoned() -> StoreError {
        StoreError::Backend("store lock poisoned".to_string())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &Message) -> Result<MessageId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut messages = self.messages.write().map_err(|_| Self::lock_poisoned())?;
        messages.push(message.clone().with_id(id));
        Ok(id)
    }

    async fn mark_delivered(&self, id: MessageId) -> Result<(), StoreError> {
        let mut messages = self.messages.write().map_err(|_| Self::lock_poisoned())?;
        let record = messages
            .iter_mut()
            .find(|m| m.id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        record.delivered = true;
        Ok(())
    }

    async fn undelivered_for(&self, recipient: &str) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().map_err(|_| Self::lock_poisoned())?;
        Ok(messages
            .iter()
            .filter(|m| !m.delivered && m.recipient.as_deref() == Some(recipient))
            .cloned()
            .collect())
    }

    async fn history_for_room(&self, room: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.read().map_err(|_| Self::lock_poisoned())?;
        // Insertion order is timestamp order; walk it backwards for
        // newest-first.
        Ok(messages
            .iter()
            .rev()
            .filter(|m| m.room.as_deref() == Some(room))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_ids() {
        let store = MemoryStore::new();
        let a = store
            .insert(&Message::private("one", "alice", "bob"))
            .await
            .unwrap();
        let b = store
            .insert(&Message::private("two", "alice", "bob"))
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_undelivered_and_mark_delivered() {
        let store = MemoryStore::new();
        let id = store
            .insert(&Message::private("hey", "alice", "bob"))
            .await
            .unwrap();
        store
            .insert(&Message::private("other", "alice", "carol"))
            .await
            .unwrap();

        let pending = store.undelivered_for("bob").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, Some(id));
        assert!(!pending[0].delivered);

        store.mark_delivered(id).await.unwrap();
        assert!(store.undelivered_for("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_delivered_unknown_id() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.mark_delivered(99).await,
            Err(StoreError::NotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_history_newest_first_capped() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store
                .insert(&Message::broadcast(format!("msg-{i}"), "alice", "lobby"))
                .await
                .unwrap();
        }
        store
            .insert(&Message::broadcast("elsewhere", "bob", "den"))
            .await
            .unwrap();

        let history = store.history_for_room("lobby", 20).await.unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "msg-24");
        assert_eq!(history[19].content, "msg-5");
        assert!(history.iter().all(|m| m.room.as_deref() == Some("lobby")));
    }

    #[tokio::test]
    async fn test_history_empty_room() {
        let store = MemoryStore::new();
        assert!(store.history_for_room("lobby", 20).await.unwrap().is_empty());
    }
}
