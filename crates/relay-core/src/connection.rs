//! Live connection handles.
//!
//! A [`ClientHandle`] is the outbound half of one WebSocket connection,
//! bound to one user identity and its joined room for the connection's
//! lifetime. The registries hold clones of the handle; the server pumps
//! the receiving half of its queue to the socket in a writer task.

use relay_protocol::Message;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

/// Unique identifier for a connection.
///
/// Distinguishes two connections opened under the same username, so a
/// replaced connection's teardown cannot evict its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Generate the next connection ID.
    #[must_use]
    pub fn next() -> Self {
        Self(CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The connection's outbound queue closed (peer disconnected).
#[derive(Debug, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// A frame queued for one connection.
#[derive(Debug)]
pub enum Outbound {
    /// A chat event, serialized to a JSON text frame at the socket.
    Event(Message),
    /// A plain-text server notice (e.g. offline acknowledgments).
    Notice(String),
    /// Instruct the writer task to close the socket.
    Close,
}

/// Handle to one live connection's outbound queue.
///
/// Cheap to clone; all clones feed the same queue. The queue is
/// unbounded: a slow peer buffers rather than stalling senders, and the
/// original design carries no drop policy under saturation.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    user: String,
    room: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ClientHandle {
    /// Create a handle and the receiving half of its outbound queue.
    #[must_use]
    pub fn new(
        user: impl Into<String>,
        room: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::next(),
                user: user.into(),
                room: room.into(),
                tx,
            },
            rx,
        )
    }

    /// Get the connection's unique identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the user identity bound to this connection.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Get the room joined at connect time (may be the empty-named room).
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Queue a chat event for delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionClosed`] if the peer has disconnected.
    pub fn send_event(&self, message: Message) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Outbound::Event(message))
            .map_err(|_| ConnectionClosed)
    }

    /// Queue a plain-text server notice.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionClosed`] if the peer has disconnected.
    pub fn notice(&self, text: impl Into<String>) -> Result<(), ConnectionClosed> {
        self.tx
            .send(Outbound::Notice(text.into()))
            .map_err(|_| ConnectionClosed)
    }

    /// Ask the writer task to close the socket. Ignores an already
    /// closed queue.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Check whether the peer has disconnected.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_connection_ids() {
        let (a, _rx_a) = ClientHandle::new("alice", "lobby");
        let (b, _rx_b) = ClientHandle::new("alice", "lobby");
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_send_event() {
        let (handle, mut rx) = ClientHandle::new("alice", "lobby");
        handle.send_event(Message::typing("...", "alice", None)).unwrap();

        match rx.recv().await.unwrap() {
            Outbound::Event(msg) => assert_eq!(msg.sender, "alice"),
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (handle, rx) = ClientHandle::new("alice", "lobby");
        drop(rx);
        assert!(handle.is_closed());
        assert!(handle.notice("hello").is_err());
    }
}
