//! Message types for the Relay wire protocol.
//!
//! One [`Message`] struct serves as the wire shape, the routing unit,
//! and the persisted record; which fields are populated depends on the
//! event kind.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Store-assigned message identifier.
pub type MessageId = u64;

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// The closed classification of an inbound event.
///
/// Serialized as the wire literals `typing`, `private`, and `message`
/// (the wire name for a room broadcast). Any other tag deserializes to
/// [`EventKind::Unknown`], which the router logs and discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Typing indicator, echoed to the sender only. Never persisted.
    Typing,
    /// Direct message to one recipient, persisted for offline delivery.
    Private,
    /// Room broadcast, labelled `message` at the wire.
    Broadcast,
    /// Unrecognized tag.
    Unknown,
}

impl EventKind {
    /// Get the wire literal for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Typing => "typing",
            EventKind::Private => "private",
            EventKind::Broadcast => "message",
            EventKind::Unknown => "unknown",
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "typing" => EventKind::Typing,
            "private" => EventKind::Private,
            "message" => EventKind::Broadcast,
            _ => EventKind::Unknown,
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> String {
        kind.as_str().to_owned()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of communication.
///
/// Invariant: a `private` message has `recipient` set and `room` unset;
/// a `broadcast` message has `room` set and `recipient` unset; a
/// `typing` event has neither persistence nor delivery semantics. The
/// constructors below uphold this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier; absent before persistence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Event kind (`type` at the wire).
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Text payload.
    #[serde(default)]
    pub content: String,

    /// Sender identity, as asserted by the client.
    #[serde(default)]
    pub sender: String,

    /// Recipient identity; set only for `private`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Room identity; set only for `broadcast`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    /// Creation instant in epoch milliseconds, assigned by the router
    /// at receipt time. Not monotonic across senders.
    #[serde(default)]
    pub timestamp: u64,

    /// Whether the message has reached its recipient. Starts `false`
    /// for persisted kinds; meaningless for `typing`.
    #[serde(default)]
    pub delivered: bool,
}

impl Message {
    /// Create a typing indicator event.
    #[must_use]
    pub fn typing(
        content: impl Into<String>,
        sender: impl Into<String>,
        recipient: Option<String>,
    ) -> Self {
        Self {
            id: None,
            kind: EventKind::Typing,
            content: content.into(),
            sender: sender.into(),
            recipient,
            room: None,
            timestamp: now_millis(),
            delivered: false,
        }
    }

    /// Create a direct message to one recipient.
    #[must_use]
    pub fn private(
        content: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind: EventKind::Private,
            content: content.into(),
            sender: sender.into(),
            recipient: Some(recipient.into()),
            room: None,
            timestamp: now_millis(),
            delivered: false,
        }
    }

    /// Create a room broadcast.
    #[must_use]
    pub fn broadcast(
        content: impl Into<String>,
        sender: impl Into<String>,
        room: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            kind: EventKind::Broadcast,
            content: content.into(),
            sender: sender.into(),
            recipient: None,
            room: Some(room.into()),
            timestamp: now_millis(),
            delivered: false,
        }
    }

    /// Attach a store-assigned identifier.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Check whether this message is persisted by the router
    /// (typing indicators and unrecognized events are not).
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.kind, EventKind::Private | EventKind::Broadcast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_literals() {
        assert_eq!(EventKind::Typing.as_str(), "typing");
        assert_eq!(EventKind::Private.as_str(), "private");
        assert_eq!(EventKind::Broadcast.as_str(), "message");

        assert_eq!(EventKind::from("message".to_string()), EventKind::Broadcast);
        assert_eq!(EventKind::from("nonsense".to_string()), EventKind::Unknown);
    }

    #[test]
    fn test_private_shape() {
        let msg = Message::private("hey", "alice", "bob");
        assert_eq!(msg.kind, EventKind::Private);
        assert_eq!(msg.recipient.as_deref(), Some("bob"));
        assert!(msg.room.is_none());
        assert!(msg.id.is_none());
        assert!(!msg.delivered);
    }

    #[test]
    fn test_broadcast_shape() {
        let msg = Message::broadcast("hi", "alice", "lobby");
        assert_eq!(msg.kind, EventKind::Broadcast);
        assert_eq!(msg.room.as_deref(), Some("lobby"));
        assert!(msg.recipient.is_none());
        assert!(msg.is_persistent());
    }

    #[test]
    fn test_typing_not_persistent() {
        let msg = Message::typing("...", "alice", Some("bob".to_string()));
        assert!(!msg.is_persistent());
        assert!(msg.timestamp > 0);
    }
}
