//! # relay-protocol
//!
//! Wire types and codec for the Relay realtime chat engine.
//!
//! Relay clients and servers exchange discrete JSON text frames, each a
//! single [`Message`] object. The `type` field carries the [`EventKind`]
//! tag that drives routing:
//!
//! - `typing` - transient typing indicator, echoed to the sender only
//! - `private` - direct message to one recipient, persisted for offline
//!   delivery
//! - `message` - broadcast to every member of the sender's room
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{codec, EventKind, Message};
//!
//! let msg = Message::broadcast("hello", "alice", "lobby");
//! let text = codec::encode(&msg).unwrap();
//!
//! let decoded = codec::decode(&text).unwrap();
//! assert_eq!(decoded.kind, EventKind::Broadcast);
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, ProtocolError};
pub use message::{EventKind, Message, MessageId};
