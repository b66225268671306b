//! Message router for Relay.
//!
//! One router instance is shared by every connection task. Each inbound
//! event is classified by kind and dispatched to a fixed-function
//! handler; events are self-contained, so this is a flat dispatch, not
//! a multi-step state machine.

use crate::connection::{ClientHandle, ConnectionClosed};
use crate::registry::ClientRegistry;
use crate::rooms::RoomRegistry;
use crate::store::{MessageStore, StoreError};
use relay_protocol::{EventKind, Message};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Router errors. Logged at the dispatch boundary; never fatal to the
/// connection or the process.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The store failed the triggering operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The origin connection went away mid-dispatch.
    #[error(transparent)]
    Closed(#[from] ConnectionClosed),
}

/// The per-connection event dispatcher.
///
/// Resolves destinations through the two registries and coordinates
/// with the store for the kinds that persist. Cheap to clone.
#[derive(Clone)]
pub struct MessageRouter {
    clients: Arc<ClientRegistry>,
    rooms: Arc<RoomRegistry>,
    store: Arc<dyn MessageStore>,
}

impl MessageRouter {
    /// Create a router over shared registries and a store.
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        rooms: Arc<RoomRegistry>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            clients,
            rooms,
            store,
        }
    }

    /// Classify one inbound event and run its handler.
    ///
    /// Faults are logged here and swallowed: no error from a single
    /// client interaction may disrupt other connections. The only
    /// client-visible outcomes are the chat notices the handlers send.
    pub async fn dispatch(&self, origin: &ClientHandle, event: Message) {
        trace!(user = %origin.user(), kind = %event.kind, "Dispatching event");

        let result = match event.kind {
            EventKind::Typing => self.handle_typing(origin, event),
            EventKind::Private => self.handle_private(origin, event).await,
            EventKind::Broadcast => self.handle_broadcast(origin, event).await,
            EventKind::Unknown => {
                warn!(user = %origin.user(), "Unknown event kind, discarding");
                Ok(())
            }
        };

        if let Err(e) = result {
            error!(user = %origin.user(), error = %e, "Event handling failed");
        }
    }

    /// Echo a typing indicator back to its sender. Nothing is persisted
    /// and no other connection is touched.
    fn handle_typing(&self, origin: &ClientHandle, event: Message) -> Result<(), RouterError> {
        let echo = Message::typing(event.content, event.sender, event.recipient);
        origin.send_event(echo)?;
        Ok(())
    }

    /// Route a direct message.
    ///
    /// The message is persisted with `delivered = false` before any
    /// delivery attempt: a crash after persist still leaves it
    /// recoverable through the undelivered-drain. A store failure skips
    /// both the delivery attempt and the sender acknowledgment.
    async fn handle_private(
        &self,
        origin: &ClientHandle,
        event: Message,
    ) -> Result<(), RouterError> {
        let Some(recipient) = event.recipient.filter(|r| !r.is_empty()) else {
            warn!(user = %origin.user(), "Private event without recipient, discarding");
            return Ok(());
        };

        debug!(sender = %event.sender, recipient = %recipient, "Saving private message");
        let message = Message::private(event.content, event.sender, recipient.clone());
        let id = self.store.insert(&message).await?;
        let message = message.with_id(id);

        // Resolve the recipient at dispatch time. A send failure means
        // the peer raced us to disconnect; the message simply stays
        // undelivered, same as offline.
        let delivered = self
            .clients
            .get(&recipient)
            .is_some_and(|peer| peer.send_event(message.clone()).is_ok());

        if delivered {
            self.store.mark_delivered(id).await?;
            origin.notice(format!("Message delivered to {recipient}"))?;
        } else {
            origin.notice(format!("{recipient} is offline. msg saved!"))?;
        }
        Ok(())
    }

    /// Route a room broadcast: persist, echo to the sender, then fan
    /// out one copy to every other member of the room.
    async fn handle_broadcast(
        &self,
        origin: &ClientHandle,
        event: Message,
    ) -> Result<(), RouterError> {
        // Clients may omit the room; the connection's joined room is
        // the target then.
        let room = event
            .room
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| origin.room().to_string());

        debug!(sender = %event.sender, room = %room, "Saving broadcast message");
        let message = Message::broadcast(event.content, event.sender, room.clone());
        let id = self.store.insert(&message).await?;
        let message = message.with_id(id);

        // A failed echo means the sender raced us to disconnect; the
        // rest of the room still gets the message.
        if origin.send_event(message.clone()).is_err() {
            debug!(room = %room, user = %origin.user(), "Sender gone before echo");
        }

        // Membership is read at dispatch time; a member joining right
        // now may or may not get this particular message.
        for member in self.rooms.members_of(&room) {
            if member.id() == origin.id() {
                continue;
            }
            if member.send_event(message.clone()).is_err() {
                debug!(room = %room, user = %member.user(), "Member gone during fan-out");
            }
        }
        Ok(())
    }
}
