//! Undelivered-drain: offline message delivery on reconnect.
//!
//! When a user connects, a one-shot background task flushes every
//! message persisted for them with `delivered = false`, marking each
//! delivered as it is sent. The drain never blocks the connection's
//! router loop.

use crate::connection::ClientHandle;
use crate::store::MessageStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Spawns and runs reconnect-time drains against the store.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    store: Arc<dyn MessageStore>,
}

impl DeliveryCoordinator {
    /// Create a coordinator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Spawn the one-shot drain for a freshly registered connection.
    ///
    /// The returned handle is scoped to the connection: the server
    /// aborts it at teardown so the task cannot outlive the socket.
    pub fn spawn_drain(&self, handle: ClientHandle) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            drain_undelivered(store.as_ref(), &handle).await;
        })
    }
}

/// Flush every undelivered message for the handle's user.
///
/// A failure on any single message is logged and the batch continues.
/// Messages whose send fails (connection closed mid-drain) keep
/// `delivered = false` and surface again on the next reconnect:
/// delivery is at-least-once, not exactly-once.
pub async fn drain_undelivered(store: &dyn MessageStore, handle: &ClientHandle) {
    let pending = match store.undelivered_for(handle.user()).await {
        Ok(pending) => pending,
        Err(e) => {
            error!(user = %handle.user(), error = %e, "Failed to fetch undelivered messages");
            return;
        }
    };

    if pending.is_empty() {
        return;
    }
    debug!(user = %handle.user(), count = pending.len(), "Draining undelivered messages");

    for message in pending {
        let Some(id) = message.id else {
            warn!(user = %handle.user(), "Undelivered message without id, skipping");
            continue;
        };

        if handle.send_event(message).is_err() {
            // Connection already gone; the rest stays undelivered for
            // the next reconnect.
            debug!(user = %handle.user(), "Connection closed mid-drain");
            continue;
        }

        if let Err(e) = store.mark_delivered(id).await {
            error!(user = %handle.user(), message_id = id, error = %e, "Failed to mark message delivered");
        }
    }
}
