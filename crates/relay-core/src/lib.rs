//! # relay-core
//!
//! Connection/room registries and the message-routing engine for Relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **ClientHandle** - The outbound half of one live connection
//! - **ClientRegistry** - user identity -> live connection
//! - **RoomRegistry** - room name -> current members
//! - **MessageStore** - Durable storage seam for offline delivery
//! - **DeliveryCoordinator** - Reconnect-time undelivered-message drain
//! - **MessageRouter** - Per-event classification and fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│   Router    │────▶│  Registries │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │  Delivery   │────▶│    Store    │
//! └─────────────┘     └─────────────┘
//! ```

pub mod connection;
pub mod delivery;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod store;

pub use connection::{ClientHandle, ConnectionClosed, ConnectionId, Outbound};
pub use delivery::DeliveryCoordinator;
pub use registry::ClientRegistry;
pub use rooms::RoomRegistry;
pub use router::{MessageRouter, RouterError};
pub use store::{MemoryStore, MessageStore, StoreError};
