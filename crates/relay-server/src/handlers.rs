//! Connection handlers for the Relay server.
//!
//! This module handles the connection lifecycle and message processing:
//! upgrade, registration, the reconnect drain, the read loop, and the
//! exactly-once teardown.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use relay_core::{
    ClientHandle, ClientRegistry, DeliveryCoordinator, MemoryStore, MessageRouter, MessageStore,
    Outbound, RoomRegistry,
};
use relay_protocol::codec;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// user identity -> live connection.
    pub clients: Arc<ClientRegistry>,
    /// room name -> current members.
    pub rooms: Arc<RoomRegistry>,
    /// Durable message storage.
    pub store: Arc<dyn MessageStore>,
    /// The event dispatcher.
    pub router: MessageRouter,
    /// Reconnect-time offline drain.
    pub delivery: DeliveryCoordinator,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create app state backed by the in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create app state over a specific store backend.
    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn MessageStore>) -> Self {
        let clients = Arc::new(ClientRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let router = MessageRouter::new(
            Arc::clone(&clients),
            Arc::clone(&rooms),
            Arc::clone(&store),
        );
        let delivery = DeliveryCoordinator::new(Arc::clone(&store));

        Self {
            clients,
            rooms,
            store,
            router,
            delivery,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    // Build router
    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route(&config.transport.history_path, get(history_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    // Bind and serve
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;

    info!("Relay server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Connection parameters for the WebSocket endpoint.
#[derive(Debug, Deserialize)]
struct ConnectParams {
    username: Option<String>,
    /// Absent means the empty-named room bucket.
    #[serde(default)]
    room: String,
}

/// WebSocket upgrade handler.
///
/// `username` is mandatory; the upgrade is rejected with a client error
/// before any socket work when it is missing.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(username) = params.username.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Username is required").into_response();
    };

    ws.on_upgrade(move |socket| handle_websocket(socket, state, username, params.room))
}

/// Handle one WebSocket connection from registration to teardown.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, username: String, room: String) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (handle, mut outbound_rx) = ClientHandle::new(&username, &room);
    debug!(user = %username, room = %room, connection = %handle.id(), "WebSocket connected");

    // Split the WebSocket; the writer task owns the sink and pumps the
    // connection's outbound queue so peers never write the socket
    // directly.
    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let ws_message = match frame {
                Outbound::Event(message) => match codec::encode(&message) {
                    Ok(text) => WsMessage::Text(text),
                    Err(e) => {
                        warn!(error = %e, "Failed to encode outbound event");
                        metrics::record_error("encode");
                        continue;
                    }
                },
                Outbound::Notice(text) => WsMessage::Text(text),
                Outbound::Close => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            };

            if let WsMessage::Text(text) = &ws_message {
                metrics::record_message(text.len(), "outbound");
            }
            if sink.send(ws_message).await.is_err() {
                break;
            }
        }
    });

    // Register in both registries; a second connection under the same
    // username replaces the first, whose socket is closed.
    if let Some(replaced) = state.clients.register(handle.clone()) {
        replaced.close();
    }
    state.rooms.join(&room, handle.clone());
    metrics::set_active_rooms(state.rooms.room_count());

    // Flush messages missed while offline, off the read loop.
    let drain = state.delivery.spawn_drain(handle.clone());

    // Read loop: one event at a time until the peer goes away.
    while let Some(received) = stream.next().await {
        match received {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&text, &handle, &state).await;
            }
            Ok(WsMessage::Binary(data)) => {
                // Tolerate clients that send the JSON frame as binary.
                match String::from_utf8(data) {
                    Ok(text) => handle_frame(&text, &handle, &state).await,
                    Err(_) => {
                        warn!(user = %username, "Discarding non-UTF-8 binary frame");
                        metrics::record_error("decode");
                    }
                }
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                // axum answers pings itself.
            }
            Ok(WsMessage::Close(_)) => {
                debug!(user = %username, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(user = %username, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    // Teardown: single exit point, so this runs exactly once no matter
    // which failure path ended the loop.
    drain.abort();
    writer.abort();
    state.clients.deregister(&username, handle.id());
    state.rooms.leave(&room, &username, handle.id());
    metrics::set_active_rooms(state.rooms.room_count());

    debug!(user = %username, connection = %handle.id(), "WebSocket disconnected");
}

/// Decode one inbound text frame and hand it to the router.
///
/// Malformed or oversized frames are logged and skipped; the
/// connection stays open.
async fn handle_frame(text: &str, handle: &ClientHandle, state: &Arc<AppState>) {
    if text.len() > state.config.limits.max_message_size {
        warn!(user = %handle.user(), size = text.len(), "Discarding oversized frame");
        metrics::record_error("oversize");
        return;
    }
    metrics::record_message(text.len(), "inbound");

    match codec::decode(text) {
        Ok(event) => state.router.dispatch(handle, event).await,
        Err(e) => {
            warn!(user = %handle.user(), error = %e, "Discarding malformed frame");
            metrics::record_error("decode");
        }
    }
}

/// Query parameters for the history endpoint.
#[derive(Debug, Deserialize)]
struct HistoryParams {
    username: Option<String>,
    #[serde(default)]
    room: String,
}

/// Room-history handler: the most recent persisted messages for a
/// room, newest first. Allows cross-origin access.
async fn history_handler(
    Query(params): Query<HistoryParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let cors = [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")];

    if params.username.as_deref().unwrap_or("").is_empty() {
        return (StatusCode::BAD_REQUEST, cors, "Username is required").into_response();
    }

    match state
        .store
        .history_for_room(&params.room, state.config.limits.history_limit)
        .await
    {
        Ok(messages) => (cors, Json(messages)).into_response(),
        Err(e) => {
            error!(room = %params.room, error = %e, "History query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, cors, "Database error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::Message;

    #[tokio::test]
    async fn test_history_through_state() {
        let state = AppState::new(Config::default());
        for i in 0..25 {
            state
                .store
                .insert(&Message::broadcast(format!("msg-{i}"), "alice", "lobby"))
                .await
                .unwrap();
        }

        let history = state
            .store
            .history_for_room("lobby", state.config.limits.history_limit)
            .await
            .unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].content, "msg-24");
    }

    #[tokio::test]
    async fn test_dispatch_through_state() {
        let state = AppState::new(Config::default());
        let (alice, mut alice_rx) = ClientHandle::new("alice", "lobby");
        state.clients.register(alice.clone());
        state.rooms.join("lobby", alice.clone());

        let event = codec::decode(r#"{"type":"message","content":"hi","sender":"alice"}"#).unwrap();
        state.router.dispatch(&alice, event).await;

        match alice_rx.try_recv().unwrap() {
            Outbound::Event(echo) => {
                assert_eq!(echo.content, "hi");
                assert_eq!(echo.room.as_deref(), Some("lobby"));
            }
            other => panic!("expected echo, got {other:?}"),
        }
    }
}
