//! Relay server core: shared state, WebSocket handler, and HTTP routes.
//!
//! Each client opens a WebSocket at `/party/{system_id}`. The connection is
//! assigned a fresh [`ConnectionId`], admitted to the room for that solar
//! system, and from then on its text frames are forwarded to the room task
//! while a writer task drains the room's replies back into the socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use galaxy_proto::codec;
use galaxy_proto::message::ServerMessage;
use galaxy_proto::presence::ConnectionId;
use tokio::sync::mpsc;

use crate::rooms::{RoomRegistry, RoomSummary};

/// Shared relay server state.
pub struct RelayState {
    /// Directory of running rooms.
    pub rooms: RoomRegistry,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with default room and frame size limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RoomRegistry::new(),
        }
    }

    /// Creates a relay state with custom limits.
    #[must_use]
    pub fn with_config(max_rooms: usize, max_message_size: usize) -> Self {
        Self {
            rooms: RoomRegistry::with_limits(max_rooms, max_message_size),
        }
    }
}

/// Body of `GET /api/rooms`.
#[derive(Debug, serde::Serialize)]
pub struct RoomList {
    /// Every running room.
    pub rooms: Vec<RoomSummary>,
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Assign a connection id and join the room (the room sends `sync`).
/// 2. Spawn a writer task draining the outbound queue into the socket.
/// 3. Forward inbound text frames to the room until the socket closes.
/// 4. Leave the room exactly once, whichever side ended first.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, system_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let connection_id = ConnectionId::new();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let room = match state.rooms.connect(&system_id, connection_id, tx) {
        Ok(room) => room,
        Err(e) => {
            tracing::warn!(
                system_id = %system_id,
                connection_id = %connection_id,
                error = %e,
                "rejecting connection"
            );
            let reply = ServerMessage::Error {
                reason: e.to_string(),
            };
            if let Ok(text) = codec::encode_server(&reply) {
                let _ = ws_sender.send(Message::Text(text.into())).await;
            }
            let _ = ws_sender.send(Message::Close(None)).await;
            return;
        }
    };

    tracing::info!(
        system_id = %system_id,
        connection_id = %connection_id,
        "connection opened"
    );

    let writer_id = connection_id;
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(connection_id = %writer_id, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_room = room.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = reader_room.send_text(text) {
                        tracing::warn!(
                            connection_id = %reader_room.connection_id(),
                            error = %e,
                            "room unavailable"
                        );
                        break;
                    }
                }
                Message::Close(_) => {
                    tracing::debug!(
                        connection_id = %reader_room.connection_id(),
                        "received close frame"
                    );
                    break;
                }
                _ => {
                    // The protocol is text-only; ping/pong is handled by axum.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    room.leave();
    tracing::info!(
        system_id = %system_id,
        connection_id = %connection_id,
        "connection closed"
    );
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// Use [`RelayState::with_config`] to apply limits from the resolved
/// [`crate::config::RelayConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Builds the HTTP router for the relay.
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/party/{system_id}", axum::routing::get(ws_handler))
        .route("/api/rooms", axum::routing::get(list_rooms))
        .with_state(state)
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(system_id): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, system_id))
}

async fn list_rooms(State(state): State<Arc<RelayState>>) -> axum::Json<RoomList> {
    axum::Json(RoomList {
        rooms: state.rooms.list().await,
    })
}
