//! Room registry for the relay server.
//!
//! Maps solar-system ids to running room tasks. Each room task owns one
//! [`Room`] and processes its events strictly one at a time, so room state
//! needs no locking; only this directory is shared between connections.
//!
//! Rooms are created on the first connection and retire themselves when the
//! last connection leaves. Nothing survives a relay restart.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use galaxy_proto::presence::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::room::{Outbox, Room, RoomError};

/// Default maximum number of concurrently open rooms.
pub const DEFAULT_MAX_ROOMS: usize = 1000;

/// Default maximum size of an inbound text frame in bytes (16 KB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Errors that can occur during room registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry already holds the maximum number of rooms.
    #[error("room registry is full (max {max} rooms)")]
    CapacityReached {
        /// Configured room limit.
        max: usize,
    },
    /// The room task is no longer running.
    #[error("room {system_id} is closed")]
    RoomClosed {
        /// Solar system of the dead room.
        system_id: String,
    },
}

/// Events a room task consumes, in arrival order.
#[derive(Debug)]
pub enum RoomEvent {
    /// A connection opened.
    Connect {
        /// Freshly assigned id.
        id: ConnectionId,
        /// Outbound frame queue of the connection.
        outbox: Outbox,
    },
    /// A connection sent a text frame.
    Text {
        /// Sender.
        id: ConnectionId,
        /// Raw frame contents.
        text: Utf8Bytes,
    },
    /// A connection closed.
    Close {
        /// The closed connection.
        id: ConnectionId,
    },
    /// Request a point-in-time summary of the room.
    Snapshot {
        /// Where to send the summary.
        reply: oneshot::Sender<RoomSummary>,
    },
}

/// Directory listing entry for one room.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoomSummary {
    /// Solar-system id of the room.
    pub system_id: String,
    /// Open connections, identified or not.
    pub connections: usize,
    /// Identified players.
    pub players: usize,
}

/// A connection's handle to the room it joined.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    system_id: Arc<str>,
    id: ConnectionId,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl RoomHandle {
    /// Solar-system id of the room.
    #[must_use]
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    /// Connection this handle speaks for.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Forwards an inbound text frame to the room.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomClosed`] if the room task has stopped.
    pub fn send_text(&self, text: Utf8Bytes) -> Result<(), RegistryError> {
        self.tx
            .send(RoomEvent::Text { id: self.id, text })
            .map_err(|_| self.closed())
    }

    /// Tells the room this connection is gone. Consumes the handle so a
    /// connection can only leave once.
    pub fn leave(self) {
        if self.tx.send(RoomEvent::Close { id: self.id }).is_err() {
            tracing::warn!(
                system_id = %self.system_id,
                connection_id = %self.id,
                error = %self.closed(),
                "could not deliver close"
            );
        }
    }

    fn closed(&self) -> RegistryError {
        RegistryError::RoomClosed {
            system_id: self.system_id.to_string(),
        }
    }
}

struct RoomEntry {
    generation: u64,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

#[derive(Default)]
struct Directory {
    rooms: HashMap<String, RoomEntry>,
    next_generation: u64,
}

/// Directory of running rooms keyed by solar-system id.
pub struct RoomRegistry {
    directory: Arc<Mutex<Directory>>,
    max_rooms: usize,
    max_message_size: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ROOMS, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates an empty registry with custom room and frame size limits.
    #[must_use]
    pub fn with_limits(max_rooms: usize, max_message_size: usize) -> Self {
        Self {
            directory: Arc::new(Mutex::new(Directory::default())),
            max_rooms,
            max_message_size,
        }
    }

    /// Maximum accepted inbound frame size in bytes.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Number of running rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.directory.lock().rooms.len()
    }

    /// Admits a connection to the room for `system_id`, starting the room if
    /// it is not running. The room answers with a `sync` frame on `outbox`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapacityReached`] if a new room would exceed
    /// the room limit.
    pub fn connect(
        &self,
        system_id: &str,
        id: ConnectionId,
        outbox: Outbox,
    ) -> Result<RoomHandle, RegistryError> {
        let mut directory = self.directory.lock();

        let mut event = RoomEvent::Connect { id, outbox };
        if let Some(entry) = directory.rooms.get(system_id) {
            match entry.tx.send(event) {
                Ok(()) => return Ok(handle(system_id, id, entry.tx.clone())),
                Err(mpsc::error::SendError(returned)) => event = returned,
            }
            tracing::warn!(system_id = %system_id, "replacing dead room");
            directory.rooms.remove(system_id);
        }

        if directory.rooms.len() >= self.max_rooms {
            return Err(RegistryError::CapacityReached {
                max: self.max_rooms,
            });
        }

        let generation = directory.next_generation;
        directory.next_generation += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event).map_err(|_| RegistryError::RoomClosed {
            system_id: system_id.to_string(),
        })?;
        directory.rooms.insert(
            system_id.to_string(),
            RoomEntry {
                generation,
                tx: tx.clone(),
            },
        );
        drop(directory);

        let room = Room::new(system_id, self.max_message_size);
        tokio::spawn(run_room(room, rx, Arc::clone(&self.directory), generation));
        tracing::info!(system_id = %system_id, "room opened");

        Ok(handle(system_id, id, tx))
    }

    /// Returns a summary of every running room.
    pub async fn list(&self) -> Vec<RoomSummary> {
        let senders: Vec<_> = self
            .directory
            .lock()
            .rooms
            .values()
            .map(|entry| entry.tx.clone())
            .collect();

        let mut summaries = Vec::with_capacity(senders.len());
        for tx in senders {
            let (reply, rx) = oneshot::channel();
            if tx.send(RoomEvent::Snapshot { reply }).is_err() {
                continue;
            }
            if let Ok(summary) = rx.await {
                summaries.push(summary);
            }
        }
        summaries
    }
}

fn handle(system_id: &str, id: ConnectionId, tx: mpsc::UnboundedSender<RoomEvent>) -> RoomHandle {
    RoomHandle {
        system_id: Arc::from(system_id),
        id,
        tx,
    }
}

/// Room task: applies events to `room` until the room empties out.
async fn run_room(
    mut room: Room,
    mut rx: mpsc::UnboundedReceiver<RoomEvent>,
    directory: Arc<Mutex<Directory>>,
    generation: u64,
) {
    while let Some(event) = rx.recv().await {
        match event {
            RoomEvent::Connect { id, outbox } => room.connect(id, outbox),
            RoomEvent::Text { id, text } => {
                if let Err(e) = room.handle_text(id, text.as_str()) {
                    log_room_error(room.system_id(), &e);
                }
            }
            RoomEvent::Close { id } => {
                room.disconnect(id);
            }
            RoomEvent::Snapshot { reply } => {
                let _ = reply.send(RoomSummary {
                    system_id: room.system_id().to_string(),
                    connections: room.connection_count(),
                    players: room.participant_count(),
                });
            }
        }
        // Any event may be the last one queued behind the final close.
        if room.is_empty() && retire(&directory, room.system_id(), generation, &rx) {
            break;
        }
    }
    tracing::info!(system_id = %room.system_id(), "room closed");
}

/// Removes an empty room from the directory unless events are still queued.
///
/// Checked under the directory lock, so no connect can slip in between the
/// emptiness check and the removal.
fn retire(
    directory: &Mutex<Directory>,
    system_id: &str,
    generation: u64,
    rx: &mpsc::UnboundedReceiver<RoomEvent>,
) -> bool {
    let mut directory = directory.lock();
    if !rx.is_empty() {
        return false;
    }
    if directory
        .rooms
        .get(system_id)
        .is_some_and(|entry| entry.generation == generation)
    {
        directory.rooms.remove(system_id);
    }
    true
}

fn log_room_error(system_id: &str, error: &RoomError) {
    match error {
        RoomError::MalformedMessage { .. } | RoomError::DeliveryFailure { .. } => {
            tracing::warn!(system_id = %system_id, error = %error, "dropped message");
        }
        RoomError::UnknownParticipant { .. } => {
            tracing::debug!(system_id = %system_id, error = %error, "ignored message");
        }
    }
}
