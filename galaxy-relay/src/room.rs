//! Presence state for a single room (one solar-system instance).
//!
//! A [`Room`] tracks every open connection in the room and the subset of
//! them that has identified as a player. It is plain owned state with no
//! interior locking: the room task in [`crate::rooms`] is its only owner and
//! feeds it one event at a time.
//!
//! A connection becomes a participant on its first `identify`, not on
//! connect. Until then it still receives broadcasts but is absent from
//! `sync` rosters, and its `move` frames are ignored.

use std::collections::HashMap;

use axum::extract::ws::Message;
use galaxy_proto::codec::{self, CodecError};
use galaxy_proto::message::{ClientMessage, ServerMessage};
use galaxy_proto::presence::{ConnectionId, Participant, Position};
use tokio::sync::mpsc;

/// Sending half of a connection's outbound frame queue.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// Errors produced while handling a single inbound event.
///
/// None of them are fatal: the room logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The frame could not be decoded into a client message.
    #[error("malformed message from {connection_id}: {source}")]
    MalformedMessage {
        /// Sender of the rejected frame.
        connection_id: ConnectionId,
        /// Decoder failure.
        #[source]
        source: CodecError,
    },
    /// The connection acted before identifying.
    #[error("{connection_id} sent `{action}` before identifying")]
    UnknownParticipant {
        /// Offending connection.
        connection_id: ConnectionId,
        /// Wire name of the rejected action.
        action: &'static str,
    },
    /// A frame could not be queued for a connection whose writer is gone.
    #[error("delivery to {connection_id} failed")]
    DeliveryFailure {
        /// Intended recipient.
        connection_id: ConnectionId,
    },
}

/// Presence state of one room.
pub struct Room {
    system_id: String,
    connections: HashMap<ConnectionId, Outbox>,
    participants: HashMap<ConnectionId, Participant>,
    max_message_size: usize,
}

impl Room {
    /// Creates an empty room.
    #[must_use]
    pub fn new(system_id: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            system_id: system_id.into(),
            connections: HashMap::new(),
            participants: HashMap::new(),
            max_message_size,
        }
    }

    /// Solar-system id this room serves.
    #[must_use]
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    /// Number of open connections, identified or not.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of identified participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// `true` when no connection is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Looks up the participant bound to a connection.
    #[must_use]
    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    /// Iterates over all identified participants in arbitrary order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Admits a new connection and sends it the current roster.
    ///
    /// Nothing is broadcast here; others learn about the newcomer once it
    /// identifies.
    pub fn connect(&mut self, id: ConnectionId, outbox: Outbox) {
        let players: Vec<Participant> = self
            .participants
            .values()
            .filter(|p| p.id != id)
            .cloned()
            .collect();
        let count = players.len();

        if self.connections.insert(id, outbox).is_some() {
            tracing::warn!(
                system_id = %self.system_id,
                connection_id = %id,
                "connection id reused, replacing outbox"
            );
        }

        if let Err(e) = self.send_to(id, &ServerMessage::Sync { players }) {
            tracing::warn!(system_id = %self.system_id, error = %e, "failed to send sync");
        }

        tracing::info!(
            system_id = %self.system_id,
            connection_id = %id,
            players = count,
            "connection joined room"
        );
    }

    /// Applies one inbound text frame from `id`.
    ///
    /// Malformed frames are answered with an `error` frame to the sender
    /// only; nothing is broadcast and no state changes.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::MalformedMessage`] for undecodable frames and
    /// [`RoomError::UnknownParticipant`] for a `move` before `identify`.
    pub fn handle_text(&mut self, id: ConnectionId, text: &str) -> Result<(), RoomError> {
        if !self.connections.contains_key(&id) {
            tracing::debug!(
                system_id = %self.system_id,
                connection_id = %id,
                "dropping frame from closed connection"
            );
            return Ok(());
        }

        let msg = match codec::decode_client(text, self.max_message_size) {
            Ok(msg) => msg,
            Err(source) => {
                let reply = ServerMessage::Error {
                    reason: source.to_string(),
                };
                if let Err(e) = self.send_to(id, &reply) {
                    tracing::debug!(
                        system_id = %self.system_id,
                        error = %e,
                        "failed to send error reply"
                    );
                }
                return Err(RoomError::MalformedMessage {
                    connection_id: id,
                    source,
                });
            }
        };

        match msg {
            ClientMessage::Identify { username } => {
                self.identify(id, username);
                Ok(())
            }
            ClientMessage::Move { position } => self.move_to(id, position),
            ClientMessage::Unknown => {
                tracing::debug!(
                    system_id = %self.system_id,
                    connection_id = %id,
                    "ignoring unknown message type"
                );
                Ok(())
            }
        }
    }

    /// Closes a connection: drops its participant record and tells everyone
    /// left in the room.
    ///
    /// Returns `false` (and does nothing) if the connection was already
    /// closed, so repeated close signals produce a single `leave`.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_none() {
            return false;
        }
        let was_player = self.participants.remove(&id).is_some();

        let delivered = self.broadcast(&ServerMessage::Leave { id }, None);
        tracing::info!(
            system_id = %self.system_id,
            connection_id = %id,
            was_player,
            delivered,
            "connection left room"
        );
        true
    }

    fn identify(&mut self, id: ConnectionId, username: String) {
        let player = match self.participants.get_mut(&id) {
            Some(existing) if existing.username == username => {
                tracing::debug!(
                    system_id = %self.system_id,
                    connection_id = %id,
                    "repeated identify with same username"
                );
                return;
            }
            Some(existing) => {
                existing.username = username;
                existing.clone()
            }
            None => {
                let player = Participant::new(id, username);
                self.participants.insert(id, player.clone());
                player
            }
        };

        let delivered = self.broadcast(&ServerMessage::join(&player), Some(id));
        tracing::info!(
            system_id = %self.system_id,
            connection_id = %id,
            username = %player.username,
            delivered,
            "player identified"
        );
    }

    fn move_to(&mut self, id: ConnectionId, position: Position) -> Result<(), RoomError> {
        let Some(player) = self.participants.get_mut(&id) else {
            return Err(RoomError::UnknownParticipant {
                connection_id: id,
                action: "move",
            });
        };
        player.position = Some(position);

        let delivered = self.broadcast(&ServerMessage::Move { id, position }, Some(id));
        tracing::trace!(
            system_id = %self.system_id,
            connection_id = %id,
            delivered,
            "position relayed"
        );
        Ok(())
    }

    /// Best-effort fan-out to every open connection except `exclude`.
    ///
    /// Returns how many connections the frame was queued for. A dead
    /// recipient is logged and skipped.
    fn broadcast(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let Some(frame) = self.encode(msg) else {
            return 0;
        };

        let mut delivered = 0;
        for (&connection_id, outbox) in &self.connections {
            if Some(connection_id) == exclude {
                continue;
            }
            if outbox.send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                let e = RoomError::DeliveryFailure { connection_id };
                tracing::warn!(
                    system_id = %self.system_id,
                    kind = msg.kind(),
                    error = %e,
                    "broadcast delivery failed"
                );
            }
        }
        delivered
    }

    fn send_to(&self, id: ConnectionId, msg: &ServerMessage) -> Result<(), RoomError> {
        let failure = || RoomError::DeliveryFailure { connection_id: id };
        let outbox = self.connections.get(&id).ok_or_else(failure)?;
        let frame = self.encode(msg).ok_or_else(failure)?;
        outbox.send(frame).map_err(|_| failure())
    }

    fn encode(&self, msg: &ServerMessage) -> Option<Message> {
        match codec::encode_server(msg) {
            Ok(text) => Some(Message::Text(text.into())),
            Err(e) => {
                tracing::error!(
                    system_id = %self.system_id,
                    kind = msg.kind(),
                    error = %e,
                    "failed to encode server message"
                );
                None
            }
        }
    }
}
