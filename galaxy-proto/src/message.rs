//! Message types for the Galaxy Explorer presence protocol.
//!
//! Every frame is a JSON object whose `type` field selects the variant. The
//! relay only ever accepts [`ClientMessage`] and only ever emits
//! [`ServerMessage`].

use serde::{Deserialize, Serialize};

use crate::presence::{ConnectionId, Participant, Position};

/// Frames a game client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announce (or change) the player's name.
    Identify {
        /// Display name shown above the player's ship.
        username: String,
    },

    /// Report the player's current position. Replaces any earlier position.
    Move {
        /// Absolute world-space position.
        position: Position,
    },

    /// Any `type` this relay does not understand. Ignored, so newer clients
    /// can talk to older relays.
    #[serde(other)]
    Unknown,
}

/// Frames the relay sends to game clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Roster of identified players, sent once right after connecting.
    Sync {
        /// Every participant in the room except the receiver.
        players: Vec<Participant>,
    },

    /// A player identified.
    Join {
        /// Connection the player is bound to.
        id: ConnectionId,
        /// Full roster entry of the player.
        player: Participant,
    },

    /// A player's position changed.
    Move {
        /// The moving player.
        id: ConnectionId,
        /// New absolute position.
        position: Position,
    },

    /// A connection closed.
    Leave {
        /// The departed connection.
        id: ConnectionId,
    },

    /// The receiver's previous frame was rejected.
    Error {
        /// Human-readable rejection reason.
        reason: String,
    },
}

impl ServerMessage {
    /// Builds the `join` announcement for a participant.
    #[must_use]
    pub fn join(player: &Participant) -> Self {
        Self::Join {
            id: player.id,
            player: player.clone(),
        }
    }

    /// Short wire name of the variant, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
            Self::Join { .. } => "join",
            Self::Move { .. } => "move",
            Self::Leave { .. } => "leave",
            Self::Error { .. } => "error",
        }
    }
}
