//! Participant data model: connection identity, position and roster entries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier the relay assigns to every WebSocket connection.
///
/// Wraps a UUID v7 so ids sort roughly by connect time in logs. Serialized as
/// the hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh, time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in the solar system's world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A player known to a room.
///
/// Only identified connections become participants, so `username` is always
/// present. `position` stays `None` until the first `move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Connection the participant is bound to.
    pub id: ConnectionId,
    /// Name supplied by the client's latest `identify`.
    pub username: String,
    /// Last reported position, omitted on the wire until known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Participant {
    #[must_use]
    pub fn new(id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            position: None,
        }
    }
}
