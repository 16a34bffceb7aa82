//! Galaxy Explorer presence relay library.
//!
//! Exposes the relay server for use in tests and embedding. Clients join a
//! room per solar system over WebSocket; the relay tracks who is there and
//! fans out join, move and leave events to everyone else in the room.

pub mod config;
pub mod relay;
pub mod room;
pub mod rooms;
