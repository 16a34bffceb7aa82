//! Shared protocol definitions for the Galaxy Explorer presence relay.

pub mod codec;
pub mod message;
pub mod presence;
