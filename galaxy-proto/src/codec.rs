//! JSON text-frame encoding for the presence protocol.
//!
//! Decoding is the validation boundary: a frame either becomes a well-formed
//! [`ClientMessage`] or a [`CodecError`], before any room state is touched.

use crate::message::{ClientMessage, ServerMessage};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Not JSON, no `type` field, or a known `type` with a bad payload.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Frame exceeds the configured size limit.
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected frame in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },
}

/// Decodes a client text frame, rejecting frames longer than `max_len` bytes.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] for oversized frames and
/// [`CodecError::Malformed`] when the JSON does not describe a client message.
pub fn decode_client(text: &str, max_len: usize) -> Result<ClientMessage, CodecError> {
    if text.len() > max_len {
        return Err(CodecError::TooLarge {
            size: text.len(),
            max: max_len,
        });
    }
    Ok(serde_json::from_str(text)?)
}

/// Encodes a client message. Used by clients and tests.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Encodes a server message into a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes a server frame. Used by clients and tests.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] when the JSON is not a server message.
pub fn decode_server(text: &str) -> Result<ServerMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}
