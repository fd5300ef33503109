//! JSON frames exchanged over the per-channel WebSocket.
//!
//! The protocol is small: the client sends one `auth` frame right after the
//! socket opens, and the server pushes `new_message` frames. Any other
//! server frame type decodes to [`ServerFrame::Unknown`] so newer servers do
//! not break older clients.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Error type for frame encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Inbound text is not JSON, has no `type`, or a known type has the
    /// wrong shape.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Outbound frame could not be serialized.
    #[error("frame serialization error: {0}")]
    Serialization(String),
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authenticates the socket. Must be the first frame after open.
    ///
    /// `token` is `null` when no credential is held; the server then
    /// ignores the connection's traffic.
    Auth {
        /// Bearer token.
        token: Option<String>,
    },
}

/// Frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A message was posted to the channel.
    NewMessage {
        /// The posted message.
        data: Message,
    },
    /// Any frame type this client does not interpret.
    #[serde(other)]
    Unknown,
}

/// Encodes a client frame as JSON text.
///
/// # Errors
///
/// Returns `FrameError::Serialization` if the frame cannot be serialized.
pub fn encode_client(frame: &ClientFrame) -> Result<String, FrameError> {
    serde_json::to_string(frame).map_err(|e| FrameError::Serialization(e.to_string()))
}

/// Decodes a server frame from JSON text.
///
/// # Errors
///
/// Returns `FrameError::Malformed` if the text is not a recognizable frame.
pub fn decode_server(text: &str) -> Result<ServerFrame, FrameError> {
    serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))
}
