use serde::{Deserialize, Serialize};

/// Maximum WebSocket message size in bytes (16 MB).
///
/// Voice clips and inline images ride the same socket as text, so the
/// cap is generous; anything larger belongs on an upload endpoint.
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Close code for a clean, expected shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent when an endpoint is going away (page unload, server
/// restart).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when the peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code synthesized when a connection dies without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Message type identifier carried in the envelope's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Chat content
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "image")]
    Image,

    // Server push
    #[serde(rename = "detection")]
    Detection,
    #[serde(rename = "status")]
    Status,

    // Keepalive
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown message types deserialize here.
    #[serde(other)]
    Unknown,
}
