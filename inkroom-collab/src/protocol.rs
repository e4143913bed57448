//! JSON wire protocol for the drawing channel.
//!
//! Every WebSocket text frame carries one event:
//! ```text
//! {"event": "joinRoom",       "data": "design-101"}
//! {"event": "drawing",        "data": {"x0":0,"y0":0,"x1":10,"y1":10,"color":"#000000","size":5}}
//! {"event": "clearCanvas"}
//! {"event": "drawingHistory", "data": [{"roomId":"design-101", ..., "timestamp":1700000000000}]}
//! {"event": "canvasCleared"}
//! {"event": "rejected",       "data": {"reason": "..."}}
//! ```
//!
//! Inbound `drawing` payloads are validated on decode, so a frame that parses
//! is safe to persist and relay.

use inkroom_core::{ModelError, RoomId, StrokeEvent, StrokeSegment};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one live WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    JoinRoom(RoomId),
    Drawing(StrokeSegment),
    ClearCanvas,
}

impl ClientMessage {
    /// Decode and validate one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let msg: ClientMessage = serde_json::from_str(text)?;
        if let ClientMessage::Drawing(segment) = &msg {
            segment.validate()?;
        }
        Ok(msg)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Reason payload for a `rejected` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
}

/// Messages the server sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full ordered replay, sent only to the connection that just joined.
    DrawingHistory(Vec<StrokeEvent>),
    /// Live relay of another member's stroke (room and timestamp stripped).
    Drawing(StrokeSegment),
    /// Authoritative clear confirmation, sent to every member.
    CanvasCleared,
    /// Sent to the offending connection only when misuse rejection is on.
    Rejected(Rejection),
}

impl ServerMessage {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ServerMessage::Rejected(Rejection {
            reason: reason.into(),
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid stroke: {0}")]
    InvalidStroke(#[from] ModelError),

    #[error("Encoding failed: {0}")]
    Encode(serde_json::Error),

    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(&'static str),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
