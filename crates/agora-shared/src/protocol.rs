use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::ChatMessage;

/// Envelope of every frame the server pushes over the live channel.
///
/// The `type` field is the discriminator. Values this client does not know
/// decode to [`ServerFrame::Unknown`] so that newer servers stay compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Number of clients currently connected to the room
    UsersCount { count: u64 },

    /// A message accepted and stored by the server
    Message { message: ChatMessage },

    #[serde(other)]
    Unknown,
}

/// A decoded event from the live stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    PresenceUpdate { count: u64 },
    MessagePosted { message: ChatMessage },
}

/// Frame the client sends when the user submits a message.
///
/// The server answers nothing directly; the message comes back through the
/// live stream like any other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundPayload {
    pub nickname: String,
    pub content: String,
}

impl ServerFrame {
    pub fn into_live_event(self) -> Option<LiveEvent> {
        match self {
            ServerFrame::UsersCount { count } => Some(LiveEvent::PresenceUpdate { count }),
            ServerFrame::Message { message } => Some(LiveEvent::MessagePosted { message }),
            ServerFrame::Unknown => None,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<LiveEvent> for ServerFrame {
    fn from(event: LiveEvent) -> Self {
        match event {
            LiveEvent::PresenceUpdate { count } => ServerFrame::UsersCount { count },
            LiveEvent::MessagePosted { message } => ServerFrame::Message { message },
        }
    }
}

impl OutboundPayload {
    pub fn new(nickname: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            content: content.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode one text frame from the live channel.
///
/// Returns `Ok(None)` for well-formed frames with an unrecognised `type`.
/// Messages with a blank nickname or content are rejected.
pub fn decode_frame(raw: &str) -> Result<Option<LiveEvent>, ProtocolError> {
    let frame: ServerFrame = serde_json::from_str(raw)?;
    if let ServerFrame::Message { message } = &frame {
        message.validate()?;
    }
    Ok(frame.into_live_event())
}

/// Decode a binary frame carrying UTF-8 JSON.
pub fn decode_frame_bytes(raw: &[u8]) -> Result<Option<LiveEvent>, ProtocolError> {
    let text = std::str::from_utf8(raw).map_err(|_| ProtocolError::NotUtf8)?;
    decode_frame(text)
}
