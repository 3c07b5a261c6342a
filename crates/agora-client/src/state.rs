//! Room state exposed to the display layer.
//!
//! [`RoomView`] is a read-only projection of one room session. The display
//! layer obtains it through [`crate::RoomHandle::view`] and keeps it fresh by
//! listening to [`crate::events::RoomEvent`]s.

use std::fmt;

use agora_shared::ChatMessage;
use serde::Serialize;

/// Lifecycle of one room session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomSessionState {
    NotJoined,
    Joining,
    Joined,
    Reconnecting,
    Left,
}

impl RoomSessionState {
    /// Joined or Reconnecting: the states in which the message sequence only grows.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Joined | Self::Reconnecting)
    }
}

impl fmt::Display for RoomSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotJoined => "not joined",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Reconnecting => "reconnecting",
            Self::Left => "left",
        };
        f.write_str(label)
    }
}

/// Snapshot of everything the display layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    /// `None` until a join has begun.
    pub nickname: Option<String>,

    pub state: RoomSessionState,

    /// Visible message sequence, in arrival order.
    pub messages: Vec<ChatMessage>,

    /// Last presence count pushed by the server.
    pub online_count: u64,

    /// Non-fatal banner text, cleared once the live channel reopens.
    pub notice: Option<String>,
}

impl RoomView {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for RoomView {
    fn default() -> Self {
        Self {
            nickname: None,
            state: RoomSessionState::NotJoined,
            messages: Vec::new(),
            online_count: 0,
            notice: None,
        }
    }
}
