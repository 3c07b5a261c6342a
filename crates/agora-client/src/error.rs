use thiserror::Error;

use crate::state::RoomSessionState;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Nickname must not be empty")]
    EmptyNickname,

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: RoomSessionState,
    },

    #[error("Not connected to the chat server")]
    NotConnected,

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("Room task has stopped")]
    RoomClosed,
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server answered {0}")]
    Status(reqwest::StatusCode),

    #[error("Undecodable response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Transport-level faults. Carried inside events, hence `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection error: {0}")]
    Io(String),

    #[error("Dropped undecodable frame: {0}")]
    Decode(String),

    #[error("Connection is not open")]
    NotOpen,

    #[error("Send queue is full")]
    QueueFull,
}
