use agora_shared::ChatMessage;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::state::RoomSessionState;

pub const EVENT_STATE_CHANGED: &str = "state-changed";
pub const EVENT_HISTORY_LOADED: &str = "history-loaded";
pub const EVENT_MESSAGE_APPENDED: &str = "message-appended";
pub const EVENT_ONLINE_COUNT_CHANGED: &str = "online-count-changed";
pub const EVENT_NOTICE_CHANGED: &str = "notice-changed";
pub const EVENT_CLEARED: &str = "cleared";

/// Change notifications for the display layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RoomEvent {
    StateChanged { state: RoomSessionState },
    HistoryLoaded { count: usize },
    MessageAppended { index: usize, message: ChatMessage },
    OnlineCountChanged { count: u64 },
    NoticeChanged { notice: Option<String> },
    Cleared,
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::StateChanged { .. } => EVENT_STATE_CHANGED,
            RoomEvent::HistoryLoaded { .. } => EVENT_HISTORY_LOADED,
            RoomEvent::MessageAppended { .. } => EVENT_MESSAGE_APPENDED,
            RoomEvent::OnlineCountChanged { .. } => EVENT_ONLINE_COUNT_CHANGED,
            RoomEvent::NoticeChanged { .. } => EVENT_NOTICE_CHANGED,
            RoomEvent::Cleared => EVENT_CLEARED,
        }
    }
}

pub fn emit_event(tx: &broadcast::Sender<RoomEvent>, event: RoomEvent) {
    let name = event.name();
    if tx.send(event).is_err() {
        tracing::trace!(event = name, "No subscribers for room event");
    }
}
