//! Merges the history snapshot with the live stream.
//!
//! The snapshot is fetched to completion before the live channel opens, so
//! the two never overlap and live events are simply appended.

use agora_shared::{ChatMessage, LiveEvent, RoomSnapshot};

/// What a single live event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Presence { count: u64 },
    Appended { index: usize },
}

#[derive(Debug, Clone, Default)]
pub struct StreamReconciler {
    messages: Vec<ChatMessage>,
    online_count: u64,
}

impl StreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the join-time snapshot.
    pub fn from_snapshot(snapshot: RoomSnapshot) -> Self {
        Self {
            messages: snapshot,
            online_count: 0,
        }
    }

    /// Apply one live event, in arrival order.
    pub fn apply(&mut self, event: LiveEvent) -> Applied {
        match event {
            LiveEvent::PresenceUpdate { count } => {
                self.online_count = count;
                Applied::Presence { count }
            }
            LiveEvent::MessagePosted { message } => {
                self.messages.push(message);
                Applied::Appended {
                    index: self.messages.len() - 1,
                }
            }
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn online_count(&self) -> u64 {
        self.online_count
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
