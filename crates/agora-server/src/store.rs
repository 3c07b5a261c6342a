//! In-memory message log.
//!
//! Messages live for the lifetime of the process. Ids are assigned in
//! insertion order starting at 1.

use chrono::Utc;
use tokio::sync::Mutex;

use agora_shared::{ChatMessage, MessageId};

#[derive(Debug, Default)]
pub struct MessageStore {
    inner: Mutex<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    last_id: MessageId,
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a message and return it with its id and timestamp.
    pub async fn append(&self, nickname: &str, content: &str) -> ChatMessage {
        let mut inner = self.inner.lock().await;
        inner.last_id += 1;

        let message = ChatMessage {
            id: Some(inner.last_id),
            nickname: nickname.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());
        message
    }

    /// The last `limit` messages, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let inner = self.inner.lock().await;
        let start = inner.messages.len().saturating_sub(limit);
        inner.messages[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.messages.len()
    }
}
