//! The single chat room: connection count and frame fan-out.
//!
//! Every live connection holds a receiver on one broadcast channel of
//! pre-encoded JSON frames. Accepted messages go to all connections,
//! including the one that posted them.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use agora_shared::constants::ANONYMOUS_NICKNAME;
use agora_shared::{ChatMessage, LiveEvent, ServerFrame};

use crate::error::ServerError;
use crate::store::MessageStore;

const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Inbound frame from a client.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default = "anonymous")]
    nickname: String,
    #[serde(default)]
    content: String,
}

fn anonymous() -> String {
    ANONYMOUS_NICKNAME.to_string()
}

#[derive(Debug)]
pub struct ChatRoom {
    store: MessageStore,
    frames: broadcast::Sender<String>,
    online: AtomicUsize,
    closing: watch::Sender<bool>,
}

impl ChatRoom {
    pub fn new(store: MessageStore) -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        let (closing, _) = watch::channel(false);
        Self {
            store,
            frames,
            online: AtomicUsize::new(0),
            closing,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn online(&self) -> usize {
        self.online.load(Ordering::SeqCst)
    }

    /// Ask every live connection to close. New connections are refused.
    pub fn close_all(&self) {
        info!(online = self.online(), "Closing live connections");
        self.closing.send_replace(true);
    }

    pub fn is_closing(&self) -> bool {
        *self.closing.borrow()
    }

    /// Resolves once [`ChatRoom::close_all`] has been called.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            // The sender lives as long as the room; an error means it is gone.
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }

    /// Register a connection. The returned receiver sees the updated count
    /// first.
    pub fn connect(&self) -> Result<broadcast::Receiver<String>, ServerError> {
        let rx = self.frames.subscribe();
        let count = self.online.fetch_add(1, Ordering::SeqCst) + 1;
        info!(online = count, "Live connection opened");
        self.broadcast_count(count)?;
        Ok(rx)
    }

    pub fn disconnect(&self) -> Result<(), ServerError> {
        let count = self.online.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!(online = count, "Live connection closed");
        self.broadcast_count(count)
    }

    /// Handle one inbound text frame.
    ///
    /// Frames that are not JSON or carry an empty nickname or content are
    /// dropped and yield `Ok(None)`.
    pub async fn post(&self, raw: &str) -> Result<Option<ChatMessage>, ServerError> {
        let inbound: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Ignoring malformed inbound frame");
                return Ok(None);
            }
        };

        let nickname = inbound.nickname.trim();
        let content = inbound.content.trim();
        if nickname.is_empty() || content.is_empty() {
            debug!("Ignoring frame with empty nickname or content");
            return Ok(None);
        }

        let message = self.store.append(nickname, content).await;
        debug!(id = ?message.id, nickname = %message.nickname, "Message stored");

        let frame = ServerFrame::from(LiveEvent::MessagePosted {
            message: message.clone(),
        })
        .to_json()?;
        self.send_frame(frame);
        Ok(Some(message))
    }

    fn broadcast_count(&self, count: usize) -> Result<(), ServerError> {
        let frame = ServerFrame::from(LiveEvent::PresenceUpdate {
            count: count as u64,
        })
        .to_json()?;
        self.send_frame(frame);
        Ok(())
    }

    fn send_frame(&self, frame: String) {
        // No receivers just means nobody is connected.
        let _ = self.frames.send(frame);
    }
}
