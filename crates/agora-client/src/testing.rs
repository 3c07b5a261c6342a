//! In-memory connector and history source for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, Semaphore};

use agora_shared::{ChatMessage, RoomSnapshot};

use crate::error::HistoryError;
use crate::history::HistorySource;
use crate::transport::{Connector, TransportEndpoint, TransportHandle};

pub(crate) fn msg(id: i64, nickname: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: Some(id),
        nickname: nickname.into(),
        content: content.into(),
        created_at: Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap(),
    }
}

pub(crate) fn history_failure() -> HistoryError {
    HistoryError::Decode(serde_json::from_str::<serde_json::Value>("<html>").unwrap_err())
}

/// Hands every opened connection's endpoint to the test.
pub(crate) struct ScriptedConnector {
    endpoints: mpsc::UnboundedSender<TransportEndpoint>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<TransportEndpoint>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { endpoints: tx }, rx)
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, _url: &str) -> TransportHandle {
        let (handle, endpoint) = TransportHandle::pair();
        let _ = self.endpoints.send(endpoint);
        handle
    }
}

/// History source whose fetches block until the test releases them.
#[derive(Clone)]
pub(crate) struct GatedHistory {
    inner: Arc<GatedInner>,
}

struct GatedInner {
    calls: AtomicUsize,
    release: Semaphore,
    outcome: Option<RoomSnapshot>,
}

impl GatedHistory {
    /// `None` makes every fetch fail.
    pub(crate) fn new(outcome: Option<RoomSnapshot>) -> Self {
        Self {
            inner: Arc::new(GatedInner {
                calls: AtomicUsize::new(0),
                release: Semaphore::new(0),
                outcome,
            }),
        }
    }

    pub(crate) fn release(&self) {
        self.inner.release.add_permits(1);
    }

    pub(crate) fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

impl HistorySource for GatedHistory {
    async fn fetch(&self) -> Result<RoomSnapshot, HistoryError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.release.acquire().await.unwrap().forget();
        match &self.inner.outcome {
            Some(snapshot) => Ok(snapshot.clone()),
            None => Err(history_failure()),
        }
    }
}
