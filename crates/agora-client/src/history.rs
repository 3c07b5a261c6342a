//! One-shot fetch of the room backlog at join time.

use std::future::Future;

use tracing::{debug, info, warn};

use agora_shared::RoomSnapshot;

use crate::config::ClientConfig;
use crate::error::HistoryError;

/// Source of the join-time message backlog.
pub trait HistorySource: Send + Sync + 'static {
    /// Fetch the backlog, oldest first.
    fn fetch(&self) -> impl Future<Output = Result<RoomSnapshot, HistoryError>> + Send;
}

/// Loads the backlog from `GET {base}/messages`.
#[derive(Debug, Clone)]
pub struct HttpHistoryLoader {
    client: reqwest::Client,
    messages_url: String,
}

impl HttpHistoryLoader {
    pub fn new(config: &ClientConfig) -> Result<Self, HistoryError> {
        let client = reqwest::Client::builder()
            .timeout(config.history_timeout)
            .build()?;

        Ok(Self {
            client,
            messages_url: config.messages_url(),
        })
    }

    pub fn messages_url(&self) -> &str {
        &self.messages_url
    }
}

impl HistorySource for HttpHistoryLoader {
    async fn fetch(&self) -> Result<RoomSnapshot, HistoryError> {
        debug!(url = %self.messages_url, "Fetching message history");

        let response = self.client.get(&self.messages_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status));
        }

        let body = response.bytes().await?;
        let snapshot: RoomSnapshot = serde_json::from_slice(&body)?;
        let snapshot: RoomSnapshot = snapshot
            .into_iter()
            .filter(|message| match message.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(id = ?message.id, error = %e, "Dropping invalid backlog entry");
                    false
                }
            })
            .collect();

        info!(count = snapshot.len(), "Loaded message history");
        Ok(snapshot)
    }
}
