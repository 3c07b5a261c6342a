//! Client core for the agora chat room.
//!
//! [`connect`] spawns the room task wired to the real WebSocket connector and
//! HTTP history loader. The display layer drives it through [`RoomHandle`]
//! and renders from [`RoomEvent`] notifications or [`RoomHandle::view`].

pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod reconciler;
pub mod room;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

pub use config::ClientConfig;
pub use error::{ClientError, HistoryError, TransportError};
pub use events::RoomEvent;
pub use history::{HistorySource, HttpHistoryLoader};
pub use room::{spawn_room, RoomHandle};
pub use state::{RoomSessionState, RoomView};
pub use transport::{Connector, WsConnector};

/// Install the fmt subscriber. Does nothing if one is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agora_client=debug,agora_shared=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Spawn a room against the configured server.
pub fn connect(
    config: ClientConfig,
) -> Result<(RoomHandle, broadcast::Receiver<RoomEvent>), ClientError> {
    let history = HttpHistoryLoader::new(&config)?;
    tracing::info!(
        messages = %history.messages_url(),
        ws = %config.ws_url,
        "Starting agora client"
    );
    Ok(spawn_room(config, WsConnector::new(), history))
}
