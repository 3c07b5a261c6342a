//! Live channel transport with a tokio mpsc command/event pattern.
//!
//! Every connection runs in a dedicated tokio task that owns the socket.
//! The room task talks to it through a [`TransportHandle`]: commands go in,
//! typed [`TransportEvent`]s come out in the order the server sent them.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, info, warn};

use agora_shared::protocol::{decode_frame, decode_frame_bytes};
use agora_shared::{LiveEvent, OutboundPayload};

use crate::error::TransportError;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* a connection task.
#[derive(Debug)]
pub enum TransportCommand {
    /// Transmit one outbound frame.
    Send(OutboundPayload),
    /// Close the connection on the user's behalf.
    Close,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client asked for the close.
    User,
    /// The server or the network ended the connection.
    Remote { code: Option<u16>, reason: String },
}

impl CloseReason {
    pub fn remote(code: Option<u16>, reason: impl Into<String>) -> Self {
        CloseReason::Remote {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, CloseReason::User)
    }

    fn from_frame(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => {
                CloseReason::remote(Some(u16::from(frame.code)), frame.reason.to_string())
            }
            None => CloseReason::remote(None, "closed by server"),
        }
    }
}

/// Events sent *from* a connection task.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is usable.
    Opened,
    /// The server pushed a frame with a recognised envelope.
    Message(LiveEvent),
    /// The connection ended. Always the last event of a handle.
    Closed(CloseReason),
    /// A fault occurred; usually followed by `Closed`.
    Error(TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closed,
}

// ---------------------------------------------------------------------------
// Handle / endpoint
// ---------------------------------------------------------------------------

/// The room task's side of one connection.
#[derive(Debug)]
pub struct TransportHandle {
    state: TransportState,
    commands: mpsc::Sender<TransportCommand>,
    events: mpsc::Receiver<TransportEvent>,
}

/// The connection task's side of one connection.
#[derive(Debug)]
pub struct TransportEndpoint {
    commands: mpsc::Receiver<TransportCommand>,
    events: mpsc::Sender<TransportEvent>,
}

impl TransportHandle {
    /// Create a connected handle/endpoint pair. Connectors hand the endpoint
    /// to whatever drives the connection.
    pub fn pair() -> (TransportHandle, TransportEndpoint) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let handle = TransportHandle {
            state: TransportState::Connecting,
            commands: cmd_tx,
            events: event_rx,
        };
        let endpoint = TransportEndpoint {
            commands: cmd_rx,
            events: event_tx,
        };
        (handle, endpoint)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == TransportState::Open
    }

    /// Transmit a payload. Fails locally, without queueing, unless the
    /// connection is open.
    pub fn send(&self, payload: OutboundPayload) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }

        self.commands
            .try_send(TransportCommand::Send(payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::QueueFull,
                TrySendError::Closed(_) => TransportError::NotOpen,
            })
    }

    /// Ask the connection task to close. The matching `Closed(User)` event
    /// is not awaited.
    pub fn close(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }
        self.state = TransportState::Closed;
        // A full or closed queue means the task is gone or will see the
        // sender drop with the handle.
        let _ = self.commands.try_send(TransportCommand::Close);
    }

    /// Wait for the next event. Returns `None` once the connection task has
    /// gone away.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.recv().await?;
        match &event {
            TransportEvent::Opened => self.state = TransportState::Open,
            TransportEvent::Closed(_) => self.state = TransportState::Closed,
            _ => {}
        }
        Some(event)
    }
}

impl TransportEndpoint {
    /// Deliver an event to the handle. Returns `false` if the handle is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Next command from the handle. `None` once the handle has been dropped.
    pub async fn next_command(&mut self) -> Option<TransportCommand> {
        self.commands.recv().await
    }
}

// ---------------------------------------------------------------------------
// Connectors
// ---------------------------------------------------------------------------

/// Opens live channel connections.
pub trait Connector: Send + Sync + 'static {
    /// Start connecting to `url`. Progress is reported through the handle.
    fn open(&self, url: &str) -> TransportHandle;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default)]
pub struct WsConnector {
    opened: AtomicU64,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let attempt = self.opened.fetch_add(1, Ordering::Relaxed) + 1;
        let (handle, endpoint) = TransportHandle::pair();
        let url = url.to_string();

        tokio::spawn(async move {
            run_connection(url, attempt, endpoint).await;
        });

        handle
    }
}

/// Drive one WebSocket connection until it closes.
async fn run_connection(url: String, attempt: u64, mut endpoint: TransportEndpoint) {
    debug!(url = %url, attempt, "Opening live channel");

    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!(url = %url, attempt, error = %e, "Live channel connect failed");
            endpoint
                .emit(TransportEvent::Error(TransportError::Connect(e.to_string())))
                .await;
            endpoint
                .emit(TransportEvent::Closed(CloseReason::remote(
                    None,
                    "connect failed",
                )))
                .await;
            return;
        }
    };

    info!(url = %url, attempt, "Live channel open");
    if !endpoint.emit(TransportEvent::Opened).await {
        debug!(url = %url, "Handle dropped before open, abandoning connection");
        return;
    }

    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            // --- Outgoing commands ---
            cmd = endpoint.next_command() => {
                match cmd {
                    Some(TransportCommand::Send(payload)) => {
                        let text = match payload.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode outbound payload");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(url = %url, error = %e, "Live channel send failed");
                            endpoint
                                .emit(TransportEvent::Error(TransportError::Io(e.to_string())))
                                .await;
                            break CloseReason::remote(None, e.to_string());
                        }
                    }
                    Some(TransportCommand::Close) | None => {
                        if let Err(e) = sink.close().await {
                            debug!(error = %e, "Error while closing live channel");
                        }
                        break CloseReason::User;
                    }
                }
            }

            // --- Incoming frames ---
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Close(frame))) => break CloseReason::from_frame(frame),
                    Some(Ok(Message::Text(text))) => {
                        forward_frame(&endpoint, decode_frame(text.as_str())).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        forward_frame(&endpoint, decode_frame_bytes(&data)).await;
                    }
                    // Ping/pong are answered by tungstenite itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "Live channel error");
                        endpoint
                            .emit(TransportEvent::Error(TransportError::Io(e.to_string())))
                            .await;
                        break CloseReason::remote(None, e.to_string());
                    }
                    None => break CloseReason::remote(None, "stream ended"),
                }
            }
        }
    };

    info!(url = %url, attempt, reason = ?reason, "Live channel closed");
    endpoint.emit(TransportEvent::Closed(reason)).await;
}

/// Pass a decoded frame on, or report it as dropped.
async fn forward_frame(
    endpoint: &TransportEndpoint,
    decoded: Result<Option<LiveEvent>, agora_shared::ProtocolError>,
) {
    match decoded {
        Ok(Some(event)) => {
            endpoint.emit(TransportEvent::Message(event)).await;
        }
        Ok(None) => debug!("Ignoring frame with unrecognised type"),
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            endpoint
                .emit(TransportEvent::Error(TransportError::Decode(e.to_string())))
                .await;
        }
    }
}
