//! The room task and its command handle.
//!
//! One tokio task owns the [`RoomSession`] and multiplexes user commands,
//! the in-flight history fetch, transport events and the reconnect timer
//! with `tokio::select!`. Nothing else touches session state, so no locks
//! are needed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use agora_shared::RoomSnapshot;

use crate::config::{ClientConfig, EVENT_CHANNEL_CAPACITY};
use crate::error::{ClientError, HistoryError};
use crate::events::RoomEvent;
use crate::history::HistorySource;
use crate::session::RoomSession;
use crate::state::{RoomSessionState, RoomView};
use crate::transport::Connector;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

type HistoryFuture = Pin<Box<dyn Future<Output = Result<RoomSnapshot, HistoryError>> + Send>>;

/// Commands sent *into* the room task.
#[derive(Debug)]
enum RoomCommand {
    Join {
        nickname: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Send {
        content: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Leave {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    View {
        reply: oneshot::Sender<RoomView>,
    },
    Shutdown,
}

/// Cloneable handle the display layer uses to drive the room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    commands: mpsc::Sender<RoomCommand>,
    events: broadcast::Sender<RoomEvent>,
}

impl RoomHandle {
    /// Join the room under `nickname`. A join after a leave starts from an
    /// empty room.
    pub async fn join(&self, nickname: impl Into<String>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        let nickname = nickname.into();
        self.request(RoomCommand::Join { nickname, reply }, rx).await?
    }

    /// Submit a message. On error the caller should keep the input so the
    /// user can retry.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        let content = content.into();
        self.request(RoomCommand::Send { content, reply }, rx).await?
    }

    pub async fn leave(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Leave { reply }, rx).await?
    }

    pub async fn view(&self) -> Result<RoomView, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::View { reply }, rx).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    /// Leave if joined and stop the room task.
    pub async fn shutdown(&self) {
        if self.commands.send(RoomCommand::Shutdown).await.is_err() {
            debug!("Room task already stopped");
        }
    }

    async fn request<T>(
        &self,
        command: RoomCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::RoomClosed)?;
        rx.await.map_err(|_| ClientError::RoomClosed)
    }
}

/// Spawn the room task.
///
/// Returns the command handle and a first subscription to room events.
pub fn spawn_room<C, H>(
    config: ClientConfig,
    connector: C,
    history: H,
) -> (RoomHandle, broadcast::Receiver<RoomEvent>)
where
    C: Connector,
    H: HistorySource,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let task = RoomTask {
        config,
        connector: Arc::new(connector),
        history: Arc::new(history),
        events: event_tx.clone(),
    };
    tokio::spawn(task.run(cmd_rx));

    let handle = RoomHandle {
        commands: cmd_tx,
        events: event_tx,
    };
    (handle, event_rx)
}

struct RoomTask<C: Connector, H: HistorySource> {
    config: ClientConfig,
    connector: Arc<C>,
    history: Arc<H>,
    events: broadcast::Sender<RoomEvent>,
}

impl<C: Connector, H: HistorySource> RoomTask<C, H> {
    fn new_session(&self) -> RoomSession<C> {
        RoomSession::new(&self.config, self.connector.clone(), self.events.clone())
    }

    async fn run(self, mut commands: mpsc::Receiver<RoomCommand>) {
        let mut session = self.new_session();
        let mut pending_history: Option<HistoryFuture> = None;

        info!(api = %self.config.api_url, ws = %self.config.ws_url, "Room task started");

        loop {
            let deadline = session.reconnect_deadline();

            tokio::select! {
                // --- User commands ---
                cmd = commands.recv() => {
                    match cmd {
                        Some(RoomCommand::Join { nickname, reply }) => {
                            if session.state() == RoomSessionState::Left {
                                session = self.new_session();
                            }
                            let result = session.begin_join(&nickname);
                            if result.is_ok() {
                                let history = self.history.clone();
                                pending_history = Some(Box::pin(async move { history.fetch().await }));
                            }
                            let _ = reply.send(result);
                        }
                        Some(RoomCommand::Send { content, reply }) => {
                            let _ = reply.send(session.send(&content));
                        }
                        Some(RoomCommand::Leave { reply }) => {
                            let result = session.leave();
                            if result.is_ok() {
                                // Cancels an in-flight fetch.
                                pending_history = None;
                            }
                            let _ = reply.send(result);
                        }
                        Some(RoomCommand::View { reply }) => {
                            let _ = reply.send(session.view());
                        }
                        Some(RoomCommand::Shutdown) | None => {
                            if session.leave().is_ok() {
                                debug!("Left room on shutdown");
                            }
                            break;
                        }
                    }
                }

                // --- History fetch ---
                outcome = settle(&mut pending_history) => {
                    pending_history = None;
                    session.finish_join(outcome);
                }

                // --- Transport events ---
                event = session.next_transport_event() => {
                    session.on_transport_event(event);
                }

                // --- Reconnect timer ---
                _ = reconnect_timer(deadline) => {
                    session.on_reconnect_due(Instant::now());
                }
            }
        }

        info!("Room task terminated");
    }
}

async fn settle(pending: &mut Option<HistoryFuture>) -> Result<RoomSnapshot, HistoryError> {
    match pending {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
