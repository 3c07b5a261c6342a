//! Room session state machine.
//!
//! A [`RoomSession`] is one join of the room, from `NotJoined` to `Left`. It
//! owns the transport handle, the reconnection supervisor and the reconciled
//! message sequence, and is only ever touched by the room task.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use agora_shared::{OutboundPayload, RoomSnapshot};

use crate::config::ClientConfig;
use crate::error::{ClientError, HistoryError, TransportError};
use crate::events::{emit_event, RoomEvent};
use crate::reconciler::{Applied, StreamReconciler};
use crate::state::{RoomSessionState, RoomView};
use crate::supervisor::ReconnectSupervisor;
use crate::transport::{CloseReason, Connector, TransportEvent, TransportHandle};

pub const NOTICE_CONNECTION_LOST: &str = "Connection to server lost. Trying to reconnect...";
pub const NOTICE_HISTORY_FAILED: &str = "Failed to fetch message history.";
pub const NOTICE_SEND_FAILED: &str = "Not connected. Your message was not sent.";

pub struct RoomSession<C: Connector> {
    nickname: Option<String>,
    state: RoomSessionState,
    reconciler: StreamReconciler,
    supervisor: ReconnectSupervisor,
    transport: Option<TransportHandle>,
    notice: Option<String>,
    connector: Arc<C>,
    ws_url: String,
    events: broadcast::Sender<RoomEvent>,
}

impl<C: Connector> RoomSession<C> {
    pub fn new(
        config: &ClientConfig,
        connector: Arc<C>,
        events: broadcast::Sender<RoomEvent>,
    ) -> Self {
        Self {
            nickname: None,
            state: RoomSessionState::NotJoined,
            reconciler: StreamReconciler::new(),
            supervisor: ReconnectSupervisor::new(config.reconnect_delay),
            transport: None,
            notice: None,
            connector,
            ws_url: config.ws_url.clone(),
            events,
        }
    }

    pub fn state(&self) -> RoomSessionState {
        self.state
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Deadline of the pending reconnect attempt.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.supervisor.deadline()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn view(&self) -> RoomView {
        RoomView {
            nickname: self.nickname.clone(),
            state: self.state,
            messages: self.reconciler.messages().to_vec(),
            online_count: self.reconciler.online_count(),
            notice: self.notice.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// `NotJoined -> Joining`. The caller starts the history fetch.
    pub fn begin_join(&mut self, nickname: &str) -> Result<(), ClientError> {
        if self.state != RoomSessionState::NotJoined {
            return Err(ClientError::InvalidState {
                action: "join",
                state: self.state,
            });
        }

        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ClientError::EmptyNickname);
        }

        info!(nickname = %nickname, "Joining room");
        self.nickname = Some(nickname.to_string());
        self.set_state(RoomSessionState::Joining);
        Ok(())
    }

    /// `Joining -> Joined` once the history fetch settled, either way. The
    /// live channel is only opened here, after the snapshot is in place.
    pub fn finish_join(&mut self, outcome: Result<RoomSnapshot, HistoryError>) {
        if self.state != RoomSessionState::Joining {
            debug!(state = %self.state, "Ignoring stale history result");
            return;
        }

        match outcome {
            Ok(snapshot) => {
                let count = snapshot.len();
                self.reconciler = StreamReconciler::from_snapshot(snapshot);
                emit_event(&self.events, RoomEvent::HistoryLoaded { count });
            }
            Err(e) => {
                warn!(error = %e, "History fetch failed, continuing with empty history");
                self.set_notice(Some(NOTICE_HISTORY_FAILED));
            }
        }

        self.supervisor.arm();
        self.set_state(RoomSessionState::Joined);
        self.open_transport();
    }

    /// `Joined | Reconnecting | Joining -> Left`. Everything is torn down.
    pub fn leave(&mut self) -> Result<(), ClientError> {
        if !matches!(
            self.state,
            RoomSessionState::Joining | RoomSessionState::Joined | RoomSessionState::Reconnecting
        ) {
            return Err(ClientError::InvalidState {
                action: "leave",
                state: self.state,
            });
        }

        self.supervisor.disarm();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.reconciler = StreamReconciler::new();
        self.notice = None;

        info!(nickname = ?self.nickname, "Left room");
        emit_event(&self.events, RoomEvent::Cleared);
        self.set_state(RoomSessionState::Left);
        Ok(())
    }

    /// Submit a message. The server echoes it back over the live stream.
    pub fn send(&mut self, content: &str) -> Result<(), ClientError> {
        if content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }
        if !self.state.is_live() {
            return Err(ClientError::InvalidState {
                action: "send",
                state: self.state,
            });
        }

        let nickname = self.nickname.clone().unwrap_or_default();
        let result = match &self.transport {
            Some(transport) => transport.send(OutboundPayload::new(nickname, content)),
            None => Err(TransportError::NotOpen),
        };

        match result {
            Ok(()) => {
                debug!(len = content.len(), "Message sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Message not sent");
                self.set_notice(Some(NOTICE_SEND_FAILED));
                Err(ClientError::NotConnected)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transport / timer input
    // -----------------------------------------------------------------------

    /// Wait for the next event of the current transport. Pending forever
    /// while there is none.
    pub async fn next_transport_event(&mut self) -> TransportEvent {
        match self.transport.as_mut() {
            Some(transport) => match transport.next_event().await {
                Some(event) => event,
                None => TransportEvent::Closed(CloseReason::remote(None, "transport task ended")),
            },
            None => std::future::pending().await,
        }
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.supervisor.on_opened();
                self.set_notice(None);
                if self.state == RoomSessionState::Reconnecting {
                    info!("Reconnected to room");
                    self.set_state(RoomSessionState::Joined);
                }
            }

            TransportEvent::Message(live) => {
                if !self.state.is_live() {
                    debug!(state = %self.state, "Dropping live event outside of a join");
                    return;
                }
                match self.reconciler.apply(live) {
                    Applied::Presence { count } => {
                        emit_event(&self.events, RoomEvent::OnlineCountChanged { count });
                    }
                    Applied::Appended { index } => {
                        let message = self.reconciler.messages()[index].clone();
                        emit_event(&self.events, RoomEvent::MessageAppended { index, message });
                    }
                }
            }

            TransportEvent::Error(TransportError::Decode(reason)) => {
                debug!(reason = %reason, "Malformed frame discarded");
            }

            TransportEvent::Error(e) => {
                warn!(error = %e, "Transport fault");
                if self.supervisor.is_armed() {
                    self.set_notice(Some(NOTICE_CONNECTION_LOST));
                }
            }

            TransportEvent::Closed(reason) => {
                self.transport = None;
                if reason.is_user() {
                    debug!(state = %self.state, "Live channel closed on request");
                } else {
                    info!(reason = ?reason, state = %self.state, "Live channel closed");
                }
                if self.supervisor.on_closed(Instant::now())
                    && self.state == RoomSessionState::Joined
                {
                    self.set_state(RoomSessionState::Reconnecting);
                }
            }
        }
    }

    /// Reopen the live channel if the pending attempt is due.
    pub fn on_reconnect_due(&mut self, now: Instant) {
        if !self.supervisor.take_due(now) {
            return;
        }
        info!(attempt = self.supervisor.attempts(), "Reopening live channel");
        self.open_transport();
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn open_transport(&mut self) {
        if let Some(mut stale) = self.transport.take() {
            stale.close();
        }
        self.transport = Some(self.connector.open(&self.ws_url));
    }

    fn set_state(&mut self, state: RoomSessionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Room state transition");
        self.state = state;
        emit_event(&self.events, RoomEvent::StateChanged { state });
    }

    fn set_notice(&mut self, notice: Option<&str>) {
        if self.notice.as_deref() == notice {
            return;
        }
        self.notice = notice.map(str::to_string);
        emit_event(
            &self.events,
            RoomEvent::NoticeChanged {
                notice: self.notice.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use agora_shared::LiveEvent;

    use crate::testing::{history_failure, msg, ScriptedConnector};
    use crate::transport::{TransportCommand, TransportEndpoint};

    struct Harness {
        session: RoomSession<ScriptedConnector>,
        endpoints: tokio::sync::mpsc::UnboundedReceiver<TransportEndpoint>,
        events: broadcast::Receiver<RoomEvent>,
    }

    fn harness() -> Harness {
        let (connector, endpoints) = ScriptedConnector::new();
        let (tx, events) = broadcast::channel(64);
        let session = RoomSession::new(&ClientConfig::default(), Arc::new(connector), tx);
        Harness {
            session,
            endpoints,
            events,
        }
    }

    impl Harness {
        async fn endpoint(&mut self) -> TransportEndpoint {
            self.endpoints.recv().await.expect("connector dropped")
        }

        /// Deliver `event` through the current transport and process it.
        async fn push(&mut self, endpoint: &TransportEndpoint, event: TransportEvent) {
            assert!(endpoint.emit(event).await);
            let event = self.session.next_transport_event().await;
            self.session.on_transport_event(event);
        }

        fn drain(&mut self) -> Vec<RoomEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[tokio::test]
    async fn test_join_requires_nickname() {
        let mut h = harness();
        assert!(matches!(
            h.session.begin_join("   "),
            Err(ClientError::EmptyNickname)
        ));
        assert_eq!(h.session.state(), RoomSessionState::NotJoined);

        h.session.begin_join("  alice ").unwrap();
        assert_eq!(h.session.nickname(), Some("alice"));
        assert!(matches!(
            h.session.begin_join("bob"),
            Err(ClientError::InvalidState { action: "join", .. })
        ));
        assert_eq!(h.session.nickname(), Some("alice"));
    }

    #[tokio::test]
    async fn test_history_then_live_message_scenario() {
        let mut h = harness();
        h.session.begin_join("B").unwrap();
        assert!(!h.session.has_transport());

        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        assert_eq!(h.session.state(), RoomSessionState::Joined);
        let ep = h.endpoint().await;

        h.push(&ep, TransportEvent::Opened).await;
        h.push(
            &ep,
            TransportEvent::Message(LiveEvent::MessagePosted {
                message: msg(2, "B", "yo"),
            }),
        )
        .await;

        let view = h.session.view();
        assert_eq!(view.messages, vec![msg(1, "A", "hi"), msg(2, "B", "yo")]);
        assert_eq!(view.notice, None);
    }

    #[tokio::test]
    async fn test_history_failure_still_connects_and_allows_sending() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Err(history_failure()));

        let view = h.session.view();
        assert_eq!(view.state, RoomSessionState::Joined);
        assert!(view.messages.is_empty());
        assert_eq!(view.notice.as_deref(), Some(NOTICE_HISTORY_FAILED));

        let mut ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;
        assert_eq!(h.session.view().notice, None);

        h.session.send("hello").unwrap();
        match ep.next_command().await {
            Some(TransportCommand::Send(payload)) => {
                assert_eq!(payload, OutboundPayload::new("A", "hello"));
            }
            other => panic!("unexpected command: {other:?}"),
        }

        h.push(
            &ep,
            TransportEvent::Message(LiveEvent::MessagePosted {
                message: msg(7, "A", "hello"),
            }),
        )
        .await;
        assert_eq!(h.session.view().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_send_rejections() {
        let mut h = harness();
        assert!(matches!(
            h.session.send("hi"),
            Err(ClientError::InvalidState { action: "send", .. })
        ));

        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(Vec::new()));
        let _ep = h.endpoint().await;

        assert!(matches!(h.session.send("  "), Err(ClientError::EmptyContent)));
        // Transport still connecting.
        assert!(matches!(h.session.send("hi"), Err(ClientError::NotConnected)));
        assert_eq!(h.session.view().notice.as_deref(), Some(NOTICE_SEND_FAILED));
    }

    #[tokio::test]
    async fn test_presence_and_messages_are_reported() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        let ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;
        h.drain();

        for count in [3, 5, 4] {
            h.push(
                &ep,
                TransportEvent::Message(LiveEvent::PresenceUpdate { count }),
            )
            .await;
        }
        h.push(
            &ep,
            TransportEvent::Message(LiveEvent::MessagePosted {
                message: msg(2, "B", "yo"),
            }),
        )
        .await;

        assert_eq!(h.session.view().online_count, 4);
        assert_eq!(
            h.drain(),
            vec![
                RoomEvent::OnlineCountChanged { count: 3 },
                RoomEvent::OnlineCountChanged { count: 5 },
                RoomEvent::OnlineCountChanged { count: 4 },
                RoomEvent::MessageAppended {
                    index: 1,
                    message: msg(2, "B", "yo"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_frame_leaves_state_alone() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        let ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;
        let before = h.session.view();

        h.push(
            &ep,
            TransportEvent::Error(TransportError::Decode("expected value".into())),
        )
        .await;

        assert_eq!(h.session.view(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_armed_reconnects_without_refetch() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        let ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;

        h.push(&ep, TransportEvent::Error(TransportError::Io("reset".into())))
            .await;
        h.push(
            &ep,
            TransportEvent::Closed(CloseReason::remote(None, "reset")),
        )
        .await;

        let view = h.session.view();
        assert_eq!(view.state, RoomSessionState::Reconnecting);
        assert_eq!(view.notice.as_deref(), Some(NOTICE_CONNECTION_LOST));
        assert_eq!(view.messages.len(), 1);
        assert!(!h.session.has_transport());

        let deadline = h.session.reconnect_deadline().expect("timer scheduled");
        assert_eq!(deadline - Instant::now(), Duration::from_secs(3));

        // Not yet due.
        h.session.on_reconnect_due(Instant::now());
        assert!(!h.session.has_transport());

        tokio::time::advance(Duration::from_secs(3)).await;
        h.session.on_reconnect_due(Instant::now());
        assert!(h.session.has_transport());
        assert_eq!(h.session.reconnect_deadline(), None);

        let ep2 = h.endpoint().await;
        h.push(&ep2, TransportEvent::Opened).await;

        let view = h.session.view();
        assert_eq!(view.state, RoomSessionState::Joined);
        assert_eq!(view.notice, None);
        assert_eq!(view.messages, vec![msg(1, "A", "hi")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reopen_schedules_next_attempt() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(Vec::new()));

        // Initial connect refused.
        let ep = h.endpoint().await;
        h.push(
            &ep,
            TransportEvent::Error(TransportError::Connect("refused".into())),
        )
        .await;
        h.push(
            &ep,
            TransportEvent::Closed(CloseReason::remote(None, "connect failed")),
        )
        .await;
        assert_eq!(h.session.state(), RoomSessionState::Reconnecting);

        tokio::time::advance(Duration::from_secs(3)).await;
        h.session.on_reconnect_due(Instant::now());
        let ep2 = h.endpoint().await;
        h.push(
            &ep2,
            TransportEvent::Closed(CloseReason::remote(None, "connect failed")),
        )
        .await;

        assert_eq!(h.session.state(), RoomSessionState::Reconnecting);
        assert!(h.session.reconnect_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_cancels_timer_and_clears_state() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        let ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;
        h.push(
            &ep,
            TransportEvent::Message(LiveEvent::PresenceUpdate { count: 2 }),
        )
        .await;
        h.push(
            &ep,
            TransportEvent::Closed(CloseReason::remote(Some(1006), "abnormal")),
        )
        .await;
        assert!(h.session.reconnect_deadline().is_some());

        h.session.leave().unwrap();

        let view = h.session.view();
        assert_eq!(view.state, RoomSessionState::Left);
        assert!(view.messages.is_empty());
        assert_eq!(view.online_count, 0);
        assert_eq!(h.session.reconnect_deadline(), None);

        tokio::time::advance(Duration::from_secs(10)).await;
        h.session.on_reconnect_due(Instant::now());
        assert!(!h.session.has_transport());
        assert!(h.endpoints.try_recv().is_err());

        assert!(matches!(
            h.session.leave(),
            Err(ClientError::InvalidState { action: "leave", .. })
        ));
    }

    #[tokio::test]
    async fn test_leave_closes_open_transport() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.finish_join(Ok(Vec::new()));
        let mut ep = h.endpoint().await;
        h.push(&ep, TransportEvent::Opened).await;

        h.session.leave().unwrap();
        assert!(matches!(
            ep.next_command().await,
            Some(TransportCommand::Close)
        ));
        assert!(ep.next_command().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_history_result_after_leave_is_ignored() {
        let mut h = harness();
        h.session.begin_join("A").unwrap();
        h.session.leave().unwrap();

        h.session.finish_join(Ok(vec![msg(1, "A", "hi")]));
        assert_eq!(h.session.state(), RoomSessionState::Left);
        assert!(!h.session.has_transport());
        assert!(h.session.view().messages.is_empty());
    }
}
