//! Connection manager - drives the session state machine.
//!
//! One tokio task owns the socket, the in-flight connect, the reconnect
//! timer and the message history. Every input (commands from the handle,
//! socket frames, connect completion, the timer) becomes a single
//! [`Event`] and goes through [`ConnectionManager::dispatch`], which asks
//! [`ConnectionState::on_event`] what to do and then performs the I/O.
//!
//! ```text
//! ConnectionHandle ─ commands ─▶ ConnectionManager ─▶ Transport
//!        ▲                              │
//!        └── watch / broadcast ◀────────┘
//!                                 sync-core (pure state machine)
//! ```

use easysync_core::{
    Action, ConnectionState, DeviceIdentity, Event, MessageHistory, ReconnectPolicy, Recorded,
    SessionEvent,
};
use easysync_types::{Message, SessionToken};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::transport::{Connection, Frame, Transport, TransportError};

enum Command {
    SetToken(Option<SessionToken>),
    Send(Message),
    History(oneshot::Sender<Vec<Message>>),
    ClearHistory,
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to a running [`ConnectionManager`].
///
/// Dropping every handle tears the manager down, like [`shutdown`](Self::shutdown).
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    messages: broadcast::Sender<Message>,
    events: broadcast::Sender<SessionEvent>,
}

impl ConnectionHandle {
    /// Provide, replace or clear the session token.
    pub fn set_token(&self, token: Option<SessionToken>) {
        let _ = self.commands.send(Command::SetToken(token));
    }

    /// Send a frame if the connection is open; otherwise it is dropped.
    pub fn send(&self, message: Message) {
        let _ = self.commands.send(Command::Send(message));
    }

    /// Snapshot of the history, newest first.
    pub async fn history(&self) -> Vec<Message> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::History(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Empty the visible history. Seen ids stay remembered.
    pub fn clear_history(&self) {
        let _ = self.commands.send(Command::ClearHistory);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive every frame newly stored in history.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.messages.subscribe()
    }

    /// Receive lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Tear the manager down and wait for it to finish.
    ///
    /// Cancels any pending reconnect, abandons an in-flight connect and
    /// closes the live socket with the normal-closure code.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

type ConnectTask<C> = JoinHandle<Result<C, TransportError>>;

/// Owns one session's connection lifecycle.
pub struct ConnectionManager<T: Transport> {
    config: ClientConfig,
    transport: Arc<T>,
    identity: DeviceIdentity,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    state: ConnectionState,
    socket: Option<T::Connection>,
    connecting: Option<ConnectTask<T::Connection>>,
    reconnect_at: Option<Instant>,
    history: MessageHistory,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    messages_tx: broadcast::Sender<Message>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Start a manager task and return its handle.
    ///
    /// With a token present the first connection attempt starts at once.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: &ClientConfig,
        transport: T,
        identity: DeviceIdentity,
        token: Option<SessionToken>,
    ) -> ConnectionHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::new(None));
        let capacity = config.history.limit.max(1);
        let (messages_tx, _) = broadcast::channel(capacity);
        let (events_tx, _) = broadcast::channel(64);

        let manager = Self {
            config: config.clone(),
            transport: Arc::new(transport),
            identity,
            policy: config.reconnect_policy(),
            connect_timeout: config.connect_timeout(),
            state: ConnectionState::new(None),
            socket: None,
            connecting: None,
            reconnect_at: None,
            history: MessageHistory::new(capacity),
            commands,
            state_tx,
            messages_tx: messages_tx.clone(),
            events_tx: events_tx.clone(),
        };
        tokio::spawn(manager.run(token));

        ConnectionHandle {
            commands: commands_tx,
            state: state_rx,
            messages: messages_tx,
            events: events_tx,
        }
    }

    async fn run(mut self, token: Option<SessionToken>) {
        if token.is_some() {
            self.dispatch(Event::TokenChanged { token }).await;
        }

        loop {
            let event = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::SetToken(token)) => Event::TokenChanged { token },
                    Some(Command::Send(message)) => Event::SendRequested { message },
                    Some(Command::History(reply)) => {
                        let _ = reply.send(self.history.to_vec());
                        continue;
                    }
                    Some(Command::ClearHistory) => {
                        self.history.clear();
                        continue;
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.dispatch(Event::Shutdown).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.dispatch(Event::Shutdown).await;
                        break;
                    }
                },
                result = connect_result(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(connection) => {
                            self.socket = Some(connection);
                            Event::Opened
                        }
                        Err(e) => Event::ConnectFailed { error: e.to_string() },
                    }
                },
                frame = next_frame(&mut self.socket) => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        tracing::debug!(len = text.len(), "frame received");
                        Event::MessageReceived { message: Message::decode(&text) }
                    }
                    Some(Ok(Frame::Close { code, reason })) => {
                        self.socket = None;
                        Event::Closed { code, reason }
                    }
                    Some(Err(e)) => {
                        self.socket = None;
                        Event::Closed { code: None, reason: e.to_string() }
                    }
                    None => {
                        self.socket = None;
                        Event::Closed { code: None, reason: "connection ended".into() }
                    }
                },
                () = reconnect_timer(self.reconnect_at) => {
                    self.reconnect_at = None;
                    Event::ReconnectTimer
                },
            };
            self.dispatch(event).await;
        }

        tracing::debug!("connection manager stopped");
    }

    /// The single entry point for every event.
    async fn dispatch(&mut self, event: Event) {
        let state = std::mem::replace(&mut self.state, ConnectionState::ShutDown);
        let (next, actions) = state.on_event(event, &self.policy);
        self.state = next;

        for action in actions {
            self.execute(action).await;
        }

        let current = &self.state;
        self.state_tx.send_if_modified(|published| {
            if published != current {
                *published = current.clone();
                true
            } else {
                false
            }
        });
    }

    async fn execute(&mut self, action: Action) {
        match action {
            Action::Connect { token } => self.start_connect(&token),
            Action::SendHello => {
                let hello = Message::hello(&self.identity.device_name);
                self.send_frame(hello).await;
            }
            Action::Send { message } => self.send_frame(message).await,
            Action::Close { code, reason } => {
                if let Some(task) = self.connecting.take() {
                    tracing::debug!("abandoning in-flight connect");
                    task.abort();
                }
                if let Some(mut socket) = self.socket.take() {
                    if let Err(e) = socket.close(code, &reason).await {
                        tracing::debug!("close failed: {}", e);
                    }
                }
            }
            Action::StartReconnectTimer { delay } => {
                self.reconnect_at = Some(Instant::now() + delay);
            }
            Action::CancelReconnect => self.reconnect_at = None,
            Action::Record { message } => match self.history.record(message.clone()) {
                Recorded::Stored => {
                    let _ = self.messages_tx.send(message);
                }
                Recorded::Duplicate => {
                    tracing::debug!(id = ?message.id(), "duplicate frame discarded");
                }
            },
            Action::EmitEvent(event) => {
                log_event(&event);
                let _ = self.events_tx.send(event);
            }
        }
    }

    fn start_connect(&mut self, token: &SessionToken) {
        if let Some(stale) = self.connecting.take() {
            stale.abort();
        }

        let url = self
            .config
            .websocket_url(token)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()));
        let transport = Arc::clone(&self.transport);
        let timeout = self.connect_timeout;

        tracing::info!(server = %self.config.server.url, "connecting");
        self.connecting = Some(tokio::spawn(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => return Err(e),
            };
            tokio::time::timeout(timeout, transport.connect(&url))
                .await
                .unwrap_or(Err(TransportError::Timeout))
        }));
    }

    async fn send_frame(&mut self, message: Message) {
        let Some(socket) = self.socket.as_mut() else {
            tracing::warn!(kind = message.kind(), "no socket; frame dropped");
            return;
        };
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(kind = message.kind(), "failed to encode frame: {}", e);
                return;
            }
        };
        if let Err(e) = socket.send(text).await {
            tracing::warn!(kind = message.kind(), "send failed: {}", e);
        }
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connected => tracing::info!("connected"),
        SessionEvent::Disconnected {
            code,
            reason,
            reconnecting,
        } => tracing::info!(?code, reconnecting, "disconnected: {}", reason),
        SessionEvent::ReconnectScheduled { attempt, delay } => {
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled")
        }
        SessionEvent::ReconnectGaveUp { attempts } => {
            tracing::warn!(attempts, "reconnect attempts exhausted")
        }
        SessionEvent::SendDropped { kind } => {
            tracing::warn!(kind = %kind, "connection not open; outbound frame dropped")
        }
    }
}

async fn connect_result<C>(pending: &mut Option<ConnectTask<C>>) -> Result<C, TransportError> {
    match pending {
        Some(task) => match task.await {
            Ok(result) => result,
            Err(e) => Err(TransportError::ConnectionFailed(e.to_string())),
        },
        None => std::future::pending().await,
    }
}

async fn next_frame<C: Connection>(
    socket: &mut Option<C>,
) -> Option<Result<Frame, TransportError>> {
    match socket {
        Some(connection) => connection.recv().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectOutcome, MockTransport};
    use easysync_core::{BANNER_CONNECTED, BANNER_DISCONNECTED, NORMAL_CLOSURE};
    use easysync_types::DeviceId;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            device_id: DeviceId::from_string("device_1_test"),
            device_name: "Desktop Browser".into(),
        }
    }

    fn token(s: &str) -> SessionToken {
        SessionToken::new(s).unwrap()
    }

    fn spawn(transport: &MockTransport, token: Option<SessionToken>) -> ConnectionHandle {
        spawn_with(ClientConfig::default(), transport, token)
    }

    fn spawn_with(
        config: ClientConfig,
        transport: &MockTransport,
        token: Option<SessionToken>,
    ) -> ConnectionHandle {
        ConnectionManager::spawn(&config, transport.clone(), identity(), token)
    }

    /// Let the manager drain everything that is ready.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn texts(history: &[Message]) -> Vec<String> {
        history
            .iter()
            .map(|m| match m {
                Message::Chat(c) => c.text.clone(),
                Message::System(s) => s.text.clone(),
                Message::Text(t) => t.text.clone(),
                other => other.kind().to_owned(),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn no_token_no_connect() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(handle.state(), ConnectionState::Disconnected { token: None });
    }

    #[tokio::test(start_paused = true)]
    async fn open_sends_hello_and_records_banner() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));

        let peer = transport.accept().await;
        assert_eq!(peer.url().query(), Some("token=tok"));
        assert_eq!(peer.url().path(), "/ws");

        let sent = peer.wait_for_sent(1).await;
        let hello: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(hello["type"], "hello");
        assert_eq!(hello["device"], "Desktop Browser");
        assert_eq!(
            hello["capabilities"],
            serde_json::json!(["upload", "download", "chat"])
        );

        settle().await;
        assert!(handle.state().is_open());
        assert_eq!(texts(&handle.history().await), vec![BANNER_CONNECTED]);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn token_arriving_later_connects_once() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, None);
        settle().await;
        assert_eq!(transport.connect_count(), 0);

        handle.set_token(Some(token("late")));
        let _peer = transport.accept().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_chat_stored_once() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;

        let frame = r#"{"type":"chat","id":"m1","text":"hello","timestamp":1000}"#;
        peer.push_text(frame);
        peer.push_text(frame);
        settle().await;

        let history = handle.history().await;
        let hellos = texts(&history).iter().filter(|t| *t == "hello").count();
        assert_eq!(hellos, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_json_frame_becomes_text() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        let mut stored = handle.subscribe();

        peer.push_text("plain words");
        let mut found = false;
        while let Ok(message) = stored.recv().await {
            if matches!(&message, Message::Text(t) if t.text == "plain words") {
                found = true;
                break;
            }
        }
        assert!(found);
        assert!(handle.state().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_reconnects_once_after_delay() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        let closed_at = Instant::now();
        peer.close(Some(1006), "abnormal");
        let _second = transport.accept().await;
        let elapsed = closed_at.elapsed();

        assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.connect_count(), 2);
        let urls = transport.urls();
        assert_eq!(urls[0], urls[1]);
        assert_eq!(urls[1].query(), Some("token=tok"));

        let history = texts(&handle.history().await);
        assert_eq!(
            history,
            vec![BANNER_CONNECTED, BANNER_DISCONNECTED, BANNER_CONNECTED]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_counts_as_abnormal() {
        let transport = MockTransport::new();
        let _handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        peer.fail("connection reset");
        let _second = transport.accept().await;
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn normal_close_does_not_reconnect() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        peer.close(Some(NORMAL_CLOSURE), "server going away cleanly");
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.connect_count(), 1);
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                token: Some(token("tok"))
            }
        );
        assert_eq!(
            texts(&handle.history().await)[0],
            BANNER_DISCONNECTED.to_owned()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connects_retry_at_fixed_delay() {
        let transport = MockTransport::new();
        transport.fail_next_connect("refused");
        transport.fail_next_connect("refused");
        let start = Instant::now();
        let _handle = spawn(&transport, Some(token("tok")));

        let _peer = transport.accept().await;
        assert_eq!(transport.connect_count(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(6000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(6100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let transport = MockTransport::new();
        transport.push_outcome(ConnectOutcome::Hang);
        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 500;
        let start = Instant::now();
        let _handle = spawn_with(config, &transport, Some(token("tok")));

        let _peer = transport.accept().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(3500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3600), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn capped_reconnects_give_up() {
        let transport = MockTransport::new();
        for _ in 0..5 {
            transport.fail_next_connect("refused");
        }
        let mut config = ClientConfig::default();
        config.connection.max_reconnect_attempts = 2;
        let handle = spawn_with(config, &transport, Some(token("tok")));
        let mut events = handle.events();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 3);
        assert_eq!(
            handle.state(),
            ConnectionState::Disconnected {
                token: Some(token("tok"))
            }
        );

        let mut gave_up = false;
        while let Ok(event) = events.try_recv() {
            if event == (SessionEvent::ReconnectGaveUp { attempts: 2 }) {
                gave_up = true;
            }
        }
        assert!(gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn send_reaches_peer_only_when_open() {
        let transport = MockTransport::new();
        transport.push_outcome(ConnectOutcome::Hang);
        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 60_000;
        let handle = spawn_with(config, &transport, Some(token("tok")));
        let mut events = handle.events();
        settle().await;

        // Still connecting: dropped
        handle.send(Message::chat("early", "Desktop Browser", 1));
        settle().await;
        assert_eq!(
            events.try_recv().ok(),
            Some(SessionEvent::SendDropped {
                kind: "chat".into()
            })
        );

        let peer = transport.accept().await;
        peer.wait_for_sent(1).await;
        handle.send(Message::chat("late", "Desktop Browser", 2));
        let sent = peer.wait_for_sent(2).await;
        assert!(sent[1].contains("\"late\""));
        assert!(sent.iter().all(|s| !s.contains("\"early\"")));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_normally_and_stops_reconnects() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        handle.shutdown().await;
        assert_eq!(peer.closed_with().map(|(code, _)| code), Some(NORMAL_CLOSURE));
        assert!(handle.state().is_shut_down());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        peer.close(Some(1011), "server error");
        settle().await;
        assert!(matches!(
            handle.state(),
            ConnectionState::ReconnectPending { .. }
        ));

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_in_flight_connect() {
        let transport = MockTransport::new();
        transport.push_outcome(ConnectOutcome::Hang);
        let handle = spawn(&transport, Some(token("tok")));
        settle().await;
        assert_eq!(transport.connect_count(), 1);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
        assert!(handle.state().is_shut_down());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_tears_down() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        drop(handle);
        let (code, _) = peer.wait_for_close().await;
        assert_eq!(code, NORMAL_CLOSURE);
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_token_closes_without_reconnect() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;
        settle().await;

        handle.set_token(None);
        let (code, _) = peer.wait_for_close().await;
        assert_eq!(code, NORMAL_CLOSURE);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(handle.state(), ConnectionState::Disconnected { token: None });
    }

    #[tokio::test(start_paused = true)]
    async fn clear_history_keeps_dedup() {
        let transport = MockTransport::new();
        let handle = spawn(&transport, Some(token("tok")));
        let peer = transport.accept().await;

        let frame = r#"{"type":"chat","id":"m1","text":"hello","timestamp":1000}"#;
        peer.push_text(frame);
        settle().await;
        handle.clear_history();
        peer.push_text(frame);
        settle().await;

        assert!(handle.history().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn history_bounded_by_config() {
        let transport = MockTransport::new();
        let mut config = ClientConfig::default();
        config.history.limit = 10;
        let handle = spawn_with(config, &transport, Some(token("tok")));
        let peer = transport.accept().await;

        for i in 0..50 {
            peer.push_text(&format!(
                r#"{{"type":"chat","id":"m{i}","text":"msg {i}","timestamp":{i}}}"#
            ));
        }
        settle().await;

        let history = handle.history().await;
        assert_eq!(history.len(), 10);
        assert_eq!(texts(&history)[0], "msg 49");
    }
}
