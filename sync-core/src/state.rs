//! Connection state machine for easy-sync.
//!
//! This module provides a pure, side-effect-free state machine for managing
//! the lifecycle of the persistent session connection. The state machine takes
//! events as input and produces a new state plus a list of actions to execute.
//!
//! The actual I/O (opening sockets, sending frames, arming timers) is
//! performed by sync-client, not by this module. This enables instant unit
//! testing without network mocks.
//!
//! Closure handling follows one rule: a close with code [`NORMAL_CLOSURE`] is
//! deliberate and ends the session, anything else (including a failed connect
//! attempt) schedules exactly one reconnect after the policy delay.

use easysync_types::{Message, SessionToken};
use std::time::Duration;

/// WebSocket close code for a deliberate, normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Delay between an abnormal closure and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Banner text appended when the connection opens.
pub const BANNER_CONNECTED: &str = "connected";

/// Banner text appended when the connection closes.
pub const BANNER_DISCONNECTED: &str = "disconnected";

/// Reconnection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before each reconnect.
    pub delay: Duration,
    /// Maximum consecutive reconnects; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Whether the given reconnect attempt (1-based) may be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

/// Connection state machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected {
        /// Credential available for the next connect, if any.
        token: Option<SessionToken>,
    },
    /// Connection attempt in flight.
    Connecting {
        /// Credential used for this attempt.
        token: SessionToken,
        /// Reconnect number of this attempt (0 for the first one).
        attempt: u32,
    },
    /// Connection open; frames may flow.
    Open {
        /// Credential the connection was opened with.
        token: SessionToken,
    },
    /// Closed abnormally, waiting for the reconnect timer.
    ReconnectPending {
        /// Credential to reconnect with.
        token: SessionToken,
        /// Reconnect number the timer will start.
        attempt: u32,
    },
    /// Torn down; no further activity.
    ShutDown,
}

impl ConnectionState {
    /// Create a new state machine in the Disconnected state.
    pub fn new(token: Option<SessionToken>) -> Self {
        Self::Disconnected { token }
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions in order.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // Teardown wins from every live state
            (Self::ShutDown, Event::SendRequested { message }) => {
                (Self::ShutDown, vec![dropped(&message)])
            }
            (Self::ShutDown, _) => (Self::ShutDown, vec![]),
            (Self::Disconnected { .. }, Event::Shutdown) => {
                (Self::ShutDown, vec![Action::CancelReconnect])
            }
            (Self::ReconnectPending { .. }, Event::Shutdown) => {
                (Self::ShutDown, vec![Action::CancelReconnect])
            }
            (Self::Connecting { .. } | Self::Open { .. }, Event::Shutdown) => (
                Self::ShutDown,
                vec![
                    Action::CancelReconnect,
                    Action::Close {
                        code: NORMAL_CLOSURE,
                        reason: "client shutting down".into(),
                    },
                ],
            ),

            // Token transitions
            (Self::Disconnected { .. }, Event::TokenChanged { token: Some(token) }) => (
                Self::Connecting {
                    token: token.clone(),
                    attempt: 0,
                },
                vec![Action::Connect { token }],
            ),
            (Self::Disconnected { .. }, Event::TokenChanged { token: None }) => {
                (Self::Disconnected { token: None }, vec![])
            }
            (Self::ReconnectPending { .. }, Event::TokenChanged { token }) => match token {
                Some(token) => (
                    Self::Connecting {
                        token: token.clone(),
                        attempt: 0,
                    },
                    vec![Action::CancelReconnect, Action::Connect { token }],
                ),
                None => (
                    Self::Disconnected { token: None },
                    vec![Action::CancelReconnect],
                ),
            },
            (Self::Connecting { .. }, Event::TokenChanged { token }) => match token {
                Some(token) => (
                    Self::Connecting {
                        token: token.clone(),
                        attempt: 0,
                    },
                    vec![close_normal("token replaced"), Action::Connect { token }],
                ),
                None => (
                    Self::Disconnected { token: None },
                    vec![close_normal("token cleared")],
                ),
            },
            (Self::Open { .. }, Event::TokenChanged { token }) => {
                let mut actions = vec![close_normal("token changed")];
                actions.extend(disconnected_notice(None, "token changed", false));
                match token {
                    Some(token) => {
                        actions.push(Action::Connect {
                            token: token.clone(),
                        });
                        (Self::Connecting { token, attempt: 0 }, actions)
                    }
                    None => (Self::Disconnected { token: None }, actions),
                }
            }

            // From Connecting
            (Self::Connecting { token, .. }, Event::Opened) => (
                Self::Open { token },
                vec![
                    Action::SendHello,
                    Action::Record {
                        message: Message::system(BANNER_CONNECTED),
                    },
                    Action::EmitEvent(SessionEvent::Connected),
                ],
            ),
            (Self::Connecting { token, attempt }, Event::ConnectFailed { error }) => {
                closed_abnormally(token, attempt.saturating_add(1), None, error, policy)
            }
            (Self::Connecting { token, attempt }, Event::Closed { code, reason }) => {
                if code == Some(NORMAL_CLOSURE) {
                    closed_normally(token, code, reason)
                } else {
                    closed_abnormally(token, attempt.saturating_add(1), code, reason, policy)
                }
            }

            // From Open
            (Self::Open { token }, Event::MessageReceived { message }) => {
                (Self::Open { token }, vec![Action::Record { message }])
            }
            (Self::Open { token }, Event::SendRequested { message }) => {
                (Self::Open { token }, vec![Action::Send { message }])
            }
            (Self::Open { token }, Event::Closed { code, reason }) => {
                if code == Some(NORMAL_CLOSURE) {
                    closed_normally(token, code, reason)
                } else {
                    closed_abnormally(token, 1, code, reason, policy)
                }
            }

            // From ReconnectPending
            (Self::ReconnectPending { token, attempt }, Event::ReconnectTimer) => (
                Self::Connecting {
                    token: token.clone(),
                    attempt,
                },
                vec![Action::Connect { token }],
            ),

            // Sending outside Open is a logged no-op
            (state, Event::SendRequested { message }) => (state, vec![dropped(&message)]),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// The credential currently held, if any.
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            Self::Disconnected { token } => token.as_ref(),
            Self::Connecting { token, .. }
            | Self::Open { token }
            | Self::ReconnectPending { token, .. } => Some(token),
            Self::ShutDown => None,
        }
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Check if an attempt is in flight or scheduled.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            Self::Connecting { .. } | Self::ReconnectPending { .. }
        )
    }

    /// Check if the machine has been torn down.
    pub fn is_shut_down(&self) -> bool {
        matches!(self, Self::ShutDown)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(None)
    }
}

fn close_normal(reason: &str) -> Action {
    Action::Close {
        code: NORMAL_CLOSURE,
        reason: reason.into(),
    }
}

fn dropped(message: &Message) -> Action {
    Action::EmitEvent(SessionEvent::SendDropped {
        kind: message.kind().to_owned(),
    })
}

fn disconnected_notice(code: Option<u16>, reason: &str, reconnecting: bool) -> [Action; 2] {
    [
        Action::Record {
            message: Message::system(BANNER_DISCONNECTED),
        },
        Action::EmitEvent(SessionEvent::Disconnected {
            code,
            reason: reason.to_owned(),
            reconnecting,
        }),
    ]
}

fn closed_normally(
    token: SessionToken,
    code: Option<u16>,
    reason: String,
) -> (ConnectionState, Vec<Action>) {
    (
        ConnectionState::Disconnected { token: Some(token) },
        disconnected_notice(code, &reason, false).into(),
    )
}

fn closed_abnormally(
    token: SessionToken,
    attempt: u32,
    code: Option<u16>,
    reason: String,
    policy: &ReconnectPolicy,
) -> (ConnectionState, Vec<Action>) {
    if !policy.allows(attempt) {
        let mut actions: Vec<Action> = disconnected_notice(code, &reason, false).into();
        actions.push(Action::EmitEvent(SessionEvent::ReconnectGaveUp {
            attempts: attempt.saturating_sub(1),
        }));
        return (ConnectionState::Disconnected { token: Some(token) }, actions);
    }

    let mut actions: Vec<Action> = disconnected_notice(code, &reason, true).into();
    actions.push(Action::StartReconnectTimer {
        delay: policy.delay,
    });
    actions.push(Action::EmitEvent(SessionEvent::ReconnectScheduled {
        attempt,
        delay: policy.delay,
    }));
    (ConnectionState::ReconnectPending { token, attempt }, actions)
}

/// Events that can occur in the connection lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The credential became present, changed, or was cleared.
    TokenChanged {
        /// The new credential.
        token: Option<SessionToken>,
    },
    /// Transport connection opened.
    Opened,
    /// Transport connection attempt failed before opening.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// Frame received on the open connection.
    MessageReceived {
        /// The decoded frame.
        message: Message,
    },
    /// Connection closed, by either side or by a transport error.
    Closed {
        /// Close code, if a close frame was received.
        code: Option<u16>,
        /// Close reason or error text.
        reason: String,
    },
    /// Application asked to send a frame.
    SendRequested {
        /// The frame to send.
        message: Message,
    },
    /// Reconnect timer fired.
    ReconnectTimer,
    /// Owner is tearing the session down.
    Shutdown,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a connection with this credential.
    Connect {
        /// Credential placed in the connection URL.
        token: SessionToken,
    },
    /// Send the `hello` handshake for the local device.
    SendHello,
    /// Send a frame on the open connection.
    Send {
        /// The frame.
        message: Message,
    },
    /// Close the open connection or abandon the in-flight attempt.
    Close {
        /// Close code to send.
        code: u16,
        /// Close reason to send.
        reason: String,
    },
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Offer a frame to the message history.
    Record {
        /// The frame.
        message: Message,
    },
    /// Emit an event to the application.
    EmitEvent(SessionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection opened.
    Connected,
    /// Connection closed.
    Disconnected {
        /// Close code, if any.
        code: Option<u16>,
        /// Close reason or error text.
        reason: String,
        /// Whether a reconnect was scheduled.
        reconnecting: bool,
    },
    /// Reconnect timer armed.
    ReconnectScheduled {
        /// Which reconnect this will be.
        attempt: u32,
        /// Delay before it starts.
        delay: Duration,
    },
    /// Reconnect cap reached; the session stays disconnected.
    ReconnectGaveUp {
        /// Reconnects made before giving up.
        attempts: u32,
    },
    /// A send was requested while the connection was not open.
    SendDropped {
        /// The `type` of the dropped frame.
        kind: String,
    },
}
