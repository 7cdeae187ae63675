//! Presentation mapping for easy-sync.
//!
//! Turns stored frames into what a chat view shows and maps connection
//! state onto the four-way status indicator. Handshake, presence and unknown
//! frames are kept in history but never rendered.

use easysync_types::Message;

use crate::state::ConnectionState;

/// A renderable chat view entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMessage {
    /// Chat line sent from this device.
    Own {
        /// Message body.
        text: String,
        /// Unix timestamp (seconds).
        timestamp: i64,
    },
    /// Chat line from another device.
    Remote {
        /// Sender name, if the server stamped one.
        from: Option<String>,
        /// Message body.
        text: String,
        /// Unix timestamp (seconds).
        timestamp: i64,
    },
    /// Centered status banner.
    Banner {
        /// Banner text.
        text: String,
    },
    /// Free text that did not parse as a known frame.
    Plain {
        /// The text.
        text: String,
    },
}

/// Render one frame for the local device.
///
/// A chat line counts as our own iff its `from` equals `local_device_name`.
/// Two devices sharing a name are indistinguishable.
pub fn render(message: &Message, local_device_name: &str) -> Option<RenderedMessage> {
    match message {
        Message::Chat(chat) => {
            if chat.from.as_deref() == Some(local_device_name) {
                Some(RenderedMessage::Own {
                    text: chat.text.clone(),
                    timestamp: chat.timestamp,
                })
            } else {
                Some(RenderedMessage::Remote {
                    from: chat.from.clone(),
                    text: chat.text.clone(),
                    timestamp: chat.timestamp,
                })
            }
        }
        Message::System(system) => Some(RenderedMessage::Banner {
            text: system.text.clone(),
        }),
        Message::Text(text) => Some(RenderedMessage::Plain {
            text: text.text.clone(),
        }),
        Message::Hello(_) | Message::Presence(_) | Message::Other { .. } => None,
    }
}

/// Render a history slice, keeping its order.
pub fn render_history<'a, I>(messages: I, local_device_name: &str) -> Vec<RenderedMessage>
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .filter_map(|m| render(m, local_device_name))
        .collect()
}

/// Four-way connection status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Pairing or a connection attempt is in flight.
    Connecting,
    /// Connection open.
    Connected,
    /// Paired but not connected, including the wait before a reconnect.
    Disconnected,
    /// No credential.
    NotPaired,
}

impl ConnectionStatus {
    /// Derive the indicator from connection state and pairing activity.
    ///
    /// `ShutDown` holds no token and maps to `NotPaired`.
    pub fn from_state(state: &ConnectionState, pairing_in_progress: bool) -> Self {
        if pairing_in_progress {
            return Self::Connecting;
        }
        match state {
            ConnectionState::Open { .. } => Self::Connected,
            ConnectionState::Connecting { .. } => Self::Connecting,
            ConnectionState::Disconnected { token: Some(_) }
            | ConnectionState::ReconnectPending { .. } => Self::Disconnected,
            ConnectionState::Disconnected { token: None } | ConnectionState::ShutDown => {
                Self::NotPaired
            }
        }
    }

    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::NotPaired => "not paired",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
