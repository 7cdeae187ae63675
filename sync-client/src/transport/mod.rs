//! Transport abstraction for easy-sync.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `Transport::connect()` opens a connection to a URL
//! - `Connection::send()` transmits one text frame
//! - `Connection::recv()` yields text frames and the closing frame
//! - `Connection::close()` initiates a close handshake
//!
//! # Example
//!
//! ```ignore
//! let transport = WebSocketTransport::new();
//! let mut conn = transport.connect(&url).await?;
//! conn.send(r#"{"type":"hello"}"#.into()).await?;
//! while let Some(frame) = conn.recv().await { ... }
//! ```

mod mock;
mod websocket;

pub use mock::{ConnectOutcome, MockConnection, MockPeer, MockTransport};
pub use websocket::{WebSocketConnection, WebSocketTransport};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,
}

/// A frame delivered by [`Connection::recv`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload.
    Text(String),
    /// The peer closed the connection.
    Close {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// Opens connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced.
    type Connection: Connection;

    /// Open a connection to the given URL.
    async fn connect(&self, url: &Url) -> Result<Self::Connection, TransportError>;
}

/// One open, bidirectional text connection.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Returns `None` when the stream ends without a close frame.
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Start a close handshake with the given code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}
