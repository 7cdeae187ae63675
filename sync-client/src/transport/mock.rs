//! Mock transport for testing.
//!
//! Connect outcomes are scripted in order; every accepted connection hands a
//! [`MockPeer`] to the test, which plays the server side: pushing frames,
//! closing, and inspecting what the client sent.

use super::{Connection, Frame, Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, Notify};
use url::Url;

/// What the next `connect()` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Open a connection and hand a peer to the test.
    Accept,
    /// Fail with the given error text.
    Fail(String),
    /// Never complete.
    Hang,
}

/// Mock transport for testing.
///
/// Unscripted connects are accepted.
#[derive(Debug, Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    peer_ready: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    script: VecDeque<ConnectOutcome>,
    urls: Vec<Url>,
    peers: VecDeque<MockPeer>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of a future `connect()` call.
    pub fn push_outcome(&self, outcome: ConnectOutcome) {
        lock(&self.inner).script.push_back(outcome);
    }

    /// Cause the next scripted connect to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.push_outcome(ConnectOutcome::Fail(error.to_string()));
    }

    /// Number of `connect()` calls so far.
    pub fn connect_count(&self) -> usize {
        lock(&self.inner).urls.len()
    }

    /// URLs passed to `connect()`, in order.
    pub fn urls(&self) -> Vec<Url> {
        lock(&self.inner).urls.clone()
    }

    /// Wait for the next accepted connection.
    pub async fn accept(&self) -> MockPeer {
        loop {
            if let Some(peer) = lock(&self.inner).peers.pop_front() {
                return peer;
            }
            self.peer_ready.notified().await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn connect(&self, url: &Url) -> Result<MockConnection, TransportError> {
        let outcome = {
            let mut inner = lock(&self.inner);
            inner.urls.push(url.clone());
            inner.script.pop_front().unwrap_or(ConnectOutcome::Accept)
        };

        match outcome {
            ConnectOutcome::Accept => {
                let (peer, connection) = MockPeer::pair(url.clone());
                lock(&self.inner).peers.push_back(peer);
                self.peer_ready.notify_one();
                Ok(connection)
            }
            ConnectOutcome::Fail(error) => Err(TransportError::ConnectionFailed(error)),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug, Default)]
struct PeerShared {
    sent: Vec<String>,
    closed: Option<(u16, String)>,
}

/// Server side of one mock connection.
#[derive(Debug)]
pub struct MockPeer {
    url: Url,
    tx: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    shared: Arc<Mutex<PeerShared>>,
    activity: Arc<Notify>,
}

impl MockPeer {
    fn pair(url: Url) -> (Self, MockConnection) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(PeerShared::default()));
        let activity = Arc::new(Notify::new());
        let peer = Self {
            url,
            tx,
            shared: Arc::clone(&shared),
            activity: Arc::clone(&activity),
        };
        let connection = MockConnection {
            incoming: rx,
            shared,
            activity,
        };
        (peer, connection)
    }

    /// The URL the client connected to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver a text frame to the client.
    pub fn push_text(&self, text: &str) {
        let _ = self.tx.send(Ok(Frame::Text(text.to_owned())));
    }

    /// Close the connection from the server side.
    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.tx.send(Ok(Frame::Close {
            code,
            reason: reason.to_owned(),
        }));
    }

    /// Fail the client's next receive.
    pub fn fail(&self, error: &str) {
        let _ = self
            .tx
            .send(Err(TransportError::ReceiveFailed(error.to_owned())));
    }

    /// Frames the client has sent so far.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.shared).sent.clone()
    }

    /// Close code and reason the client closed with, if it did.
    pub fn closed_with(&self) -> Option<(u16, String)> {
        lock(&self.shared).closed.clone()
    }

    /// Wait until the client has sent at least `count` frames.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<String> {
        loop {
            let notified = self.activity.notified();
            {
                let shared = lock(&self.shared);
                if shared.sent.len() >= count {
                    return shared.sent.clone();
                }
            }
            notified.await;
        }
    }

    /// Wait until the client closes the connection.
    pub async fn wait_for_close(&self) -> (u16, String) {
        loop {
            let notified = self.activity.notified();
            if let Some(closed) = self.closed_with() {
                return closed;
            }
            notified.await;
        }
    }
}

/// Client side of one mock connection.
#[derive(Debug)]
pub struct MockConnection {
    incoming: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    shared: Arc<Mutex<PeerShared>>,
    activity: Arc<Notify>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        {
            let mut shared = lock(&self.shared);
            if shared.closed.is_some() {
                return Err(TransportError::ConnectionClosed);
            }
            shared.sent.push(text);
        }
        self.activity.notify_waiters();
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.incoming.recv().await
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        lock(&self.shared).closed = Some((code, reason.to_owned()));
        self.activity.notify_waiters();
        Ok(())
    }
}
