//! SyncClient - the main interface for easy-sync.
//!
//! This module provides [`SyncClient`], the one context object an
//! application constructs at startup and passes to whatever presents the
//! session. It ties the credential store, the pairing bootstrapper and the
//! connection manager together.
//!
//! # Architecture
//!
//! ```text
//! Application → SyncClient → PairingBootstrapper → PairingApi → HTTP
//!                   │
//!                   └──────→ ConnectionHandle → ConnectionManager → Transport
//!                                                      ↓
//!                                         sync-core (pure state machine)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use easysync_client::{ClientConfig, SyncClient};
//!
//! let client = SyncClient::open(ClientConfig::default(), &data_dir)?;
//! client.auto_pair().await?;
//! client.send_chat("hello");
//! client.shutdown().await;
//! ```

use easysync_core::{
    render_history, ConnectionState, ConnectionStatus, DeviceClassifier, DeviceIdentity,
    OsClassifier, RenderedMessage, SessionEvent,
};
use easysync_types::{Message, SessionToken};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{ClientConfig, ConfigError};
use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::credentials::{CredentialError, CredentialStore, FileCredentialStore};
use crate::pairing::{AutoPairOutcome, HttpPairingApi, PairingApi, PairingBootstrapper, PairingError};
use crate::transport::{Transport, WebSocketTransport};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Credential store error.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Pairing error.
    #[error("pairing failed: {0}")]
    Pairing(#[from] PairingError),
}

/// Session context: credentials, pairing and the live connection.
pub struct SyncClient<A: PairingApi = HttpPairingApi> {
    config: ClientConfig,
    store: Arc<dyn CredentialStore>,
    pairing: PairingBootstrapper<A>,
    identity: DeviceIdentity,
    connection: ConnectionHandle,
}

impl SyncClient<HttpPairingApi> {
    /// Open a client with file-backed credentials in `data_dir`, HTTP
    /// pairing and the WebSocket transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: ClientConfig, data_dir: &Path) -> Result<Self, ClientError> {
        let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::open(data_dir)?);
        let api = HttpPairingApi::new(&config)?;
        Self::start(
            config,
            store,
            WebSocketTransport::new(),
            api,
            Box::new(OsClassifier::default()),
        )
    }
}

impl<A: PairingApi> SyncClient<A> {
    /// Start a client from its parts.
    ///
    /// Resolves (or generates and persists) the device identity and starts
    /// the connection manager, which connects at once if a token is stored.
    pub fn start<T: Transport>(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        transport: T,
        api: A,
        classifier: Box<dyn DeviceClassifier>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let pairing = PairingBootstrapper::new(api, Arc::clone(&store), classifier);
        let identity = pairing.identity()?;
        let connection =
            ConnectionManager::spawn(&config, transport, identity.clone(), store.get());

        tracing::info!(
            device_id = %identity.device_id,
            device_name = %identity.device_name,
            paired = store.get().is_some(),
            "client started"
        );

        Ok(Self {
            config,
            store,
            pairing,
            identity,
            connection,
        })
    }

    /// Run automatic pairing (at most once) and connect on success.
    pub async fn auto_pair(&self) -> Result<AutoPairOutcome, ClientError> {
        let outcome = self.pairing.attempt_auto_pair().await?;
        if let AutoPairOutcome::Paired(token) = &outcome {
            self.connection.set_token(Some(token.clone()));
        }
        Ok(outcome)
    }

    /// Pair with a user-supplied code and connect on success.
    pub async fn pair_manually(&self, code: &str) -> Result<SessionToken, ClientError> {
        let token = self.pairing.pair_manually(code).await?;
        self.connection.set_token(Some(token.clone()));
        Ok(token)
    }

    /// Forget the session token and close the connection.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.store.clear()?;
        self.connection.set_token(None);
        tracing::info!("logged out");
        Ok(())
    }

    /// Send a chat line attributed to this device. Blank text is ignored.
    pub fn send_chat(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.connection
            .send(Message::chat(text, &self.identity.device_name, timestamp));
    }

    /// The four-way status indicator.
    ///
    /// After shutdown the stored token decides between disconnected and
    /// not paired.
    pub fn status(&self) -> ConnectionStatus {
        match self.connection.state() {
            ConnectionState::ShutDown if self.is_paired() => ConnectionStatus::Disconnected,
            state => ConnectionStatus::from_state(&state, self.pairing.is_in_progress()),
        }
    }

    /// Whether a session token is stored.
    pub fn is_paired(&self) -> bool {
        self.store.get().is_some()
    }

    /// The stored session token, for authenticated collaborator requests.
    pub fn token(&self) -> Option<SessionToken> {
        self.store.get()
    }

    /// This device's identity.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The configuration the client runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stored frames, newest first.
    pub async fn history(&self) -> Vec<Message> {
        self.connection.history().await
    }

    /// Stored frames as the chat view shows them, newest first.
    pub async fn rendered_history(&self) -> Vec<RenderedMessage> {
        render_history(&self.history().await, &self.identity.device_name)
    }

    /// Empty the visible history.
    pub fn clear_history(&self) {
        self.connection.clear_history();
    }

    /// Receive every frame newly stored in history.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.connection.subscribe()
    }

    /// Receive connection lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.connection.events()
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Tear the session down: no reconnects happen afterwards.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }
}
