//! # sync-client
//!
//! Client library for the easy-sync LAN sync server.
//!
//! This is the main library that applications use to pair with a server and
//! keep a live chat session open.
//!
//! ## Features
//!
//! - **Pairing Bootstrap**: one automatic pairing attempt per lifetime, plus manual retry
//! - **Self-Healing Connection**: fixed-delay reconnect after any abnormal close
//! - **Bounded History**: newest-first, deduplicated by message id
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use easysync_client::{ClientConfig, SyncClient};
//!
//! let client = SyncClient::open(ClientConfig::default(), &data_dir)?;
//! client.auto_pair().await?;
//!
//! let mut incoming = client.subscribe();
//! client.send_chat("hello from the laptop");
//! while let Ok(message) = incoming.recv().await {
//!     println!("{:?}", message);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod pairing;
pub mod transport;

pub use client::{ClientError, SyncClient};
pub use config::{ClientConfig, ConfigError};
pub use connection::{ConnectionHandle, ConnectionManager};
pub use credentials::{
    CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use pairing::{
    AutoPairOutcome, HttpPairingApi, MockPairingApi, PairingApi, PairingBootstrapper,
    PairingError,
};
pub use transport::{
    Connection, Frame, MockTransport, Transport, TransportError, WebSocketTransport,
};
