//! # sync-core
//!
//! Pure logic for the easy-sync client (no I/O, instant tests).
//!
//! This crate implements the state machines and algorithms for the client
//! session without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic transitions (same state + event → same actions)
//! - Easy reasoning about reconnection and teardown
//!
//! The actual I/O (sockets, timers, HTTP, disk) is performed by `sync-client`,
//! which interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod history;
pub mod pairing;
pub mod state;
pub mod view;

pub use history::{MessageHistory, Recorded, DEFAULT_HISTORY_LIMIT};
pub use pairing::{
    CodeError, DeviceClassifier, DeviceIdentity, DeviceKind, GuardDecision, OsClassifier,
    PairingCode, PairingGuard, UserAgentClassifier, DESKTOP_DEVICE_NAME, MOBILE_DEVICE_NAME,
};
pub use state::{
    Action, ConnectionState, Event, ReconnectPolicy, SessionEvent, BANNER_CONNECTED,
    BANNER_DISCONNECTED, DEFAULT_RECONNECT_DELAY, NORMAL_CLOSURE,
};
pub use view::{render, render_history, ConnectionStatus, RenderedMessage};
