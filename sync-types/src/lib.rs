//! # sync-types
//!
//! Wire format types for the easy-sync real-time message protocol.
//!
//! This crate provides the foundational types used across all easy-sync crates:
//! - [`SessionToken`], [`DeviceId`], [`MessageId`] - Credential and identity types
//! - [`Message`] - Protocol frames (hello, chat, system, presence, text, other)
//! - [`SyncError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::SyncError;
pub use ids::{DeviceId, MessageId, SessionToken};
pub use messages::{Chat, Hello, Message, Presence, System, Text, CAPABILITIES};
