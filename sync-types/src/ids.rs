//! Credential and identity types for easy-sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::SyncError;

/// Bearer credential authenticating the persistent connection.
///
/// Obtained from the pairing endpoint and opaque to the client.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a token string, rejecting blank input.
    pub fn new(token: impl Into<String>) -> Result<Self, SyncError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SyncError::InvalidData("session token is empty".into()));
        }
        Ok(Self(token))
    }

    /// Get the raw token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Intentionally opaque debug to avoid logging credentials
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken([REDACTED])")
    }
}

/// A client-generated identifier for this install.
///
/// Formatted as `device_<unix-ms>_<random>`; the random part is a UUID v4.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a new random DeviceId stamped with the given time.
    pub fn generate(unix_ms: u64) -> Self {
        Self(format!("device_{}_{}", unix_ms, Uuid::new_v4().simple()))
    }

    /// Wrap an existing identifier (e.g. one loaded from storage).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

/// Identifier carried by chat, system and presence frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new random MessageId (UUID v4).
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
