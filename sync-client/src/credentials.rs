//! Credential storage for easy-sync.
//!
//! Holds the session token and the device identity. Access is synchronous:
//! the store never touches the network and never suspends.
//!
//! [`FileCredentialStore`] keeps one JSON document, `credentials.json`, with
//! the distinct keys `session_token`, `device_id` and `device_name`.

use easysync_core::DeviceIdentity;
use easysync_types::{DeviceId, SessionToken};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// File name used inside the data directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Largest credentials file accepted on open.
pub const MAX_CREDENTIALS_SIZE: u64 = 64 * 1024;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Failed to read the credentials file.
    #[error("failed to read credentials {path}: {source}")]
    Read {
        /// Path to the credentials file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to write the credentials file.
    #[error("failed to write credentials {path}: {source}")]
    Write {
        /// Path to the credentials file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The credentials file is not valid JSON.
    #[error("malformed credentials {path}: {source}")]
    Parse {
        /// Path to the credentials file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// The credentials file exceeds [`MAX_CREDENTIALS_SIZE`].
    #[error("credentials file {path} is too large ({size} bytes)")]
    TooLarge {
        /// Path to the credentials file.
        path: PathBuf,
        /// Size on disk.
        size: u64,
    },
}

/// Persistent storage for the session token and device identity.
pub trait CredentialStore: Send + Sync {
    /// The stored session token, if paired.
    fn get(&self) -> Option<SessionToken>;

    /// Persist a session token.
    fn set(&self, token: &SessionToken) -> Result<(), CredentialError>;

    /// Remove the session token. The device identity is kept.
    fn clear(&self) -> Result<(), CredentialError>;

    /// The stored device identity, if one was ever saved.
    fn identity(&self) -> Option<DeviceIdentity>;

    /// Persist the device identity.
    fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), CredentialError>;
}

/// On-disk document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_name: Option<String>,
}

impl StoredCredentials {
    fn token(&self) -> Option<SessionToken> {
        self.session_token
            .as_deref()
            .and_then(|t| SessionToken::new(t).ok())
    }

    fn identity(&self) -> Option<DeviceIdentity> {
        match (&self.device_id, &self.device_name) {
            (Some(id), Some(name)) => Some(DeviceIdentity {
                device_id: DeviceId::from_string(id.clone()),
                device_name: name.clone(),
            }),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Credential store backed by `credentials.json` in a data directory.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<StoredCredentials>,
}

impl FileCredentialStore {
    /// Open the store in `data_dir`, loading any existing document.
    ///
    /// A missing file means no credentials.
    pub fn open(data_dir: &Path) -> Result<Self, CredentialError> {
        let path = data_dir.join(CREDENTIALS_FILE);
        let state = match std::fs::metadata(&path) {
            Ok(meta) => {
                if meta.len() > MAX_CREDENTIALS_SIZE {
                    return Err(CredentialError::TooLarge {
                        path,
                        size: meta.len(),
                    });
                }
                let contents =
                    std::fs::read_to_string(&path).map_err(|e| CredentialError::Read {
                        path: path.clone(),
                        source: e,
                    })?;
                serde_json::from_str(&contents).map_err(|e| CredentialError::Parse {
                    path: path.clone(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredCredentials::default(),
            Err(e) => return Err(CredentialError::Read { path, source: e }),
        };
        debug!(path = %path.display(), "credential store opened");
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut StoredCredentials)) -> Result<(), CredentialError> {
        let mut state = lock(&self.state);
        let mut next = state.clone();
        f(&mut next);
        write_atomically(&self.path, &next)?;
        *state = next;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<SessionToken> {
        lock(&self.state).token()
    }

    fn set(&self, token: &SessionToken) -> Result<(), CredentialError> {
        self.update(|s| s.session_token = Some(token.as_str().to_owned()))
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.update(|s| s.session_token = None)
    }

    fn identity(&self) -> Option<DeviceIdentity> {
        lock(&self.state).identity()
    }

    fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), CredentialError> {
        self.update(|s| {
            s.device_id = Some(identity.device_id.as_str().to_owned());
            s.device_name = Some(identity.device_name.clone());
        })
    }
}

/// Write to a sibling temp file, restrict it to the owner, then rename.
fn write_atomically(path: &Path, stored: &StoredCredentials) -> Result<(), CredentialError> {
    let write_err = |e: std::io::Error| CredentialError::Write {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let contents = serde_json::to_string_pretty(stored)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(write_err)?;
    set_file_permissions_0600(&tmp).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
fn set_file_permissions_0600(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<StoredCredentials>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a token.
    pub fn with_token(token: SessionToken) -> Self {
        Self {
            state: Mutex::new(StoredCredentials {
                session_token: Some(token.as_str().to_owned()),
                ..StoredCredentials::default()
            }),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<SessionToken> {
        lock(&self.state).token()
    }

    fn set(&self, token: &SessionToken) -> Result<(), CredentialError> {
        lock(&self.state).session_token = Some(token.as_str().to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        lock(&self.state).session_token = None;
        Ok(())
    }

    fn identity(&self) -> Option<DeviceIdentity> {
        lock(&self.state).identity()
    }

    fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), CredentialError> {
        let mut state = lock(&self.state);
        state.device_id = Some(identity.device_id.as_str().to_owned());
        state.device_name = Some(identity.device_name.clone());
        Ok(())
    }
}
