//! Configuration loading for the easy-sync client.
//!
//! Configuration is loaded from a TOML file (default: `easy-sync.toml` in the
//! data directory). Every field has a default, so an empty file is valid.

use easysync_core::{ReconnectPolicy, DEFAULT_HISTORY_LIMIT};
use easysync_types::SessionToken;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Root configuration for the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// History configuration.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the sync server (default: http://127.0.0.1:3280).
    #[serde(default = "default_server_url")]
    pub url: String,
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Delay before reconnecting after an abnormal close (default: 3000).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Consecutive reconnects before giving up; 0 retries forever (default: 0).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Time allowed for one connection attempt (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// History configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Bound for stored messages and remembered ids (default: 200).
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

// Default value functions
fn default_server_url() -> String {
    "http://127.0.0.1:3280".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server_url()?;
        if self.history.limit == 0 {
            return Err(ConfigError::Invalid("history.limit must be at least 1".into()));
        }
        if self.connection.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection.reconnect_delay_ms must be at least 1".into(),
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connection.connect_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The parsed server base URL.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.server.url)
            .map_err(|e| ConfigError::Invalid(format!("server.url {:?}: {}", self.server.url, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Invalid(format!(
                "server.url must use http or https, not {other}"
            ))),
        }
    }

    /// The live connection URL for a session token.
    ///
    /// `http` maps to `ws` and `https` to `wss`; the path is `/ws` and the
    /// token travels in the `token` query parameter.
    pub fn websocket_url(&self, token: &SessionToken) -> Result<Url, ConfigError> {
        let mut url = self.server_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ConfigError::Invalid(format!("cannot use scheme {scheme}")))?;
        url.set_path("/ws");
        url.set_query(None);
        url.set_fragment(None);
        url.query_pairs_mut().append_pair("token", token.as_str());
        Ok(url)
    }

    /// URL of a server API endpoint such as `/api/pair`.
    pub fn api_url(&self, path: &str) -> Result<Url, ConfigError> {
        self.server_url()?
            .join(path)
            .map_err(|e| ConfigError::Invalid(format!("endpoint {path}: {e}")))
    }

    /// Reconnect policy derived from the connection section.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.connection.reconnect_delay_ms),
            max_attempts: match self.connection.max_reconnect_attempts {
                0 => None,
                n => Some(n),
            },
        }
    }

    /// Timeout for one connection attempt.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range or malformed.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.server.url, "http://127.0.0.1:3280");
        assert_eq!(config.connection.reconnect_delay_ms, 3000);
        assert_eq!(config.history.limit, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
url = "https://sync.local:8443"

[connection]
reconnect_delay_ms = 500
max_reconnect_attempts = 4

[history]
limit = 50
"#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.url, "https://sync.local:8443");
        assert_eq!(config.history.limit, 50);
        assert_eq!(config.connection.connect_timeout_ms, 10_000);

        let policy = config.reconnect_policy();
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, Some(4));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn websocket_url_from_http() {
        let config = ClientConfig::default();
        let token = SessionToken::new("abc def").unwrap();
        let url = config.websocket_url(&token).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:3280/ws?token=abc+def");
    }

    #[test]
    fn websocket_url_from_https() {
        let mut config = ClientConfig::default();
        config.server.url = "https://sync.local/".into();
        let token = SessionToken::new("t").unwrap();
        assert_eq!(
            config.websocket_url(&token).unwrap().as_str(),
            "wss://sync.local/ws?token=t"
        );
    }

    #[test]
    fn api_url_joins_path() {
        let config = ClientConfig::default();
        assert_eq!(
            config.api_url("/api/pairing-token").unwrap().as_str(),
            "http://127.0.0.1:3280/api/pairing-token"
        );
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.server.url = "not a url".into();
        assert!(config.validate().is_err());

        config.server.url = "ftp://host".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ClientConfig::default();
        config.history.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_timings() {
        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect_timeout_ms"));

        let mut config = ClientConfig::default();
        config.connection.reconnect_delay_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reconnect_delay_ms"));

        let mut config = ClientConfig::default();
        config.connection.reconnect_delay_ms = 1;
        config.connection.connect_timeout_ms = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ClientConfig::from_file(std::path::Path::new("/nonexistent/easy-sync.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("easy-sync.toml");
        std::fs::write(&path, "[history]\nlimit = \"many\"\n").unwrap();
        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
