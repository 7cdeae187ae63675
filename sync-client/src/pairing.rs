//! Pairing bootstrap for easy-sync.
//!
//! Obtains a session token from the server by exchanging a one-time pairing
//! code plus the device identity. The automatic path fetches the code itself
//! and runs at most once per process; the manual path takes a code from the
//! user and may be retried freely.
//!
//! ```text
//! GET  /api/pairing-token                      -> { token }
//! POST /api/pair { token, device_id, device_name } -> { token: <session> }
//! ```

use async_trait::async_trait;
use easysync_core::{
    CodeError, DeviceClassifier, DeviceIdentity, GuardDecision, PairingCode, PairingGuard,
};
use easysync_types::SessionToken;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{ClientConfig, ConfigError};
use crate::credentials::{CredentialError, CredentialStore};

/// Pairing errors. All of them are displayable and none are fatal.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided error text, or the status line.
        message: String,
    },

    /// A success response carried no token.
    #[error("server response did not include a token")]
    MissingToken,

    /// The supplied pairing code is unusable.
    #[error(transparent)]
    InvalidCode(#[from] CodeError),

    /// Another pairing is already running.
    #[error("pairing already in progress")]
    InProgress,

    /// Persisting credentials failed.
    #[error("credential store: {0}")]
    Credentials(#[from] CredentialError),

    /// The server URL is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result of an automatic pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoPairOutcome {
    /// Credentials already existed; nothing was done.
    AlreadyPaired,
    /// Automatic pairing already ran (or is running) this lifetime.
    Skipped,
    /// Pairing succeeded and the token was persisted.
    Paired(SessionToken),
}

/// Server endpoints used for pairing.
#[async_trait]
pub trait PairingApi: Send + Sync {
    /// Fetch a one-time pairing code.
    async fn fetch_pairing_code(&self) -> Result<PairingCode, PairingError>;

    /// Exchange a pairing code and identity for a session token.
    async fn pair(
        &self,
        code: &PairingCode,
        identity: &DeviceIdentity,
    ) -> Result<SessionToken, PairingError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct PairRequest<'a> {
    token: &'a str,
    device_id: &'a str,
    device_name: &'a str,
}

/// [`PairingApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPairingApi {
    client: reqwest::Client,
    pairing_token_url: Url,
    pair_url: Url,
}

impl HttpPairingApi {
    /// Create a client for the server named in the config.
    pub fn new(config: &ClientConfig) -> Result<Self, PairingError> {
        let client = reqwest::Client::builder()
            .timeout(config.connect_timeout())
            .build()
            .map_err(|e| PairingError::Network(e.to_string()))?;
        Ok(Self {
            client,
            pairing_token_url: config.api_url("/api/pairing-token")?,
            pair_url: config.api_url("/api/pair")?,
        })
    }

    async fn read_token(response: reqwest::Response) -> Result<String, PairingError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PairingError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(server_error(status.as_u16(), &status.to_string(), &body));
        }
        token_from_body(&body)
    }
}

#[async_trait]
impl PairingApi for HttpPairingApi {
    async fn fetch_pairing_code(&self) -> Result<PairingCode, PairingError> {
        debug!(url = %self.pairing_token_url, "fetching pairing code");
        let response = self
            .client
            .get(self.pairing_token_url.clone())
            .send()
            .await
            .map_err(|e| PairingError::Network(e.to_string()))?;
        let code = Self::read_token(response).await?;
        Ok(PairingCode::parse(&code)?)
    }

    async fn pair(
        &self,
        code: &PairingCode,
        identity: &DeviceIdentity,
    ) -> Result<SessionToken, PairingError> {
        debug!(url = %self.pair_url, device_id = %identity.device_id, "submitting pairing code");
        let body = PairRequest {
            token: code.as_str(),
            device_id: identity.device_id.as_str(),
            device_name: &identity.device_name,
        };
        let response = self
            .client
            .post(self.pair_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| PairingError::Network(e.to_string()))?;
        let token = Self::read_token(response).await?;
        SessionToken::new(token).map_err(|_| PairingError::MissingToken)
    }
}

/// Map a non-2xx response to an error, preferring the server's `error` text.
fn server_error(status: u16, status_line: &str, body: &str) -> PairingError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| status_line.to_owned());
    PairingError::Server { status, message }
}

fn token_from_body(body: &str) -> Result<String, PairingError> {
    serde_json::from_str::<TokenResponse>(body)
        .ok()
        .and_then(|r| r.token)
        .filter(|t| !t.trim().is_empty())
        .ok_or(PairingError::MissingToken)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Clears the in-progress flag when a pairing run ends, even if its future
/// is dropped midway.
struct Running<'a>(&'a Mutex<PairingGuard>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        lock(self.0).finish();
    }
}

/// Runs automatic and manual pairing against a [`PairingApi`].
pub struct PairingBootstrapper<A> {
    api: A,
    store: Arc<dyn CredentialStore>,
    classifier: Box<dyn DeviceClassifier>,
    guard: Mutex<PairingGuard>,
}

impl<A: PairingApi> PairingBootstrapper<A> {
    /// Create a bootstrapper persisting into `store`.
    pub fn new(
        api: A,
        store: Arc<dyn CredentialStore>,
        classifier: Box<dyn DeviceClassifier>,
    ) -> Self {
        Self {
            api,
            store,
            classifier,
            guard: Mutex::new(PairingGuard::new()),
        }
    }

    /// Whether a pairing run is in flight.
    pub fn is_in_progress(&self) -> bool {
        lock(&self.guard).is_in_progress()
    }

    /// The stored identity, or a freshly generated one that is persisted.
    pub fn identity(&self) -> Result<DeviceIdentity, PairingError> {
        if let Some(identity) = self.store.identity() {
            return Ok(identity);
        }
        let identity = DeviceIdentity::generate(self.classifier.as_ref(), unix_millis());
        self.store.set_identity(&identity)?;
        info!(device_id = %identity.device_id, device_name = %identity.device_name, "generated device identity");
        Ok(identity)
    }

    /// Pair automatically, at most once per lifetime.
    ///
    /// Failures leave the token unset and are not retried; use
    /// [`pair_manually`](Self::pair_manually) afterwards.
    pub async fn attempt_auto_pair(&self) -> Result<AutoPairOutcome, PairingError> {
        let decision = lock(&self.guard).begin_auto(self.store.get().is_some());
        match decision {
            GuardDecision::Proceed => {}
            GuardDecision::AlreadyPaired => return Ok(AutoPairOutcome::AlreadyPaired),
            GuardDecision::AlreadyAttempted | GuardDecision::InProgress => {
                debug!(?decision, "automatic pairing skipped");
                return Ok(AutoPairOutcome::Skipped);
            }
        }
        let _running = Running(&self.guard);

        info!("automatic pairing started");
        match self.fetch_and_complete().await {
            Ok(token) => {
                info!("automatic pairing succeeded");
                Ok(AutoPairOutcome::Paired(token))
            }
            Err(e) => {
                warn!(error = %e, "automatic pairing failed");
                Err(e)
            }
        }
    }

    /// Pair with a user-supplied code.
    pub async fn pair_manually(&self, code: &str) -> Result<SessionToken, PairingError> {
        let code = PairingCode::parse(code)?;
        if lock(&self.guard).begin_manual() == GuardDecision::InProgress {
            return Err(PairingError::InProgress);
        }
        let _running = Running(&self.guard);

        info!("manual pairing started");
        let result = self.complete(&code).await;
        if let Err(e) = &result {
            warn!(error = %e, "manual pairing failed");
        }
        result
    }

    async fn fetch_and_complete(&self) -> Result<SessionToken, PairingError> {
        let code = self.api.fetch_pairing_code().await?;
        self.complete(&code).await
    }

    async fn complete(&self, code: &PairingCode) -> Result<SessionToken, PairingError> {
        let identity = self.identity()?;
        let token = self.api.pair(code, &identity).await?;
        self.store.set(&token)?;
        Ok(token)
    }
}

/// Scripted [`PairingApi`] for tests.
///
/// Unscripted calls fail with a server error.
#[derive(Debug, Default, Clone)]
pub struct MockPairingApi {
    inner: Arc<Mutex<MockPairingInner>>,
}

#[derive(Debug, Default)]
struct MockPairingInner {
    codes: VecDeque<Result<String, (u16, String)>>,
    tokens: VecDeque<Result<String, (u16, String)>>,
    submitted: Vec<(String, DeviceIdentity)>,
    fetch_calls: usize,
}

impl MockPairingApi {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a pairing code for `fetch_pairing_code`.
    pub fn push_code(&self, code: &str) {
        lock(&self.inner).codes.push_back(Ok(code.to_owned()));
    }

    /// Queue a server error for `fetch_pairing_code`.
    pub fn push_code_error(&self, status: u16, message: &str) {
        lock(&self.inner)
            .codes
            .push_back(Err((status, message.to_owned())));
    }

    /// Queue a session token for `pair`.
    pub fn push_token(&self, token: &str) {
        lock(&self.inner).tokens.push_back(Ok(token.to_owned()));
    }

    /// Queue a server error for `pair`.
    pub fn push_pair_error(&self, status: u16, message: &str) {
        lock(&self.inner)
            .tokens
            .push_back(Err((status, message.to_owned())));
    }

    /// Codes and identities submitted to `pair`.
    pub fn submitted(&self) -> Vec<(String, DeviceIdentity)> {
        lock(&self.inner).submitted.clone()
    }

    /// Number of `fetch_pairing_code` calls.
    pub fn fetch_calls(&self) -> usize {
        lock(&self.inner).fetch_calls
    }
}

fn scripted(
    next: Option<Result<String, (u16, String)>>,
) -> Result<String, PairingError> {
    match next {
        Some(Ok(value)) => Ok(value),
        Some(Err((status, message))) => Err(PairingError::Server { status, message }),
        None => Err(PairingError::Server {
            status: 500,
            message: "unscripted call".into(),
        }),
    }
}

#[async_trait]
impl PairingApi for MockPairingApi {
    async fn fetch_pairing_code(&self) -> Result<PairingCode, PairingError> {
        let next = {
            let mut inner = lock(&self.inner);
            inner.fetch_calls += 1;
            inner.codes.pop_front()
        };
        Ok(PairingCode::parse(&scripted(next)?)?)
    }

    async fn pair(
        &self,
        code: &PairingCode,
        identity: &DeviceIdentity,
    ) -> Result<SessionToken, PairingError> {
        let next = {
            let mut inner = lock(&self.inner);
            inner
                .submitted
                .push((code.as_str().to_owned(), identity.clone()));
            inner.tokens.pop_front()
        };
        SessionToken::new(scripted(next)?).map_err(|_| PairingError::MissingToken)
    }
}
