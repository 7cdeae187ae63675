//! Device identity and pairing bookkeeping for easy-sync.
//!
//! This module provides:
//! - Device classification (mobile vs desktop) behind a trait
//! - Device identity generation (`device_<ms>_<random>` plus a display name)
//! - Pairing code normalization for the manual flow
//! - The once-per-lifetime guard for automatic pairing
//!
//! The pairing flow (performed by sync-client):
//! 1. If credentials already exist, nothing happens
//! 2. Otherwise fetch a one-time pairing code from the server
//! 3. Exchange the code plus device identity for a session token
//! 4. Persist the token; the connection manager picks it up

use easysync_types::DeviceId;
use serde::{Deserialize, Serialize};

/// Display name used for mobile devices.
pub const MOBILE_DEVICE_NAME: &str = "Mobile Device";

/// Display name used for everything else.
pub const DESKTOP_DEVICE_NAME: &str = "Desktop Browser";

/// Error type for pairing code input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// The code was empty after trimming whitespace.
    Empty,
}

impl std::fmt::Display for CodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeError::Empty => write!(f, "pairing code is empty"),
        }
    }
}

impl std::error::Error for CodeError {}

/// A one-time pairing code, trimmed and known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingCode(String);

impl PairingCode {
    /// Normalize user or server input into a code.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CodeError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Get the code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Coarse device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Phone or tablet.
    Mobile,
    /// Anything else.
    Desktop,
}

impl DeviceKind {
    /// Display name advertised for this kind.
    pub fn device_name(self) -> &'static str {
        match self {
            DeviceKind::Mobile => MOBILE_DEVICE_NAME,
            DeviceKind::Desktop => DESKTOP_DEVICE_NAME,
        }
    }
}

/// Decides what kind of device this client runs on.
pub trait DeviceClassifier: Send + Sync {
    /// Classify the current device.
    fn classify(&self) -> DeviceKind;
}

/// Classifies by target operating system.
#[derive(Debug, Clone)]
pub struct OsClassifier {
    os: String,
}

impl OsClassifier {
    /// Classifier for an explicit OS name (as in `std::env::consts::OS`).
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }
}

impl Default for OsClassifier {
    fn default() -> Self {
        Self::new(std::env::consts::OS)
    }
}

impl DeviceClassifier for OsClassifier {
    fn classify(&self) -> DeviceKind {
        match self.os.as_str() {
            "android" | "ios" => DeviceKind::Mobile,
            _ => DeviceKind::Desktop,
        }
    }
}

/// Classifies by a user-agent string containing `Mobile`.
#[derive(Debug, Clone)]
pub struct UserAgentClassifier {
    user_agent: String,
}

impl UserAgentClassifier {
    /// Classifier for the given user agent.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl DeviceClassifier for UserAgentClassifier {
    fn classify(&self) -> DeviceKind {
        if self.user_agent.contains("Mobile") {
            DeviceKind::Mobile
        } else {
            DeviceKind::Desktop
        }
    }
}

/// Identity this client presents when pairing and in `hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable identifier for this install.
    pub device_id: DeviceId,
    /// Human-readable name, also used for message attribution.
    pub device_name: String,
}

impl DeviceIdentity {
    /// Generate a fresh identity stamped with the given time.
    pub fn generate(classifier: &dyn DeviceClassifier, unix_ms: u64) -> Self {
        Self {
            device_id: DeviceId::generate(unix_ms),
            device_name: classifier.classify().device_name().to_owned(),
        }
    }
}

/// Outcome of asking the guard for permission to pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Go ahead; call [`PairingGuard::finish`] afterwards.
    Proceed,
    /// Credentials exist; automatic pairing is permanently skipped.
    AlreadyPaired,
    /// Automatic pairing already ran once this lifetime.
    AlreadyAttempted,
    /// Another pairing is in flight.
    InProgress,
}

/// Tracks whether pairing is running and whether the automatic
/// attempt has been used up.
#[derive(Debug, Clone, Default)]
pub struct PairingGuard {
    in_progress: bool,
    attempted: bool,
}

impl PairingGuard {
    /// Create a fresh guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to start automatic pairing.
    ///
    /// Existing credentials consume the attempt without running it.
    pub fn begin_auto(&mut self, has_token: bool) -> GuardDecision {
        if self.in_progress {
            return GuardDecision::InProgress;
        }
        if self.attempted {
            return GuardDecision::AlreadyAttempted;
        }
        self.attempted = true;
        if has_token {
            return GuardDecision::AlreadyPaired;
        }
        self.in_progress = true;
        GuardDecision::Proceed
    }

    /// Ask to start manual pairing. Only refused while another pairing runs.
    pub fn begin_manual(&mut self) -> GuardDecision {
        if self.in_progress {
            return GuardDecision::InProgress;
        }
        self.in_progress = true;
        GuardDecision::Proceed
    }

    /// Mark the running pairing as finished, successful or not.
    pub fn finish(&mut self) {
        self.in_progress = false;
    }

    /// Whether a pairing is in flight.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Whether the automatic attempt has been used.
    pub fn was_attempted(&self) -> bool {
        self.attempted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_classifier() {
        assert_eq!(OsClassifier::new("android").classify(), DeviceKind::Mobile);
        assert_eq!(OsClassifier::new("ios").classify(), DeviceKind::Mobile);
        assert_eq!(OsClassifier::new("linux").classify(), DeviceKind::Desktop);
        assert_eq!(OsClassifier::new("macos").classify(), DeviceKind::Desktop);
    }

    #[test]
    fn user_agent_classifier() {
        let phone = UserAgentClassifier::new(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148",
        );
        let desktop = UserAgentClassifier::new("Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0");
        assert_eq!(phone.classify(), DeviceKind::Mobile);
        assert_eq!(desktop.classify(), DeviceKind::Desktop);
    }

    #[test]
    fn identity_uses_classified_name() {
        let identity = DeviceIdentity::generate(&OsClassifier::new("android"), 42);
        assert_eq!(identity.device_name, MOBILE_DEVICE_NAME);
        assert!(identity.device_id.as_str().starts_with("device_42_"));

        let identity = DeviceIdentity::generate(&OsClassifier::new("windows"), 42);
        assert_eq!(identity.device_name, DESKTOP_DEVICE_NAME);
    }

    #[test]
    fn pairing_code_is_trimmed() {
        let code = PairingCode::parse("  ABC123 \n").unwrap();
        assert_eq!(code.as_str(), "ABC123");
    }

    #[test]
    fn empty_pairing_code_rejected() {
        assert_eq!(PairingCode::parse(""), Err(CodeError::Empty));
        assert_eq!(PairingCode::parse("   \t"), Err(CodeError::Empty));
        assert_eq!(CodeError::Empty.to_string(), "pairing code is empty");
    }

    #[test]
    fn auto_pairing_runs_once() {
        let mut guard = PairingGuard::new();
        assert_eq!(guard.begin_auto(false), GuardDecision::Proceed);
        assert!(guard.is_in_progress());
        assert_eq!(guard.begin_auto(false), GuardDecision::InProgress);

        guard.finish();
        assert!(!guard.is_in_progress());
        assert_eq!(guard.begin_auto(false), GuardDecision::AlreadyAttempted);
    }

    #[test]
    fn existing_token_consumes_attempt() {
        let mut guard = PairingGuard::new();
        assert_eq!(guard.begin_auto(true), GuardDecision::AlreadyPaired);
        assert!(guard.was_attempted());
        assert!(!guard.is_in_progress());
        // Logging out later does not re-enable automatic pairing
        assert_eq!(guard.begin_auto(false), GuardDecision::AlreadyAttempted);
    }

    #[test]
    fn manual_pairing_allowed_after_auto() {
        let mut guard = PairingGuard::new();
        guard.begin_auto(false);
        assert_eq!(guard.begin_manual(), GuardDecision::InProgress);
        guard.finish();
        assert_eq!(guard.begin_manual(), GuardDecision::Proceed);
        guard.finish();
        assert_eq!(guard.begin_manual(), GuardDecision::Proceed);
    }
}
