//! Auth token providers.
//!
//! The dashboard hands out a bearer token at login. The CLI keeps it in
//! `secret.json`; tests and embedding callers can pass one directly.

use crate::paths::KakoPaths;
use chrono::{DateTime, Utc};
use kako_core::auth::TokenProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk shape of `secret.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// The token, unless it is blank or expired at `now`.
    pub fn usable_at(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.token.trim().is_empty() {
            return None;
        }
        match self.expires_at {
            Some(expires_at) if expires_at <= now => None,
            _ => Some(self.token.as_str()),
        }
    }
}

/// Reads the token from `secret.json` on every call, so a re-login is
/// picked up by the next reconnect.
#[derive(Debug, Clone)]
pub struct SecretFileTokenProvider {
    path: PathBuf,
}

impl SecretFileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Provider for the default `~/.config/kako/secret.json`.
    pub fn default_location() -> Option<Self> {
        KakoPaths::secret_file().ok().map(Self::new)
    }

    fn read(&self) -> Option<StoredToken> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("[SecretFileTokenProvider] Cannot read secret file: {}", e.kind());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(stored) => Some(stored),
            Err(_) => {
                tracing::warn!(
                    "[SecretFileTokenProvider] {} is not valid JSON",
                    self.path.display()
                );
                None
            }
        }
    }
}

impl TokenProvider for SecretFileTokenProvider {
    fn auth_token(&self) -> Option<String> {
        let stored = self.read()?;
        let token = stored.usable_at(Utc::now()).map(str::to_string);
        if token.is_none() && !stored.token.is_empty() {
            tracing::info!("[SecretFileTokenProvider] Stored token has expired");
        }
        token
    }
}

/// A fixed token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider(Option<String>);

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl TokenProvider for StaticTokenProvider {
    fn auth_token(&self) -> Option<String> {
        self.0.clone()
    }
}
