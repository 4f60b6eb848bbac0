//! Error types for the Kako client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Kako client.
///
/// Only conditions a caller can act on are errors. Transient channel trouble
/// (a malformed frame, a send while disconnected, a mutation on an unknown id)
/// is logged and surfaced as a diagnostic instead.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum KakoError {
    /// Transport-level failure (socket closed, write failed)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The push-channel handshake was rejected or failed before Open
    #[error("Handshake failed for {channel}: {message}")]
    Handshake { channel: String, message: String },

    /// An operation did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A channel or server URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A payload or file could not be encoded or decoded
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "JSON", "TOML"
        message: String,
    },

    /// Non-success response from the REST collaborator
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Missing or malformed client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config or secret file could not be read or written
    #[error("IO error: {message}")]
    Io { message: String },

    /// A task, model or tool the caller named is unknown
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Broken internal state, e.g. a panicked background task
    #[error("Internal error: {0}")]
    Internal(String),
}

impl KakoError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Handshake error for the named channel
    pub fn handshake(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handshake {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Unknown entity of the given type
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Configuration problem
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Broken internal state
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates an Http error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// True for an unknown task, model or tool
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a payload failed to decode
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// True for configuration problems
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true for failures the reconnect path should retry.
    ///
    /// Transport errors, handshake failures and timeouts are transient;
    /// configuration and URL problems will not heal by retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Handshake { .. } | Self::Timeout(_)
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for KakoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for KakoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for KakoError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for KakoError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// A type alias for `Result<T, KakoError>`.
pub type Result<T> = std::result::Result<T, KakoError>;
