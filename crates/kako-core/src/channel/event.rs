//! Typed channel lifecycle events and connection state.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumDiscriminants};

use super::frame::ServerFrame;

/// Everything a [`ChannelConnection`](crate::channel) delivers to subscribers.
///
/// Subscriptions are keyed by [`ChannelEventKind`], the field-less mirror of
/// this enum.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(ChannelEventKind))]
#[strum_discriminants(derive(Hash))]
pub enum ChannelEvent {
    /// The channel reached Open.
    Connected,
    /// The channel closed, on purpose or not.
    Disconnected { reason: String },
    /// Reconnect attempts are exhausted. Only a manual connect resumes.
    PermanentlyDisconnected { attempts: u32 },
    /// A decoded server frame.
    Message(ServerFrame),
    /// Transport-level failure.
    Error(String),
    /// Local, non-fatal diagnostic (malformed frame, send while closed).
    Warning(String),
}

impl ChannelEvent {
    pub fn kind(&self) -> ChannelEventKind {
        ChannelEventKind::from(self)
    }
}

impl ChannelEventKind {
    pub const ALL: [ChannelEventKind; 6] = [
        ChannelEventKind::Connected,
        ChannelEventKind::Disconnected,
        ChannelEventKind::PermanentlyDisconnected,
        ChannelEventKind::Message,
        ChannelEventKind::Error,
        ChannelEventKind::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelEventKind::Connected => "connected",
            ChannelEventKind::Disconnected => "disconnected",
            ChannelEventKind::PermanentlyDisconnected => "permanently_disconnected",
            ChannelEventKind::Message => "message",
            ChannelEventKind::Error => "error",
            ChannelEventKind::Warning => "warning",
        }
    }
}

impl fmt::Display for ChannelEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

impl ConnectionStatus {
    /// Whether `self -> to` is a legal step. Every path to Open goes through
    /// Connecting.
    pub fn can_transition(self, to: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        matches!(
            (self, to),
            (Idle | Closed | Reconnecting | Open, Connecting)
                | (Connecting, Open | Reconnecting | Closed)
                | (Open, Reconnecting)
                | (Idle | Open | Reconnecting, Closed)
        )
    }
}

/// Lifecycle state of one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Consecutive failed reconnect attempts. Reset only on Open or a manual connect.
    pub attempt: u32,
    pub channel_url: String,
}

impl ConnectionState {
    pub fn new(channel_url: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Idle,
            attempt: 0,
            channel_url: channel_url.into(),
        }
    }

    /// Moves to `to` if the step is legal. Returns false and leaves the
    /// state untouched otherwise.
    pub fn advance(&mut self, to: ConnectionStatus) -> bool {
        if self.status == to {
            return true;
        }
        if !self.status.can_transition(to) {
            tracing::warn!(
                "[ConnectionState] Rejected transition {} -> {}",
                self.status,
                to
            );
            return false;
        }
        self.status = to;
        if to == ConnectionStatus::Open {
            self.attempt = 0;
        }
        true
    }

    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }
}
