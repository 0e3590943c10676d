use serde::{Deserialize, Serialize};
use std::fmt;

/// Externally visible connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No endpoint requested, or explicitly disconnected
    Disconnected,
    /// First connection attempt in progress
    Connecting,
    Connected,
    /// Transport lost; backoff attempts in progress
    Reconnecting,
    /// Reconnect attempts exhausted; only `start` or `disconnect` leave this state
    GivenUp,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::GivenUp => "given up",
        };
        f.write_str(name)
    }
}

/// Result of handing a payload to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

/// Why a payload never reached the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No live transport at the time of the call
    NotConnected,
    /// The transport failed mid-send; a reconnect has been triggered
    SendFailed,
}
