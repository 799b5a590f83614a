//! Subsystem lifecycle states and the events that drive them

use std::fmt;
use std::net::IpAddr;

/// Link lifecycle, owned by the link supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    /// Not started yet
    #[default]
    Idle,

    /// Hardware started, association in progress
    Connecting,

    /// Associated and addressed
    Connected,

    /// Association lost, waiting for the next attempt
    Disconnected,
}

/// Messaging session lifecycle, owned by the session supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
}

/// Lifecycle events delivered by the link-layer driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Radio is up but not associated
    Started,

    /// Association lost or an attempt failed
    Disconnected { reason: String },

    /// Associated and holding an L3 address
    AddressAcquired { address: IpAddr },
}

/// Lifecycle events delivered by the messaging client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake with the broker completed
    Connected,

    /// Session dropped; the client reconnects on its own
    Disconnected { reason: String },
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connected => f.write_str("connected"),
        }
    }
}
