//! Connection State Machine
//!
//! ```text
//! Disconnected
//!   ↓ connect
//! Connecting ⇄ Connected
//!   (ack ↓, ↑ transport drop)
//! ```
//! Any state may return to `Disconnected` (explicit disconnect, or the
//! transport giving up).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection exists
    #[default]
    Disconnected,
    /// Connection opened, waiting for the transport's acknowledgment
    Connecting,
    /// Transport acknowledged; joins and sends go out immediately
    Connected,
}

impl ConnectionState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: ConnectionState) -> bool {
        match (self, target) {
            (ConnectionState::Disconnected, ConnectionState::Connecting) => true,
            (ConnectionState::Connecting, ConnectionState::Connected) => true,
            // transport dropped and is reconnecting
            (ConnectionState::Connected, ConnectionState::Connecting) => true,
            (_, ConnectionState::Disconnected) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(ConnectionState::Disconnected.can_transition_to(ConnectionState::Connecting));
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Connected));
        assert!(ConnectionState::Connected.can_transition_to(ConnectionState::Connecting));
        assert!(ConnectionState::Connected.can_transition_to(ConnectionState::Disconnected));
        assert!(ConnectionState::Connected.can_transition_to(ConnectionState::Connected));
    }

    #[test]
    fn test_invalid_transitions() {
        // must connect before it can be acknowledged
        assert!(!ConnectionState::Disconnected.can_transition_to(ConnectionState::Connected));
    }
}
