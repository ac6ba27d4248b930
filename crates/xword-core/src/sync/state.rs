//! Connection state machine
//!
//! `disconnected -> connecting -> syncing -> connected`, with `connecting`
//! reachable from every state (manual reconnect, transport retry or a
//! reachability change). Pure transitions only; the driver does the I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection status reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Not connected, not trying
    Disconnected,
    /// Attempting to connect, or waiting to retry
    Connecting,
    /// Connected and replaying the full event log
    Syncing,
    /// Replay finished, live events flowing
    Connected,
}

/// Inputs that move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection attempt starts (including retries and forced reconnects)
    ConnectAttempt,
    /// The transport reports it is connected
    TransportConnected,
    /// Bulk replay finished
    SyncCompleted,
    /// The transport dropped or a retry is pending
    TransportLost,
    /// The session is shutting down
    Shutdown,
}

impl ConnectionState {
    /// Next state for `event`, or `None` when the event does not apply here
    pub fn next(self, event: LinkEvent) -> Option<Self> {
        use ConnectionState::*;
        match (self, event) {
            (_, LinkEvent::ConnectAttempt) | (_, LinkEvent::TransportLost) => Some(Connecting),
            (_, LinkEvent::Shutdown) => Some(Disconnected),
            (Connecting, LinkEvent::TransportConnected) => Some(Syncing),
            // Re-joining while connected redoes the full replay
            (Connected, LinkEvent::TransportConnected) => Some(Syncing),
            (Syncing, LinkEvent::SyncCompleted) => Some(Connected),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Syncing | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = ConnectionState::Disconnected;
        let state = state.next(LinkEvent::ConnectAttempt).unwrap();
        assert_eq!(state, ConnectionState::Connecting);
        let state = state.next(LinkEvent::TransportConnected).unwrap();
        assert_eq!(state, ConnectionState::Syncing);
        let state = state.next(LinkEvent::SyncCompleted).unwrap();
        assert_eq!(state, ConnectionState::Connected);
    }

    #[test]
    fn test_connecting_reachable_from_everywhere() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Syncing,
            ConnectionState::Connected,
        ] {
            assert_eq!(
                state.next(LinkEvent::TransportLost),
                Some(ConnectionState::Connecting)
            );
            assert_eq!(
                state.next(LinkEvent::ConnectAttempt),
                Some(ConnectionState::Connecting)
            );
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            ConnectionState::Disconnected.next(LinkEvent::SyncCompleted),
            None
        );
        assert_eq!(
            ConnectionState::Connecting.next(LinkEvent::SyncCompleted),
            None
        );
        assert_eq!(
            ConnectionState::Disconnected.next(LinkEvent::TransportConnected),
            None
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Syncing.to_string(), "syncing");
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Connecting.is_live());
    }
}
