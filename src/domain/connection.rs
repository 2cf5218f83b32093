//! Control-plane connection state

use std::fmt;

/// Lifecycle of the control-plane connection.
///
/// `Failed` is not terminal in connect mode: the transport manager retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Listening,
    Failed,
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Listening => "Listening",
            ConnectionState::Failed => "Failed",
        }
    }

    /// Whether the control plane can currently carry requests
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Listening)
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
