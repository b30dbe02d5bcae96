use std::fmt;

/// Connection state exposed to consumers of a view.
///
/// A `Disconnected` state sticks until a later subscribe succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Live,
    Disconnected { reason: String },
}

impl ConnectionStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionStatus::Live)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "idle"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Live => write!(f, "live"),
            ConnectionStatus::Disconnected { reason } => write!(f, "disconnected ({reason})"),
        }
    }
}
