//! Connection state machine.

use std::fmt;

/// Lifecycle of the session's socket.
///
/// ```text
/// Unconnected ─► Connecting ─► Open ─► Closed ─► Connecting ...
///                     │
///                     └──────► Errored ─► Connecting ...
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt made yet.
    #[default]
    Unconnected,
    /// Handshake in flight.
    Connecting,
    /// Ready for requests.
    Open,
    /// An open socket was closed.
    Closed,
    /// The last attempt failed.
    Errored {
        /// Why.
        reason: String,
    },
}

impl ConnectionState {
    /// Whether requests can be written right now.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Errored { .. } => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errored { reason } => write!(f, "errored: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}
