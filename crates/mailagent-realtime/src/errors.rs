//! Realtime session errors.

use mailagent_core::ErrorCategory;
use thiserror::Error;

/// Failure of a realtime operation.
///
/// Cloneable because one connection attempt's outcome is delivered to every
/// caller waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// The socket could not be opened.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The socket dropped before the reply arrived.
    #[error("connection closed before a reply arrived")]
    ConnectionClosed,

    /// The backend rejected the session token.
    #[error("unauthorized")]
    Unauthorized,

    /// The reply could not be decoded.
    #[error("malformed reply: {0}")]
    Decode(String),

    /// No reply within the deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Fail-fast request issued while no connection was open or opening.
    #[error("not connected")]
    NotConnected,

    /// The session was shut down.
    #[error("session shut down")]
    Shutdown,

    /// The request could not be serialized.
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl RealtimeError {
    /// Classify for logging and retry decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connect(_) | Self::ConnectionClosed | Self::NotConnected => {
                ErrorCategory::Connection
            }
            Self::Unauthorized => ErrorCategory::Auth,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled | Self::Shutdown => ErrorCategory::Cancelled,
            Self::Encode(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a fresh attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}
