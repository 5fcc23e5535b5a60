//! Error classification shared across crates.
//!
//! Each crate owns its own `thiserror` enum; they all map onto
//! [`ErrorCategory`] so callers can log and branch uniformly.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad failure category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Socket never opened, or dropped mid-request.
    Connection,
    /// Credentials rejected; the session is over.
    Auth,
    /// A frame or body could not be decoded.
    Decode,
    /// No reply within the deadline.
    Timeout,
    /// The caller aborted the request.
    Cancelled,
    /// The backend answered with a non-success status.
    Application,
    /// Local misconfiguration or I/O.
    Internal,
}

impl ErrorCategory {
    /// Whether repeating the same request could succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout)
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Auth => "auth",
            Self::Decode => "decode",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Application => "application",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
