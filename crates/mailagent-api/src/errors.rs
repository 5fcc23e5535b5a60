//! REST client errors.

use mailagent_auth::AuthError;
use mailagent_core::ErrorCategory;
use thiserror::Error;

/// Failure of a REST call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (DNS, TLS, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the session token; the login redirect has fired.
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success status with the backend's error message.
    #[error("{message} (HTTP {status})")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `detail`, `message`, or `error` from the body.
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Reading or writing the stored token failed.
    #[error("token store error: {0}")]
    Auth(#[from] AuthError),

    /// The request could not be built from the given input.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ApiError {
    /// Classify for logging and retry decisions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(e) if e.is_timeout() => ErrorCategory::Timeout,
            Self::Http(_) => ErrorCategory::Connection,
            Self::Unauthorized => ErrorCategory::Auth,
            Self::Status { .. } => ErrorCategory::Application,
            Self::Decode(_) => ErrorCategory::Decode,
            Self::Auth(_) | Self::Invalid(_) => ErrorCategory::Internal,
        }
    }

    /// HTTP status, when the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let err = ApiError::Status {
            status: 404,
            message: "Email not found".into(),
        };
        assert_eq!(err.to_string(), "Email not found (HTTP 404)");
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.category(), ErrorCategory::Application);
    }

    #[test]
    fn unauthorized_is_auth() {
        assert_eq!(ApiError::Unauthorized.category(), ErrorCategory::Auth);
        assert_eq!(ApiError::Unauthorized.status(), Some(401));
    }

    #[test]
    fn auth_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ApiError::from(AuthError::from(io));
        assert_eq!(err.category(), ErrorCategory::Internal);
    }
}
