//! Backend liveness probe (`/health/status`).

use serde::Deserialize;

use crate::errors::ApiError;
use crate::http::AuthedHttp;

/// Reply to the liveness probe.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OnlineStatus {
    /// `"online"` when healthy.
    pub status: String,
    /// Server time, Unix seconds.
    pub timestamp: i64,
}

impl OnlineStatus {
    /// The backend reports itself online.
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    /// Server time.
    pub fn server_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// Ask the backend whether it is up.
pub async fn status(http: &AuthedHttp) -> Result<OnlineStatus, ApiError> {
    http.get_json("/health/status").await
}
