//! Sender mailbox configurations (`/email-configs`).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::MessageResponse;
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// Placeholder address the backend reports when no mailbox is active.
pub const NO_ACTIVE_EMAIL: &str = "default";

/// A configured sender mailbox.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Mailbox address; also the resource key.
    pub email: String,
    /// App password, decrypted.
    #[serde(default)]
    pub password: String,
    /// Backend row ID.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last update.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Client for `/email-configs`.
#[derive(Clone, Copy, Debug)]
pub struct EmailConfigsClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> EmailConfigsClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    /// Every configured mailbox.
    pub async fn list(&self) -> Result<Vec<EmailConfig>, ApiError> {
        self.http.get_json("/email-configs/").await
    }

    /// One mailbox by address.
    pub async fn get(&self, email: &str) -> Result<EmailConfig, ApiError> {
        self.http.fetch(Call::get("/email-configs").segment(email)).await
    }

    /// The active mailbox, or `None` when the backend reports its
    /// placeholder.
    pub async fn active(&self) -> Result<Option<EmailConfig>, ApiError> {
        let config: EmailConfig = self.http.get_json("/email-configs/active").await?;
        Ok((config.email != NO_ACTIVE_EMAIL && !config.email.is_empty()).then_some(config))
    }

    /// Add a mailbox, or replace its password if it exists.
    pub async fn create(&self, email: &str, password: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::post("/email-configs/")
            .json(&json!({ "email": email, "password": password }))?;
        self.http.fetch(call).await
    }

    /// Replace the password of an existing mailbox.
    pub async fn update(&self, email: &str, password: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::put("/email-configs")
            .segment(email)
            .json(&json!({ "password": password }))?;
        self.http.fetch(call).await
    }

    /// Remove a mailbox.
    pub async fn delete(&self, email: &str) -> Result<MessageResponse, ApiError> {
        self.http.fetch(Call::delete("/email-configs").segment(email)).await
    }

    /// Make a mailbox the sender for new emails.
    pub async fn set_active(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::patch("/email-configs").segment(email).segment("set-active");
        self.http.fetch(call).await
    }
}
