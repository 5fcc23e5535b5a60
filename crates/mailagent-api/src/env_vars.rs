//! Per-user environment variables (`/env-vars`).
//!
//! Values are stored encrypted server-side; writes echo back only a masked
//! value.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::MessageResponse;
use crate::de::id_string;
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// A stored variable with its plaintext value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Backend row ID.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Variable name.
    pub key: String,
    /// Decrypted value.
    #[serde(default)]
    pub value: String,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last update.
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Variable as echoed after a write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MaskedEnvVar {
    /// Backend row ID.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Variable name.
    pub key: String,
    /// Value with all but the edges masked.
    #[serde(default)]
    pub masked_value: String,
}

/// Reply to create and update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EnvVarSaved {
    /// Backend success flag.
    pub success: bool,
    /// Status text.
    pub message: Option<String>,
    /// The stored variable.
    pub variable: Option<MaskedEnvVar>,
}

/// Client for `/env-vars`.
#[derive(Clone, Copy, Debug)]
pub struct EnvVarsClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> EnvVarsClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    /// Every variable of the logged-in user.
    pub async fn list(&self) -> Result<Vec<EnvVar>, ApiError> {
        self.http.get_json("/env-vars/").await
    }

    /// One variable by key.
    pub async fn get(&self, key: &str) -> Result<EnvVar, ApiError> {
        self.http.fetch(Call::get("/env-vars").segment(key)).await
    }

    /// Create a variable, or overwrite it if the key exists.
    pub async fn create(&self, key: &str, value: &str) -> Result<EnvVarSaved, ApiError> {
        let call = Call::post("/env-vars/").json(&json!({ "key": key, "value": value }))?;
        self.http.fetch(call).await
    }

    /// Change the value of an existing variable.
    pub async fn update(&self, key: &str, value: &str) -> Result<EnvVarSaved, ApiError> {
        let call = Call::put("/env-vars")
            .segment(key)
            .json(&json!({ "value": value }))?;
        self.http.fetch(call).await
    }

    /// Remove a variable.
    pub async fn delete(&self, key: &str) -> Result<MessageResponse, ApiError> {
        self.http.fetch(Call::delete("/env-vars").segment(key)).await
    }
}
