//! Account, session, password-reset, and preference endpoints (`/auth`).

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::de::{id_string, null_default};
use crate::errors::ApiError;
use crate::http::{AuthedHttp, Call};

/// Account as the backend reports it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Backend user ID.
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Login email.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub username: Option<String>,
    /// Account enabled.
    #[serde(default, deserialize_with = "null_default")]
    pub is_active: bool,
    /// Email verified.
    #[serde(default, deserialize_with = "null_default")]
    pub is_verified: bool,
    /// ISO-8601 creation time.
    #[serde(default)]
    pub created_at: Option<String>,
    /// ISO-8601 last update.
    #[serde(default)]
    pub updated_at: Option<String>,
    /// ISO-8601 last login.
    #[serde(default)]
    pub last_login: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// Reply to login and OTP verification.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoginResponse {
    /// Backend success flag.
    pub success: bool,
    /// Status text.
    pub message: Option<String>,
    /// Logged-in account.
    pub user: Option<User>,
    /// Session token, already stored by the client.
    pub token: Option<String>,
}

/// Reply to registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    /// Backend success flag.
    pub success: bool,
    /// Status text.
    pub message: Option<String>,
    /// Created account.
    pub user: Option<User>,
    /// An OTP was emailed and must be verified before login.
    pub requires_verification: bool,
}

/// Generic `{success, message}` reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MessageResponse {
    /// Backend success flag.
    pub success: bool,
    /// Status text.
    #[serde(deserialize_with = "null_default")]
    pub message: String,
}

/// Fields to change on the profile. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// New login email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

/// Per-user generation preferences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// UI / generation language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Tone applied when a request names none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tone: Option<String>,
    /// Let the backend learn from past emails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_learning: Option<bool>,
    /// Keep email history beyond 24 hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_history: Option<bool>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct PreferencesEnvelope {
    #[serde(default)]
    preferences: Preferences,
}

/// Client for `/auth`.
#[derive(Clone, Copy, Debug)]
pub struct AuthClient<'a> {
    http: &'a AuthedHttp,
}

impl<'a> AuthClient<'a> {
    /// Borrow the shared HTTP wrapper.
    pub fn new(http: &'a AuthedHttp) -> Self {
        Self { http }
    }

    // ─── Session ─────────────────────────────────────────────────────────────

    /// Log in and store the returned token.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let call = Call::post("/auth/login")
            .public()
            .json(&json!({ "email": email, "password": password }))?;
        let response: LoginResponse = self.http.fetch(call).await?;
        self.store_session(&response)?;
        info!("logged in");
        Ok(response)
    }

    /// Create an account. The backend emails an OTP; no token is issued
    /// until [`verify_otp`](Self::verify_otp).
    pub async fn register(
        &self,
        email: &str,
        username: Option<&str>,
        password: &str,
    ) -> Result<Registration, ApiError> {
        let call = Call::post("/auth/register")
            .public()
            .json(&json!({ "email": email, "username": username, "password": password }))?;
        self.http.fetch(call).await
    }

    /// Confirm the registration OTP; logs in on success.
    pub async fn verify_otp(&self, email: &str, otp: &str) -> Result<LoginResponse, ApiError> {
        let call = Call::post("/auth/verify-otp")
            .public()
            .json(&json!({ "email": email, "otp": otp }))?;
        let response: LoginResponse = self.http.fetch(call).await?;
        self.store_session(&response)?;
        Ok(response)
    }

    /// Send a fresh registration OTP.
    pub async fn resend_otp(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::post("/auth/resend-otp")
            .public()
            .json(&json!({ "email": email }))?;
        self.http.fetch(call).await
    }

    fn store_session(&self, response: &LoginResponse) -> Result<(), ApiError> {
        let token = response
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("response carries no token".into()))?;
        let email = response.user.as_ref().map(|u| u.email.as_str());
        self.http.tokens().set_token(token, email)?;
        Ok(())
    }

    /// End the session. The stored token is cleared even if the backend
    /// call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.http.execute(Call::post("/auth/logout")).await;
        self.http.tokens().clear()?;
        if let Err(e) = &result {
            warn!(error = %e, "logout call failed; local session cleared");
        }
        result?.check()
    }

    // ─── Profile ─────────────────────────────────────────────────────────────

    /// The logged-in account.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let envelope: UserEnvelope = self.http.get_json("/auth/me").await?;
        Ok(envelope.user)
    }

    /// Change profile fields.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let envelope: UserEnvelope = self.http.fetch(Call::put("/auth/profile").json(update)?).await?;
        Ok(envelope.user)
    }

    // ─── Password reset ──────────────────────────────────────────────────────

    /// Email a password-reset link.
    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::post("/auth/forgot-password")
            .public()
            .json(&json!({ "email": email }))?;
        self.http.fetch(call).await
    }

    /// Check a reset token before asking for the new password.
    pub async fn verify_reset_token(&self, token: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::post("/auth/verify-reset-token")
            .public()
            .json(&json!({ "token": token }))?;
        self.http.fetch(call).await
    }

    /// Set a new password with a reset token.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ApiError> {
        let call = Call::post("/auth/reset-password")
            .public()
            .json(&json!({ "token": token, "new_password": new_password }))?;
        self.http.fetch(call).await
    }

    // ─── Preferences ─────────────────────────────────────────────────────────

    /// Current preferences.
    pub async fn preferences(&self) -> Result<Preferences, ApiError> {
        let envelope: PreferencesEnvelope = self.http.get_json("/auth/preferences").await?;
        Ok(envelope.preferences)
    }

    /// Change preferences; unset fields are left alone.
    pub async fn update_preferences(&self, update: &Preferences) -> Result<Preferences, ApiError> {
        let call = Call::put("/auth/preferences").json(update)?;
        let envelope: PreferencesEnvelope = self.http.fetch(call).await?;
        Ok(envelope.preferences)
    }

    // ─── Account deletion ────────────────────────────────────────────────────

    /// Email a confirmation code for account deletion.
    pub async fn request_account_deletion(&self) -> Result<MessageResponse, ApiError> {
        self.http.fetch(Call::post("/auth/delete-account/request")).await
    }

    /// Delete the account with the emailed code, then drop the local session.
    pub async fn delete_account(&self, code: &str) -> Result<MessageResponse, ApiError> {
        let call = Call::delete("/auth/account").json(&json!({ "code": code }))?;
        let response: MessageResponse = self.http.fetch(call).await?;
        self.http.tokens().clear()?;
        Ok(response)
    }
}
