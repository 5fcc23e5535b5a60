//! # mailagent-api
//!
//! REST side of the mailagent client.
//!
//! - [`AuthedHttp`]: one `reqwest` client carrying the bearer token, with a
//!   single place that turns a 401 into the login redirect
//! - Typed clients borrowing it: [`AuthClient`], [`EnvVarsClient`],
//!   [`EmailConfigsClient`], [`EmailsClient`], [`ChatHistoryClient`],
//!   [`LogsClient`], plus [`health::status`]
//! - [`ApiClient`] bundles them for callers that want one handle

#![deny(unsafe_code)]

pub mod auth;
pub mod chat_history;
mod de;
pub mod email_configs;
pub mod emails;
pub mod env_vars;
pub mod errors;
pub mod health;
pub mod http;
pub mod logs;

use std::sync::Arc;

use mailagent_auth::{LoginRedirect, TokenStore};
use mailagent_settings::ClientSettings;

pub use auth::{AuthClient, LoginResponse, MessageResponse, Preferences, ProfileUpdate, Registration, User};
pub use chat_history::{ChatHistoryClient, ChatMessage, ChatPage, ChatSender, MessageKind, SaveChatMessage};
pub use email_configs::{EmailConfig, EmailConfigsClient};
pub use emails::{EmailPage, EmailPatch, EmailRecord, EmailStatus, EmailsClient, SaveEmail, UsageStats};
pub use env_vars::{EnvVar, EnvVarsClient};
pub use errors::ApiError;
pub use health::OnlineStatus;
pub use http::{AuthedHttp, Call, HttpResponse};
pub use logs::{LogCategory, LogEntry, LogFilters, LogLevel, LogStats, LogStatus, LogsClient};

/// Handle over every REST client, sharing one [`AuthedHttp`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: AuthedHttp,
}

impl ApiClient {
    /// Wrap an existing HTTP wrapper.
    pub fn new(http: AuthedHttp) -> Self {
        Self { http }
    }

    /// Build from settings.
    pub fn from_settings(
        settings: &ClientSettings,
        tokens: Arc<dyn TokenStore>,
        login: LoginRedirect,
    ) -> Result<Self, ApiError> {
        Ok(Self::new(AuthedHttp::new(settings, tokens, login)?))
    }

    /// The shared HTTP wrapper.
    pub fn http(&self) -> &AuthedHttp {
        &self.http
    }

    /// `/auth`.
    pub fn auth(&self) -> AuthClient<'_> {
        AuthClient::new(&self.http)
    }

    /// `/env-vars`.
    pub fn env_vars(&self) -> EnvVarsClient<'_> {
        EnvVarsClient::new(&self.http)
    }

    /// `/email-configs`.
    pub fn email_configs(&self) -> EmailConfigsClient<'_> {
        EmailConfigsClient::new(&self.http)
    }

    /// `/emails`.
    pub fn emails(&self) -> EmailsClient<'_> {
        EmailsClient::new(&self.http)
    }

    /// `/chat/messages`.
    pub fn chat_history(&self) -> ChatHistoryClient<'_> {
        ChatHistoryClient::new(&self.http)
    }

    /// `/logs`.
    pub fn logs(&self) -> LogsClient<'_> {
        LogsClient::new(&self.http)
    }

    /// `/health/status`.
    pub async fn health(&self) -> Result<OnlineStatus, ApiError> {
        health::status(&self.http).await
    }
}
