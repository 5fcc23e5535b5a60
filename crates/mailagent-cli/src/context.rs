//! Application context, built once at startup and passed to every command.

use std::sync::Arc;

use anyhow::{Context, Result};
use mailagent_api::ApiClient;
use mailagent_auth::{FileTokenStore, LoginRedirect, TokenStore};
use mailagent_realtime::{RealtimeSession, SessionConfig, Transport, WsTransport};
use mailagent_settings::{ClientSettings, data_dir};

use crate::navigator::TerminalNavigator;

/// Everything a command needs: settings, the token store, and both
/// backend clients sharing one login redirect.
pub(crate) struct AppContext {
    pub settings: ClientSettings,
    pub tokens: Arc<FileTokenStore>,
    pub api: ApiClient,
    pub realtime: RealtimeSession,
}

impl AppContext {
    pub(crate) fn new(settings: ClientSettings) -> Result<Self> {
        Self::with_transport(settings, Arc::new(WsTransport))
    }

    /// Like [`new`](Self::new) with the realtime socket opened through
    /// `transport`.
    pub(crate) fn with_transport(
        settings: ClientSettings,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let dir = data_dir(&settings);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

        let tokens = Arc::new(FileTokenStore::in_dir(&dir));
        let store: Arc<dyn TokenStore> = tokens.clone();
        let login = LoginRedirect::new(
            Arc::new(TerminalNavigator::new(store.clone())),
            settings.login_route.clone(),
        );

        let api = ApiClient::from_settings(&settings, store.clone(), login.clone())
            .context("Failed to build REST client")?;
        let realtime =
            RealtimeSession::new(SessionConfig::from_settings(&settings), transport, store, login);

        Ok(Self {
            settings,
            tokens,
            api,
            realtime,
        })
    }

    /// Stop background work before exit.
    pub(crate) fn shutdown(&self) {
        self.realtime.shutdown();
    }
}
