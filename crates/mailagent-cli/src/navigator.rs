//! Login redirect for a terminal session.

use std::sync::Arc;

use mailagent_auth::{Navigator, TokenStore};

/// There is no login page to navigate to, so "redirecting" drops the
/// rejected token and tells the user how to sign in again.
pub(crate) struct TerminalNavigator {
    tokens: Arc<dyn TokenStore>,
}

impl TerminalNavigator {
    pub(crate) fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }
}

impl Navigator for TerminalNavigator {
    fn redirect(&self, route: &str) {
        if let Err(e) = self.tokens.clear() {
            tracing::warn!(error = %e, "failed to clear rejected token");
        }
        eprintln!("Session expired or invalid ({route}). Run `mailagent login` to sign in again.");
    }
}
