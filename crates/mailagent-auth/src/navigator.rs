//! Login redirection.
//!
//! Both the realtime session and the HTTP client send the user to the
//! login route when the server rejects their credentials. How that happens
//! depends on the host: a terminal clears the session and prints a hint, a
//! test records the call.

use std::sync::Arc;

use parking_lot::Mutex;

/// Moves the user to a route.
pub trait Navigator: Send + Sync {
    /// Navigate to `route`.
    fn redirect(&self, route: &str);
}

/// Handle shared by everything that can observe an unauthorized reply.
#[derive(Clone)]
pub struct LoginRedirect {
    navigator: Arc<dyn Navigator>,
    route: String,
}

impl LoginRedirect {
    /// Redirect to `route` through `navigator`.
    pub fn new(navigator: Arc<dyn Navigator>, route: impl Into<String>) -> Self {
        Self {
            navigator,
            route: route.into(),
        }
    }

    /// The login route.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Send the user to the login route.
    pub fn trigger(&self, source: &'static str) {
        tracing::warn!(source, route = %self.route, "unauthorized, redirecting to login");
        self.navigator.redirect(&self.route);
    }
}

impl std::fmt::Debug for LoginRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRedirect")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

/// Navigator that only remembers where it was sent.
#[derive(Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes visited so far, oldest first.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }

    /// Number of redirects.
    pub fn count(&self) -> usize {
        self.visits.lock().len()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, route: &str) {
        self.visits.lock().push(route.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_uses_configured_route() {
        let nav = Arc::new(RecordingNavigator::new());
        let redirect = LoginRedirect::new(nav.clone(), "/login");
        redirect.trigger("test");
        redirect.clone().trigger("test");
        assert_eq!(nav.visits(), vec!["/login", "/login"]);
        assert_eq!(redirect.route(), "/login");
    }

    #[test]
    fn debug_hides_navigator() {
        let redirect = LoginRedirect::new(Arc::new(RecordingNavigator::new()), "/signin");
        let s = format!("{redirect:?}");
        assert!(s.contains("/signin"));
    }
}
