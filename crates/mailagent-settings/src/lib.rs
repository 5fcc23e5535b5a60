//! # mailagent-settings
//!
//! Client configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ClientSettings::default()`]
//! 2. **User file**: `~/.mailagent/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MAILAGENT_*`, then the web client's
//!    `VITE_API_URL` / `VITE_WS_URL`
//!
//! Binaries load settings once and hand them to the application context;
//! [`get_settings`] exists for code paths that have no context to hand.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    data_dir, deep_merge, home_dir, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ClientSettings> = OnceLock::new();

/// Get the global settings instance, loading on first access.
///
/// Falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static ClientSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ClientSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ClientSettings) -> std::result::Result<(), ClientSettings> {
    SETTINGS.set(settings)
}
