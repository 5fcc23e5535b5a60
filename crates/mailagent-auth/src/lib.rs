//! # mailagent-auth
//!
//! Session token storage and the login redirect hook.
//!
//! - [`TokenStore`]: where the bearer token lives ([`FileTokenStore`] on
//!   disk, [`MemoryTokenStore`] in-process)
//! - [`LoginRedirect`]: fired once per unauthorized reply

#![deny(unsafe_code)]

pub mod errors;
pub mod navigator;
pub mod store;

pub use errors::AuthError;
pub use navigator::{LoginRedirect, Navigator, RecordingNavigator};
pub use store::{FileTokenStore, MemoryTokenStore, StoredSession, TokenStore, auth_file_path};
