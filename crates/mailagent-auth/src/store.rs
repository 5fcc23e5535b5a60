//! Session token storage.
//!
//! The token is the only piece of client state the core needs. The file
//! store keeps `<data_dir>/auth.json` with 0o600 permissions and caches the
//! value in memory so lookups on the request path never touch the disk.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

/// Auth file name.
const AUTH_FILE_NAME: &str = "auth.json";

/// On-disk format version.
const STORAGE_VERSION: u32 = 1;

/// Get the auth file path under the given data directory.
pub fn auth_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(AUTH_FILE_NAME)
}

/// Where the bearer token lives.
pub trait TokenStore: Send + Sync {
    /// Current token, if logged in.
    fn token(&self) -> Option<String>;

    /// Replace the stored session.
    fn set_token(&self, token: &str, user_email: Option<&str>) -> Result<(), AuthError>;

    /// Forget the session.
    fn clear(&self) -> Result<(), AuthError>;
}

/// Persisted session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    /// Format version.
    pub version: u32,
    /// Bearer token.
    pub token: String,
    /// Email the token was issued for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    /// RFC 3339 timestamp of the last write.
    pub last_updated: String,
}

impl StoredSession {
    fn new(token: &str, user_email: Option<&str>) -> Self {
        Self {
            version: STORAGE_VERSION,
            token: token.to_string(),
            user_email: user_email.map(str::to_string),
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File store
// ─────────────────────────────────────────────────────────────────────────────

/// Token store backed by `auth.json`.
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<StoredSession>>,
}

impl FileTokenStore {
    /// Open the store at `path`, loading any existing session.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = load_session(&path);
        Self {
            path,
            cached: RwLock::new(cached),
        }
    }

    /// Open `<data_dir>/auth.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::open(auth_file_path(data_dir))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full stored session.
    pub fn session(&self) -> Option<StoredSession> {
        self.cached.read().clone()
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        self.cached.read().as_ref().map(|s| s.token.clone())
    }

    fn set_token(&self, token: &str, user_email: Option<&str>) -> Result<(), AuthError> {
        let session = StoredSession::new(token, user_email);
        save_session(&self.path, &session)?;
        *self.cached.write() = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.cached.write() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Load a session from file. Missing, unreadable, or foreign-version files
/// count as logged out.
fn load_session(path: &Path) -> Option<StoredSession> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("failed to read auth file: {e}");
            return None;
        }
    };

    match serde_json::from_str::<StoredSession>(&data) {
        Ok(session) if session.version == STORAGE_VERSION => Some(session),
        Ok(session) => {
            tracing::warn!("unsupported auth storage version: {}", session.version);
            None
        }
        Err(e) => {
            tracing::warn!("failed to parse auth file: {e}");
            None
        }
    }
}

fn save_session(path: &Path, session: &StoredSession) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory store
// ─────────────────────────────────────────────────────────────────────────────

/// In-process token store.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn set_token(&self, token: &str, _user_email: Option<&str>) -> Result<(), AuthError> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.token.write() = None;
        Ok(())
    }
}
