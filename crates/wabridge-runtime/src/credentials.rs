//! Pairing credential persistence.
//!
//! The transport hands over an opaque JSON blob whenever its credentials
//! change. It is written to `<session_path>/creds.json` with 0o600
//! permissions and replayed on the next `initialize`.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

/// Credential file name inside the session directory.
pub const CREDENTIALS_FILE_NAME: &str = "creds.json";

/// Errors writing or deleting the credential file.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The blob could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-backed credential store for one session.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store rooted at a session directory.
    pub fn new(session_dir: &Path) -> Self {
        Self {
            path: session_dir.join(CREDENTIALS_FILE_NAME),
        }
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials.
    ///
    /// Returns `None` if the file doesn't exist or is invalid.
    pub fn load(&self) -> Option<Value> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read credentials: {e}");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Null) => None,
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(path = %self.path.display(), "failed to parse credentials: {e}");
                None
            }
        }
    }

    /// Persist credentials, creating the session directory if needed.
    pub fn save(&self, creds: &Value) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(creds)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    /// Delete stored credentials. A missing file is not an error.
    pub fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "credentials cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
