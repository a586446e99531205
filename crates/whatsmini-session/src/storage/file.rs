//! JSON file session storage (feature-gated).
//!
//! The record keeps token and username as two optional entries, so a file
//! written by an older client with only one of them loads as "no session".

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use whatsmini_core::{ClientConfig, PersistenceError, Session, SessionStore};

/// File name used under the platform data directory.
pub const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

/// Session stored as a JSON file readable only by the owner.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data_dir>/whatsmini/session.json`, if the platform has a data dir.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("whatsmini").join(SESSION_FILE_NAME))
    }

    /// Store at the configured `session_file`, else the default path.
    ///
    /// # Errors
    /// Returns `Unavailable` when neither is known.
    pub fn from_config(config: &ClientConfig) -> Result<Self, PersistenceError> {
        config
            .session_file
            .clone()
            .or_else(Self::default_path)
            .map(Self::new)
            .ok_or_else(|| PersistenceError::Unavailable("no data directory for the session file".to_string()))
    }

    /// Location of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        let record = SessionRecord {
            token: Some(session.token().to_string()),
            username: Some(session.username().to_string()),
        };
        self.write_record(&record).await?;
        tracing::debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    async fn load(&self) -> Option<Session> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "session file unreadable: {e}");
                return None;
            }
        };

        match serde_json::from_slice::<SessionRecord>(&bytes) {
            Ok(record) => Session::from_parts(record.token, record.username),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "session file corrupt: {e}");
                None
            }
        }
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
