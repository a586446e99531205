//! In-memory session storage.

use std::sync::RwLock;

use async_trait::async_trait;
use whatsmini_core::{PersistenceError, Session, SessionStore};

/// In-memory storage implementation.
///
/// Useful for tests and embedders that persist elsewhere.
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `session`.
    #[must_use]
    pub const fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        *self
            .session
            .write()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))? = Some(session.clone());
        Ok(())
    }

    async fn load(&self) -> Option<Session> {
        self.session.read().ok()?.clone()
    }

    async fn clear(&self) -> Result<(), PersistenceError> {
        self.session
            .write()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?
            .take();
        Ok(())
    }
}
