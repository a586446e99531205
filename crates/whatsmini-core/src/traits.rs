//! Core traits for session persistence and UI output.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Session, WidgetEvent};

/// Session persistence error.
///
/// Callers treat this as non-fatal: the session stays usable in memory.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Session storage unavailable: {0}")]
    Unavailable(String),
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session record encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trait for session persistence backends.
///
/// Implementations hold at most one session and never hand back a
/// partially populated one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist token and username.
    async fn save(&self, session: &Session) -> Result<(), PersistenceError>;

    /// Load the stored session, if both fields are present.
    async fn load(&self) -> Option<Session>;

    /// Remove both fields. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), PersistenceError>;
}

/// Receiver for status and message lines rendered by the UI layer.
pub trait OutputSink: Send + Sync {
    /// Surface one line.
    fn emit(&self, event: WidgetEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&self, _event: WidgetEvent) {}
}
