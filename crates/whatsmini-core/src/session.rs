//! Authenticated session value.

use std::fmt;

/// Authenticated identity for the current user.
///
/// A session is never partially valid: both the token and the username are
/// non-empty, and the only way to build one is through the checked
/// constructors below.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
    username: String,
}

impl Session {
    /// Create a session, rejecting empty fields.
    #[must_use]
    pub fn new(token: impl Into<String>, username: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let username = username.into();
        if token.is_empty() || username.is_empty() {
            return None;
        }
        Some(Self { token, username })
    }

    /// Build a session from two independently stored fields.
    ///
    /// Returns `None` unless both are present and non-empty.
    #[must_use]
    pub fn from_parts(token: Option<String>, username: Option<String>) -> Option<Self> {
        Self::new(token?, username?)
    }

    /// Bearer token used for the real-time channel and authenticated calls.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Username the backend associated with the token.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Split into `(token, username)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String) {
        (self.token, self.username)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}
