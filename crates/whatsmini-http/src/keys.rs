//! Public-key lookup and best-effort upload.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use whatsmini_core::{RetryPolicy, Session};

use crate::{
    ApiError,
    client::{Method, Payload, ResilientHttpClient},
};

pub const KEYS_PATH: &str = "/api/keys";

/// Key directory client.
#[derive(Debug, Clone)]
pub struct KeyService {
    http: Arc<ResilientHttpClient>,
    policy: RetryPolicy,
}

impl KeyService {
    /// Create a new key service.
    #[must_use]
    pub const fn new(http: Arc<ResilientHttpClient>, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    /// Whether `user` has published a public key.
    ///
    /// # Errors
    /// `Validation` for a blank user, `Network` once retries are exhausted.
    pub async fn has_key(&self, user: &str) -> Result<bool, ApiError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(ApiError::Validation("Recipient must not be empty".to_string()));
        }

        let path = format!("{KEYS_PATH}/{}", urlencoding::encode(user));
        let outcome = self
            .http
            .execute(Method::GET, &path, &Payload::Empty, &self.policy)
            .await?;
        tracing::debug!(user, status = outcome.status, "key lookup");
        Ok(outcome.ok)
    }

    /// Publish the session's public key in the background.
    ///
    /// Failures are logged and never reach the caller; the handle is only
    /// useful for tests and shutdown.
    #[must_use = "dropping the handle detaches the upload"]
    pub fn upload_public_key(&self, session: &Session, public_key_jwk: Value) -> JoinHandle<()> {
        let http = Arc::clone(&self.http);
        let policy = self.policy;
        let body = json!({ "token": session.token(), "public_key_jwk": public_key_jwk });
        let username = session.username().to_string();

        tokio::spawn(async move {
            match http.execute(Method::POST, KEYS_PATH, &Payload::Json(body), &policy).await {
                Ok(outcome) if outcome.ok => tracing::debug!(%username, "public key uploaded"),
                Ok(outcome) => {
                    tracing::warn!(%username, status = outcome.status, "key upload rejected: {}", outcome.detail());
                }
                Err(e) => tracing::warn!(%username, "key upload failed: {e}"),
            }
        })
    }
}
