//! File upload.

use std::sync::Arc;

use bytes::Bytes;
use whatsmini_core::{RetryPolicy, Session};

use crate::{
    ApiError,
    client::{Method, Payload, ResilientHttpClient, UploadForm},
};

pub const UPLOAD_PATH: &str = "/api/upload";

/// Multipart upload client.
#[derive(Debug, Clone)]
pub struct UploadService {
    http: Arc<ResilientHttpClient>,
    policy: RetryPolicy,
}

impl UploadService {
    /// Create a new upload service.
    #[must_use]
    pub const fn new(http: Arc<ResilientHttpClient>, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    /// Upload a file and return its absolute URL.
    ///
    /// The backend answers with a path relative to its origin; it is prefixed
    /// with the API base here.
    ///
    /// # Errors
    /// `Validation` for a blank file name, `Rejected` for a non-2xx response,
    /// `InvalidResponse` when the body has no `url`, `Network` once retries
    /// are exhausted.
    pub async fn upload(
        &self,
        session: &Session,
        file_name: &str,
        bytes: impl Into<Bytes>,
    ) -> Result<String, ApiError> {
        if file_name.trim().is_empty() {
            return Err(ApiError::Validation("Choose a file to upload".to_string()));
        }

        let form = UploadForm::new(file_name, bytes).text("token", session.token());
        let outcome = self
            .http
            .execute(Method::POST, UPLOAD_PATH, &Payload::Multipart(form), &self.policy)
            .await?;

        if !outcome.ok {
            return Err(ApiError::Rejected {
                status: outcome.status,
                detail: outcome.detail(),
            });
        }

        let url = outcome
            .str_field("url")
            .ok_or_else(|| ApiError::InvalidResponse("upload response has no url".to_string()))?;
        tracing::info!(file_name, url, "file uploaded");
        Ok(self.absolute(url))
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.http.url(url)
        }
    }
}
