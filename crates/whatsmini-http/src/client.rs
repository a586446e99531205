//! HTTP executor with per-attempt timeout, bounded retries and a wake request.
//!
//! The backend sleeps when idle and can take tens of seconds to answer its
//! first request. Mutating requests are preceded by a detached GET against a
//! cheap path. The request waits for it at most one attempt timeout, so the
//! cold start is absorbed outside the retry budget without ever blocking it.
//! Retries cover transport failures only; any response with a status line is
//! returned to the caller as an [`HttpOutcome`].

use std::{error::Error as _, fmt};

use bytes::Bytes;
use reqwest::{
    Client, RequestBuilder,
    multipart::{Form, Part},
};
use serde_json::Value;
use tokio::task::JoinHandle;
use whatsmini_core::{ClientConfig, RetryPolicy};

pub use reqwest::Method;

use crate::{HttpOutcome, NetworkError};

/// Multipart form with a single file part, rebuilt for every attempt.
#[derive(Debug, Clone)]
pub struct UploadForm {
    fields: Vec<(String, String)>,
    file_field: String,
    file_name: String,
    mime: String,
    bytes: Bytes,
}

impl UploadForm {
    /// Form carrying `bytes` under the `file` field.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let file_name = file_name.into();
        let mime = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            fields: Vec::new(),
            file_field: "file".to_string(),
            file_name,
            mime,
            bytes: bytes.into(),
        }
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Guessed content type of the file part.
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    fn to_form(&self) -> Form {
        let form = self
            .fields
            .iter()
            .fold(Form::new(), |form, (name, value)| form.text(name.clone(), value.clone()));

        let file_part = || Part::stream(self.bytes.clone()).file_name(self.file_name.clone());
        let part = file_part().mime_str(&self.mime).unwrap_or_else(|e| {
            tracing::warn!(mime = %self.mime, "Unusable upload content type: {e}");
            file_part()
        });
        form.part(self.file_field.clone(), part)
    }
}

/// Request body of a logical operation.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Multipart(UploadForm),
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptFailure {
    Timeout,
    Transport(String),
}

impl AttemptFailure {
    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        // reqwest's top-level message is generic; the cause carries the useful part.
        let mut reason = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Transport(reason)
    }

    fn into_error(self, attempts: u32) -> NetworkError {
        match self {
            Self::Timeout => NetworkError::Timeout { attempts },
            Self::Transport(reason) => NetworkError::Transport { attempts, reason },
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Transport(reason) => f.write_str(reason),
        }
    }
}

/// HTTP executor for one backend origin.
#[derive(Debug, Clone)]
pub struct ResilientHttpClient {
    http: Client,
    base_url: String,
    wake_path: String,
}

impl ResilientHttpClient {
    /// Create a client for the configured backend.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), config.api_base(), &config.wake_path)
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(http: Client, base_url: &str, wake_path: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            wake_path: wake_path.to_string(),
        }
    }

    /// Backend origin, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Execute one logical operation.
    ///
    /// Non-GET/HEAD requests are preceded by the wake request. Each attempt is
    /// bounded by `policy.timeout()`; transport failures are retried up to
    /// `policy.max_retries` times with `policy.retry_delay()` between attempts.
    ///
    /// # Errors
    /// Returns [`NetworkError`] once every attempt failed in transport. A
    /// response with any status code is never an error.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: &Payload,
        policy: &RetryPolicy,
    ) -> Result<HttpOutcome, NetworkError> {
        if !matches!(method, Method::GET | Method::HEAD) {
            // Dropping the handle on timeout leaves the request running detached.
            if tokio::time::timeout(policy.timeout(), self.spawn_wake()).await.is_err() {
                tracing::debug!(path, "wake request still pending, starting request");
            }
        }

        let url = self.url(path);
        let attempts = policy.attempts();
        let mut attempt = 1;
        loop {
            match self.attempt(&method, &url, payload, policy).await {
                Ok(outcome) => {
                    tracing::debug!(%method, %url, attempt, status = outcome.status, "request completed");
                    return Ok(outcome);
                }
                Err(failure) if attempt < attempts => {
                    tracing::warn!(%method, %url, attempt, attempts, "request failed ({failure}), retrying");
                    tokio::time::sleep(policy.retry_delay()).await;
                    attempt += 1;
                }
                Err(failure) => {
                    tracing::warn!(%method, %url, attempts, "request failed ({failure}), giving up");
                    return Err(failure.into_error(attempt));
                }
            }
        }
    }

    /// Single attempt. The timer covers sending and reading the whole body, and
    /// is dropped on every exit path along with the in-flight request.
    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        payload: &Payload,
        policy: &RetryPolicy,
    ) -> Result<HttpOutcome, AttemptFailure> {
        let request = async {
            let response = self.build(method, url, payload).send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>(HttpOutcome::from_text(status, text))
        };

        match tokio::time::timeout(policy.timeout(), request).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(AttemptFailure::from_reqwest(&e)),
            Err(_elapsed) => Err(AttemptFailure::Timeout),
        }
    }

    fn build(&self, method: &Method, url: &str, payload: &Payload) -> RequestBuilder {
        let request = self.http.request(method.clone(), url);
        match payload {
            Payload::Empty => request,
            Payload::Json(body) => request.json(body),
            Payload::Multipart(form) => request.multipart(form.to_form()),
        }
    }

    /// Best-effort GET to wake a sleeping backend. Outcome is discarded.
    fn spawn_wake(&self) -> JoinHandle<()> {
        let http = self.http.clone();
        let url = self.url(&self.wake_path);
        tokio::spawn(async move {
            match http.get(&url).send().await {
                Ok(response) => tracing::debug!(%url, status = %response.status(), "wake request answered"),
                Err(e) => tracing::debug!(%url, "wake request failed: {e}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::ResponseBody;

    fn client_for(server: &MockServer) -> ResilientHttpClient {
        ResilientHttpClient::with_client(Client::new(), &server.uri(), "/")
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(100, max_retries, 5)
    }

    #[tokio::test]
    async fn test_timeout_fails_after_every_attempt() {
        for max_retries in [0, 1, 3] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/slow"))
                .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1_000)))
                .expect(u64::from(max_retries) + 1)
                .mount(&server)
                .await;

            let err = client_for(&server)
                .execute(Method::GET, "/api/slow", &Payload::Empty, &fast_policy(max_retries))
                .await
                .unwrap_err();

            assert_eq!(err, NetworkError::Timeout { attempts: max_retries + 1 });
            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_well_formed_responses_are_never_retried() {
        for status in [200, 201, 400, 401, 404, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/api/thing"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"detail": "nope"})))
                .expect(1)
                .mount(&server)
                .await;

            let outcome = client_for(&server)
                .execute(Method::GET, "/api/thing", &Payload::Empty, &fast_policy(3))
                .await
                .unwrap();

            assert_eq!(outcome.status, status);
            assert_eq!(outcome.ok, (200..300).contains(&status));
            server.verify().await;
        }
    }

    #[tokio::test]
    async fn test_non_json_body_surfaces_raw() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/html"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<h1>Bad Gateway</h1>"))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .execute(Method::GET, "/api/html", &Payload::Empty, &fast_policy(0))
            .await
            .unwrap();

        assert_eq!(outcome.body, ResponseBody::Raw("<h1>Bad Gateway</h1>".into()));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1_000)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .execute(Method::GET, "/api/flaky", &Payload::Empty, &fast_policy(2))
            .await
            .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.json(), Some(&json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_post_is_preceded_by_wake_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .execute(Method::POST, "/api/echo", &Payload::Json(json!({"a": 1})), &fast_policy(0))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method.as_str(), "GET");
        assert_eq!(requests[0].url.path(), "/");
        assert_eq!(requests[1].method.as_str(), "POST");
    }

    #[tokio::test]
    async fn test_get_skips_wake_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/keys/bob"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .execute(Method::GET, "/api/keys/bob", &Payload::Empty, &fast_policy(0))
            .await
            .unwrap();
        server.verify().await;
    }

    #[tokio::test]
    async fn test_failed_wake_request_does_not_block_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("waking up"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t"})))
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .execute(Method::POST, "/api/login", &Payload::Json(json!({})), &fast_policy(0))
            .await
            .unwrap();
        assert_eq!(outcome.str_field("token"), Some("t"));
    }

    #[tokio::test]
    async fn test_post_times_out_against_silent_backend() {
        // Accepts connections and never answers, so the wake request hangs too.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let client = ResilientHttpClient::with_client(Client::new(), &base, "/");

        let started = tokio::time::Instant::now();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            client.execute(Method::POST, "/api/login", &Payload::Json(json!({})), &fast_policy(1)),
        )
        .await
        .expect("POST must give up within its retry budget")
        .unwrap_err();

        assert_eq!(err, NetworkError::Timeout { attempts: 2 });
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_slow_wake_request_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/register"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let started = tokio::time::Instant::now();
        let outcome = client_for(&server)
            .execute(Method::POST, "/api/register", &Payload::Json(json!({})), &fast_policy(0))
            .await
            .unwrap();

        assert_eq!(outcome.status, 201);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Nothing listens on port 1.
        let client = ResilientHttpClient::with_client(Client::new(), "http://127.0.0.1:1", "/");

        let err = client
            .execute(Method::POST, "/api/login", &Payload::Empty, &RetryPolicy::new(2_000, 1, 5))
            .await
            .unwrap_err();

        assert!(!err.is_timeout(), "expected a transport failure, got: {err}");
        assert_eq!(err.attempts(), 2);
    }

    #[test]
    fn test_url_joining() {
        let client = ResilientHttpClient::with_client(Client::new(), "https://api.example/", "/");
        assert_eq!(client.base_url(), "https://api.example");
        assert_eq!(client.url("/api/login"), "https://api.example/api/login");
        assert_eq!(client.url("api/login"), "https://api.example/api/login");
    }

    #[test]
    fn test_upload_form_guesses_mime() {
        assert_eq!(UploadForm::new("photo.png", Bytes::new()).mime(), "image/png");
        assert_eq!(UploadForm::new("blob", Bytes::new()).mime(), "application/octet-stream");
    }
}
