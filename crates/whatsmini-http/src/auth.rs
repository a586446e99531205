//! Register and login against the backend.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde_json::json;
use whatsmini_core::{RetryPolicy, Session};

use crate::{
    AuthError, HttpOutcome,
    client::{Method, Payload, ResilientHttpClient},
};

pub const REGISTER_PATH: &str = "/api/register";
pub const LOGIN_PATH: &str = "/api/login";

/// Single-flight flag for one operation kind.
#[derive(Debug, Default)]
struct InFlight(AtomicBool);

impl InFlight {
    fn acquire(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }
}

/// Clears the flag on drop, whichever way the call exits.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Register/login service.
///
/// Holds no session state: `login` hands the [`Session`] back to the caller,
/// which decides whether to persist it.
#[derive(Debug)]
pub struct AuthService {
    http: Arc<ResilientHttpClient>,
    policy: RetryPolicy,
    register_flight: InFlight,
    login_flight: InFlight,
}

impl AuthService {
    /// Create a new auth service.
    #[must_use]
    pub fn new(http: Arc<ResilientHttpClient>, policy: RetryPolicy) -> Self {
        Self {
            http,
            policy,
            register_flight: InFlight::default(),
            login_flight: InFlight::default(),
        }
    }

    /// Register a new account.
    ///
    /// # Errors
    /// `Validation` for blank input (no request is made), `Busy` while another
    /// register call is running, `Rejected` for a non-2xx response, `Network`
    /// once retries are exhausted.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let username = validate(username, password)?;
        let _guard = self.register_flight.acquire().ok_or(AuthError::Busy("register"))?;

        let outcome = self.post_credentials(REGISTER_PATH, username, password).await?;
        if !outcome.ok {
            return Err(rejected(&outcome));
        }

        tracing::info!(username, "registered");
        Ok(())
    }

    /// Log in and return the session from the response body.
    ///
    /// # Errors
    /// Same as [`register`](Self::register), plus `InvalidResponse` when a 2xx
    /// body lacks `token` or `username`.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = validate(username, password)?;
        let _guard = self.login_flight.acquire().ok_or(AuthError::Busy("login"))?;

        let outcome = self.post_credentials(LOGIN_PATH, username, password).await?;
        if !outcome.ok {
            return Err(rejected(&outcome));
        }

        let token = outcome.str_field("token").map(str::to_string);
        let user = outcome.str_field("username").map(str::to_string);
        let session = Session::from_parts(token, user).ok_or_else(|| {
            AuthError::InvalidResponse("login response is missing token or username".to_string())
        })?;

        tracing::info!(username = session.username(), "logged in");
        Ok(session)
    }

    async fn post_credentials(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<HttpOutcome, AuthError> {
        let body = json!({ "username": username, "password": password });
        Ok(self
            .http
            .execute(Method::POST, path, &Payload::Json(body), &self.policy)
            .await?)
    }
}

/// Trim the username and reject blank credentials.
fn validate<'a>(username: &'a str, password: &str) -> Result<&'a str, AuthError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::Validation(
            "Username and password must not be empty".to_string(),
        ));
    }
    Ok(username)
}

fn rejected(outcome: &HttpOutcome) -> AuthError {
    AuthError::Rejected {
        status: outcome.status,
        detail: outcome.detail(),
    }
}
