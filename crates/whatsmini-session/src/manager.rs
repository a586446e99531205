//! Session manager driving the chat widget.
//!
//! Owns the current session and wires the store, the HTTP services and the
//! real-time channel together. Every user-visible outcome is emitted to the
//! output sink; no failure leaves the manager unusable.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use whatsmini_core::{
    BackoffPolicy, ChannelState, ClientConfig, OutboundMessage, OutputSink, Session, SessionStore, WidgetEvent,
};
use whatsmini_http::{ApiError, AuthError, AuthService, KeyService, ResilientHttpClient, UploadService};
use whatsmini_realtime::{ChannelError, RealtimeChannel, ReconnectSupervisor, SendOutcome};

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Log in first")]
    NotLoggedIn,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Widget controller for one user.
pub struct SessionManager<S>
where
    S: SessionStore,
{
    store: S,
    auth: AuthService,
    keys: KeyService,
    uploads: UploadService,
    channel: Arc<RealtimeChannel>,
    sink: Arc<dyn OutputSink>,
    reconnect: Option<BackoffPolicy>,
    public_key: Option<Value>,
    session: RwLock<Option<Session>>,
    supervisor: Mutex<Option<ReconnectSupervisor>>,
}

impl<S> SessionManager<S>
where
    S: SessionStore,
{
    /// Create a manager for the configured backend.
    ///
    /// The channel reconnects on its own only when `config.auto_reconnect`
    /// is set.
    #[must_use]
    pub fn new(store: S, config: &ClientConfig, sink: Arc<dyn OutputSink>) -> Self {
        let http = Arc::new(ResilientHttpClient::new(config));
        Self {
            store,
            auth: AuthService::new(Arc::clone(&http), config.retry),
            keys: KeyService::new(Arc::clone(&http), config.retry),
            uploads: UploadService::new(http, config.retry),
            channel: Arc::new(RealtimeChannel::from_config(config, Arc::clone(&sink))),
            sink,
            reconnect: config.auto_reconnect.then_some(config.reconnect),
            public_key: None,
            session: RwLock::new(None),
            supervisor: Mutex::new(None),
        }
    }

    /// Publish `jwk` as this user's public key after every login or restore.
    #[must_use]
    pub fn with_public_key(mut self, jwk: Value) -> Self {
        self.public_key = Some(jwk);
        self
    }

    /// The current session, if logged in.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Current channel state.
    #[must_use]
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &Arc<RealtimeChannel> {
        &self.channel
    }

    /// Resume the stored session, if there is one.
    ///
    /// Returns whether a session was restored.
    pub async fn restore(&self) -> bool {
        let Some(session) = self.store.load().await else {
            return false;
        };
        tracing::info!(username = session.username(), "restoring stored session");
        let status = format!("Logged in as {}", session.username());
        self.start(session).await;
        self.sink.emit(WidgetEvent::AuthStatus(status));
        true
    }

    /// Create an account.
    ///
    /// # Errors
    /// Returns the `AuthError` after emitting it as an auth status line.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ManagerError> {
        match self.auth.register(username, password).await {
            Ok(()) => {
                self.sink
                    .emit(WidgetEvent::AuthStatus("Registered. You can log in now.".to_string()));
                Ok(())
            }
            Err(e) => {
                self.sink.emit(WidgetEvent::AuthStatus(format!("Register failed: {e}")));
                Err(e.into())
            }
        }
    }

    /// Log in, persist the session and open the channel.
    ///
    /// A session that cannot be persisted is kept in memory.
    ///
    /// # Errors
    /// Returns the `AuthError` after emitting it as an auth status line.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ManagerError> {
        let session = match self.auth.login(username, password).await {
            Ok(session) => session,
            Err(e) => {
                self.sink.emit(WidgetEvent::AuthStatus(format!("Login failed: {e}")));
                return Err(e.into());
            }
        };

        if let Err(e) = self.store.save(&session).await {
            tracing::warn!("session not persisted, keeping it in memory: {e}");
        }
        self.start(session.clone()).await;
        self.sink.emit(WidgetEvent::AuthStatus("Login OK".to_string()));
        Ok(session)
    }

    /// Close the channel and forget the session.
    pub async fn logout(&self) {
        let supervisor = self.supervisor.lock().await.take();
        match supervisor {
            Some(supervisor) => supervisor.stop().await,
            None => self.channel.close().await,
        }

        if let Err(e) = self.store.clear().await {
            tracing::warn!("stored session not cleared: {e}");
        }
        self.session.write().await.take();
        self.sink.emit(WidgetEvent::AuthStatus("Logged out.".to_string()));
    }

    /// Send a chat message over the channel.
    ///
    /// # Errors
    /// Returns the `ChannelError` after emitting it as a notice.
    pub fn send(&self, to: &str, text: &str) -> Result<SendOutcome, ManagerError> {
        let message = OutboundMessage::new(to.trim(), text);
        match self.channel.send(&message) {
            Ok(SendOutcome::Transmitted) => {
                self.sink.emit(WidgetEvent::Outgoing(message));
                Ok(SendOutcome::Transmitted)
            }
            Ok(SendOutcome::Dropped) => Ok(SendOutcome::Dropped),
            Err(e) => {
                self.sink.emit(WidgetEvent::Notice(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Look up whether `user` has published a key and report it.
    ///
    /// # Errors
    /// Returns the `ApiError` after emitting it as a key status line.
    pub async fn check_key(&self, user: &str) -> Result<bool, ManagerError> {
        let user = user.trim();
        match self.keys.has_key(user).await {
            Ok(true) => {
                self.sink.emit(WidgetEvent::KeyStatus(format!("{user} has a key")));
                Ok(true)
            }
            Ok(false) => {
                self.sink
                    .emit(WidgetEvent::KeyStatus(format!("No key for {user}. Have they logged in?")));
                Ok(false)
            }
            Err(e) => {
                self.sink.emit(WidgetEvent::KeyStatus(format!("Key lookup failed: {e}")));
                Err(e.into())
            }
        }
    }

    /// Upload a file and send its link to `to`.
    ///
    /// Returns the absolute URL of the uploaded file.
    ///
    /// # Errors
    /// `NotLoggedIn` without a session, `Channel` for a blank recipient or
    /// a link that cannot be sent, `Api` if the upload fails. Each is
    /// emitted as a notice first.
    pub async fn upload_and_share(
        &self,
        to: &str,
        file_name: &str,
        bytes: impl Into<Bytes>,
    ) -> Result<String, ManagerError> {
        let Some(session) = self.session().await else {
            self.sink.emit(WidgetEvent::Notice(ManagerError::NotLoggedIn.to_string()));
            return Err(ManagerError::NotLoggedIn);
        };
        let to = to.trim();
        if to.is_empty() {
            let e = ChannelError::Validation("Recipient is required".to_string());
            self.sink.emit(WidgetEvent::Notice(e.to_string()));
            return Err(e.into());
        }

        let url = match self.uploads.upload(&session, file_name, bytes).await {
            Ok(url) => url,
            Err(e) => {
                self.sink.emit(WidgetEvent::Notice(format!("Upload failed: {e}")));
                return Err(e.into());
            }
        };

        let message = OutboundMessage::new(to, format!("File: {url}"));
        match self.channel.send(&message) {
            Ok(_) => {
                self.sink.emit(WidgetEvent::Outgoing(message));
                Ok(url)
            }
            Err(e) => {
                self.sink.emit(WidgetEvent::Notice(format!("Link not sent: {e}")));
                Err(e.into())
            }
        }
    }

    async fn start(&self, session: Session) {
        *self.session.write().await = Some(session.clone());
        self.connect(&session).await;

        if let Some(jwk) = &self.public_key {
            // Detached; failures are logged by the key service.
            drop(self.keys.upload_public_key(&session, jwk.clone()));
        }
    }

    async fn connect(&self, session: &Session) {
        let previous = self.supervisor.lock().await.take();
        if let Some(previous) = previous {
            previous.stop().await;
        }

        match self.reconnect {
            Some(policy) => {
                let supervisor = ReconnectSupervisor::spawn(Arc::clone(&self.channel), session.token(), policy);
                *self.supervisor.lock().await = Some(supervisor);
            }
            None => {
                if let Err(e) = self.channel.connect(Some(session.token())).await {
                    tracing::warn!("channel not opened: {e}");
                    self.sink.emit(WidgetEvent::Notice(e.to_string()));
                }
            }
        }
    }
}
