//! Real-time message channel.
//!
//! One spawned task per connection owns the socket. Outbound frames reach it
//! over an unbounded queue; state is published through a `watch` channel.
//! Every connection carries a generation number, and a task whose generation
//! is no longer current can neither change state nor emit events.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::Message;
use whatsmini_core::{ChannelState, ClientConfig, OutboundMessage, OutputSink, WidgetEvent};

use crate::{
    ChannelError,
    protocol::{InboundFrame, channel_url, encode_outbound},
};

/// How long `close` waits for the connection task before aborting it.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Result of a successful `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued for the socket.
    Transmitted,
    /// Empty text, nothing sent.
    Dropped,
}

enum Command {
    Send(String),
    Close,
}

struct Connection {
    generation: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct Shared {
    state: watch::Sender<ChannelState>,
    generation: AtomicU64,
    sink: Arc<dyn OutputSink>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Move to `to` if `generation` is still current. Returns whether the state changed.
    fn transition(&self, generation: u64, to: ChannelState) -> bool {
        let changed = self.state.send_if_modified(|state| {
            if !self.is_current(generation) || *state == to {
                return false;
            }
            *state = to;
            true
        });
        if changed {
            tracing::debug!(generation, state = %to, "channel state changed");
        }
        changed
    }

    /// Move to `to` regardless of generation.
    fn force(&self, to: ChannelState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == to {
                return false;
            }
            *state = to;
            true
        })
    }

    fn mark_closed(&self, generation: u64) {
        if self.transition(generation, ChannelState::Closed) {
            self.sink.emit(WidgetEvent::Closed);
        }
    }

    fn emit(&self, generation: u64, event: WidgetEvent) {
        if self.is_current(generation) {
            self.sink.emit(event);
        }
    }
}

/// Client side of the real-time message channel.
///
/// The channel never reconnects on its own; wrap it in a
/// [`ReconnectSupervisor`](crate::ReconnectSupervisor) for that.
pub struct RealtimeChannel {
    ws_base: String,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("ws_base", &self.ws_base)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RealtimeChannel {
    /// Create a disconnected channel for the given real-time origin.
    #[must_use]
    pub fn new(ws_base: impl Into<String>, sink: Arc<dyn OutputSink>) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            ws_base: ws_base.into(),
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
                sink,
            }),
            connection: Mutex::new(None),
        }
    }

    /// Create a channel for the configured real-time origin.
    #[must_use]
    pub fn from_config(config: &ClientConfig, sink: Arc<dyn OutputSink>) -> Self {
        Self::new(config.ws_base(), sink)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Wait until the channel has left `Connecting` and return the state reached.
    pub async fn wait_until_settled(&self) -> ChannelState {
        let mut state = self.subscribe_state();
        state
            .wait_for(|state| *state != ChannelState::Connecting)
            .await
            .map_or(ChannelState::Closed, |state| *state)
    }

    /// Open the channel with `token`.
    ///
    /// Any existing connection is closed first. Returns once the connection
    /// attempt has started; the outcome arrives through the sink and the
    /// state receiver.
    ///
    /// # Errors
    /// Returns `Precondition` if the token is absent or empty.
    pub async fn connect(&self, token: Option<&str>) -> Result<(), ChannelError> {
        let token = token.filter(|token| !token.is_empty()).ok_or(ChannelError::Precondition)?;

        if self.state() != ChannelState::Disconnected {
            self.close().await;
        }

        let url = channel_url(&self.ws_base, token);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let mut slot = self.lock_connection();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.force(ChannelState::Connecting);
        tracing::debug!(generation, "channel connecting");

        let task = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            generation,
            url,
            command_rx,
        ));
        if let Some(previous) = slot.replace(Connection {
            generation,
            commands,
            task,
        }) {
            tracing::debug!(generation = previous.generation, "aborting superseded connection");
            previous.task.abort();
        }
        Ok(())
    }

    /// Transmit one chat message.
    ///
    /// # Errors
    /// `NotConnected` unless the channel is `Open`, `Validation` for a blank
    /// recipient, `Encode` if the frame cannot be serialized.
    pub fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, ChannelError> {
        let state = self.state();
        if state != ChannelState::Open {
            return Err(ChannelError::NotConnected(state));
        }
        if message.to.trim().is_empty() {
            return Err(ChannelError::Validation("Recipient is required".to_string()));
        }
        if message.text.is_empty() {
            return Ok(SendOutcome::Dropped);
        }

        let frame = encode_outbound(message)?;
        let slot = self.lock_connection();
        let connection = slot
            .as_ref()
            .ok_or(ChannelError::NotConnected(ChannelState::Closed))?;
        connection
            .commands
            .send(Command::Send(frame))
            .map_err(|_| ChannelError::NotConnected(ChannelState::Closed))?;
        Ok(SendOutcome::Transmitted)
    }

    /// Close the channel. Valid in every state and idempotent.
    pub async fn close(&self) {
        let connection = self.lock_connection().take();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let changed = self.shared.force(ChannelState::Closed);

        let Some(mut connection) = connection else {
            return;
        };
        if changed {
            tracing::debug!(generation = connection.generation, "channel closed locally");
            self.shared.sink.emit(WidgetEvent::Closed);
        }

        let _ = connection.commands.send(Command::Close);
        if tokio::time::timeout(CLOSE_GRACE, &mut connection.task).await.is_err() {
            tracing::debug!(generation = connection.generation, "connection task did not stop, aborting");
            connection.task.abort();
        }
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.lock_connection().take() {
            connection.task.abort();
        }
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::warn!(generation, "channel connect failed: {e}");
            shared.emit(generation, WidgetEvent::TransportError(e.to_string()));
            shared.mark_closed(generation);
            return;
        }
    };

    if !shared.transition(generation, ChannelState::Open) {
        return;
    }
    shared.emit(generation, WidgetEvent::Connected);

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame.into())).await {
                        tracing::warn!(generation, "channel write failed: {e}");
                        shared.emit(generation, WidgetEvent::TransportError(e.to_string()));
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    if let Err(e) = write.close().await {
                        tracing::debug!(generation, "close frame not sent: {e}");
                    }
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.emit(generation, InboundFrame::decode(text.as_str()).into_event());
                }
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => shared.emit(generation, InboundFrame::decode(text).into_event()),
                    Err(e) => {
                        tracing::warn!(generation, len = data.len(), "binary frame is not UTF-8: {e}");
                        shared.emit(
                            generation,
                            WidgetEvent::Notice(format!("Ignored a binary frame that is not text ({} bytes)", data.len())),
                        );
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(generation, "channel read failed: {e}");
                    shared.emit(generation, WidgetEvent::TransportError(e.to_string()));
                    break;
                }
            },
        }
    }

    shared.mark_closed(generation);
}
