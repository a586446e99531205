//! Reconnection with exponential backoff, layered over a channel.

use std::sync::Arc;

use tokio::{sync::oneshot, task::JoinHandle};
use whatsmini_core::{BackoffPolicy, ChannelState};

use crate::RealtimeChannel;

/// Keeps a channel connected.
///
/// Connects on spawn and reconnects after every close it did not request,
/// waiting `policy.delay_for(failures)` in between. The failure counter
/// resets whenever the channel reaches `Open`. Dropping the supervisor ends
/// supervision but leaves the channel as it is; `stop` also closes it.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    channel: Arc<RealtimeChannel>,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Start supervising `channel` with `token`.
    #[must_use]
    pub fn spawn(channel: Arc<RealtimeChannel>, token: impl Into<String>, policy: BackoffPolicy) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(Arc::clone(&channel), token.into(), policy, stop_rx));
        Self {
            channel,
            stop_tx,
            task,
        }
    }

    /// Whether the supervision loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop reconnecting and close the channel.
    pub async fn stop(self) {
        let Self {
            channel,
            stop_tx,
            task,
        } = self;
        let _ = stop_tx.send(());
        if let Err(e) = task.await {
            tracing::error!("reconnect supervisor task failed: {e}");
        }
        channel.close().await;
    }
}

async fn supervise(
    channel: Arc<RealtimeChannel>,
    token: String,
    policy: BackoffPolicy,
    mut stop: oneshot::Receiver<()>,
) {
    let mut failures: u32 = 0;
    loop {
        if let Err(e) = channel.connect(Some(&token)).await {
            tracing::error!("reconnect supervisor cannot connect: {e}");
            return;
        }

        let mut state = channel.subscribe_state();
        let mut opened = false;
        loop {
            match *state.borrow_and_update() {
                ChannelState::Open => opened = true,
                ChannelState::Closed => break,
                ChannelState::Disconnected | ChannelState::Connecting => {}
            }
            tokio::select! {
                _ = &mut stop => return,
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        failures = if opened { 0 } else { failures.saturating_add(1) };
        if !policy.allows(failures) {
            tracing::warn!(failures, "giving up on channel reconnection");
            return;
        }

        let delay = policy.delay_for(failures);
        tracing::info!(failures, delay_ms = delay.as_millis(), "channel closed, reconnecting");
        tokio::select! {
            _ = &mut stop => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}
