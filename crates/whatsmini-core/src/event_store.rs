//! Transcript of widget lines with live fan-out.
//!
//! A front end that attaches late (or re-renders after a restore) replays the
//! transcript and then follows new lines. Appending and subscribing happen
//! under the same lock, so a replay never misses or repeats a line.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::{StreamExt, stream::BoxStream};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{OutputSink, WidgetEvent};

/// Transcript budget, measured with [`WidgetEvent::approx_bytes`].
const TRANSCRIPT_BYTES: usize = 256 * 1024;
const LIVE_CAPACITY: usize = 256;

struct Transcript {
    entries: VecDeque<WidgetEvent>,
    bytes: usize,
    limit: usize,
}

impl Transcript {
    /// Append, evicting the oldest lines until the budget holds. The newest
    /// line is always kept.
    fn append(&mut self, event: WidgetEvent) {
        self.bytes = self.bytes.saturating_add(event.approx_bytes());
        self.entries.push_back(event);
        while self.bytes > self.limit && self.entries.len() > 1 {
            if let Some(oldest) = self.entries.pop_front() {
                self.bytes = self.bytes.saturating_sub(oldest.approx_bytes());
            }
        }
    }
}

/// Output sink that keeps a bounded transcript and broadcasts every line.
pub struct EventStore {
    transcript: Mutex<Transcript>,
    live: broadcast::Sender<WidgetEvent>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(TRANSCRIPT_BYTES)
    }

    /// Store whose transcript holds at most `limit` bytes (but always the latest line).
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            transcript: Mutex::new(Transcript {
                entries: VecDeque::new(),
                bytes: 0,
                limit,
            }),
            live,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a line and hand it to live subscribers.
    pub fn push(&self, event: WidgetEvent) {
        let mut transcript = self.lock();
        // No subscribers is fine.
        let _ = self.live.send(event.clone());
        transcript.append(event);
    }

    /// Live lines only.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.live.subscribe()
    }

    /// Snapshot of the transcript, oldest first.
    #[must_use]
    pub fn transcript(&self) -> Vec<WidgetEvent> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Transcript rendered as display lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lock().entries.iter().map(ToString::to_string).collect()
    }

    /// Forget the transcript. Live subscribers are unaffected.
    pub fn clear(&self) {
        let mut transcript = self.lock();
        transcript.entries.clear();
        transcript.bytes = 0;
    }

    /// The transcript followed by live lines. A subscriber that falls behind
    /// gets a notice saying how many lines it missed.
    #[must_use]
    pub fn replay_and_follow(&self) -> BoxStream<'static, WidgetEvent> {
        let (replay, live) = {
            let transcript = self.lock();
            (transcript.entries.iter().cloned().collect::<Vec<_>>(), self.live.subscribe())
        };

        let live = BroadcastStream::new(live).map(|line| match line {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                WidgetEvent::Notice(format!("({skipped} lines skipped)"))
            }
        });
        futures::stream::iter(replay).chain(live).boxed()
    }
}

impl OutputSink for EventStore {
    fn emit(&self, event: WidgetEvent) {
        tracing::trace!(line = %event, "widget event");
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_is_bounded() {
        let store = EventStore::with_history_limit(WidgetEvent::Notice("x".repeat(10)).approx_bytes() * 2);
        store.emit(WidgetEvent::Notice("a".repeat(10)));
        store.emit(WidgetEvent::Notice("b".repeat(10)));
        store.emit(WidgetEvent::Notice("c".repeat(10)));

        assert_eq!(store.lines(), vec!["b".repeat(10), "c".repeat(10)]);
    }

    #[test]
    fn test_oversized_line_is_kept_alone() {
        let store = EventStore::with_history_limit(8);
        store.emit(WidgetEvent::Notice("short".into()));
        store.emit(WidgetEvent::Notice("much longer than the budget".into()));

        assert_eq!(store.lines(), vec!["much longer than the budget"]);
    }

    #[test]
    fn test_subscriber_sees_live_events() {
        let store = EventStore::new();
        let mut rx = store.subscribe();
        store.emit(WidgetEvent::Notice("hi".into()));

        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(event, WidgetEvent::Notice("hi".into()));
    }

    #[test]
    fn test_clear_keeps_subscribers() {
        let store = EventStore::new();
        let mut rx = store.subscribe();
        store.emit(WidgetEvent::Connected);
        store.clear();
        assert!(store.transcript().is_empty());

        store.emit(WidgetEvent::Closed);
        assert_eq!(tokio_test::block_on(rx.recv()).unwrap(), WidgetEvent::Connected);
        assert_eq!(tokio_test::block_on(rx.recv()).unwrap(), WidgetEvent::Closed);
        assert_eq!(store.transcript(), vec![WidgetEvent::Closed]);
    }

    #[tokio::test]
    async fn test_replay_then_follow() {
        let store = EventStore::new();
        store.emit(WidgetEvent::Connected);

        let mut stream = store.replay_and_follow();
        store.emit(WidgetEvent::Closed);

        assert_eq!(stream.next().await, Some(WidgetEvent::Connected));
        assert_eq!(stream.next().await, Some(WidgetEvent::Closed));
    }

    #[tokio::test]
    async fn test_lagging_follower_gets_notice() {
        let store = EventStore::new();
        let mut stream = store.replay_and_follow();
        for i in 0..LIVE_CAPACITY + 3 {
            store.emit(WidgetEvent::Notice(i.to_string()));
        }

        assert_eq!(stream.next().await, Some(WidgetEvent::Notice("(3 lines skipped)".into())));
        assert_eq!(stream.next().await, Some(WidgetEvent::Notice("3".into())));
    }
}
