//! Core types and seams for the whatsmini client runtime.
//!
//! This crate provides the vocabulary shared by the other crates:
//! - `Session` - Authenticated identity (token + username)
//! - `WidgetEvent` - Typed status/text line emitted to the UI
//! - `EventStore` - Broadcast + history output sink
//! - `ClientConfig` / `RetryPolicy` / `BackoffPolicy` - Tunables
//! - `SessionStore` and `OutputSink` traits

pub mod config;
pub mod event;
pub mod event_store;
pub mod session;
pub mod traits;

pub use config::{BackoffPolicy, ClientConfig, ConfigError, RetryPolicy};
pub use event::{ChannelState, InboundMessage, OutboundMessage, WidgetEvent};
pub use event_store::EventStore;
pub use session::Session;
pub use traits::{NullSink, OutputSink, PersistenceError, SessionStore};
