//! Real-time message channel for the whatsmini backend.
//!
//! Provides:
//! - `RealtimeChannel` - Connection lifecycle, framing and state publication
//! - `ReconnectSupervisor` - Backoff-driven reconnection over a channel

pub mod channel;
pub mod error;
pub mod protocol;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use channel::{RealtimeChannel, SendOutcome};
pub use error::ChannelError;
pub use protocol::InboundFrame;
pub use supervisor::ReconnectSupervisor;
