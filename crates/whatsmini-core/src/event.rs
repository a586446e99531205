//! Message, channel-state and output-line types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Message to be sent over the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Recipient username.
    pub to: String,
    /// Message payload.
    pub text: String,
}

impl OutboundMessage {
    /// Create a new outbound message.
    #[must_use]
    pub fn new(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
        }
    }
}

/// Structured message received over the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender username.
    pub from: String,
    /// Message payload.
    pub text: String,
}

/// Lifecycle state of a real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No connection has been attempted yet.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Frames can be sent and received.
    Open,
    /// Terminal until the next explicit connect.
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A single line surfaced to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum WidgetEvent {
    /// Outcome of a register/login/logout action.
    AuthStatus(String),
    /// Outcome of a recipient key check.
    KeyStatus(String),
    /// Local notice, e.g. a rejected send.
    Notice(String),
    /// Real-time channel opened.
    Connected,
    /// Structured message from another user.
    Inbound(InboundMessage),
    /// Frame that did not match the message shape, delivered verbatim.
    Opaque(String),
    /// Message we transmitted.
    Outgoing(OutboundMessage),
    /// Transport-level failure on the channel.
    TransportError(String),
    /// Real-time channel closed.
    Closed,
}

impl WidgetEvent {
    /// Whether this line was authored locally (rendered on the "me" side).
    #[must_use]
    pub const fn is_own(&self) -> bool {
        matches!(self, Self::Outgoing(_))
    }

    /// Approximate heap size, used to bound history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + match self {
                Self::AuthStatus(s)
                | Self::KeyStatus(s)
                | Self::Notice(s)
                | Self::Opaque(s)
                | Self::TransportError(s) => s.len(),
                Self::Inbound(m) => m.from.len() + m.text.len(),
                Self::Outgoing(m) => m.to.len() + m.text.len(),
                Self::Connected | Self::Closed => 0,
            }
    }
}

impl fmt::Display for WidgetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthStatus(s) | Self::KeyStatus(s) | Self::Notice(s) | Self::Opaque(s) => {
                f.write_str(s)
            }
            Self::Connected => f.write_str("Channel connected"),
            Self::Inbound(m) => write!(f, "{}: {}", m.from, m.text),
            Self::Outgoing(m) => write!(f, "Me -> {}: {}", m.to, m.text),
            Self::TransportError(reason) => write!(f, "Channel error: {reason}"),
            Self::Closed => f.write_str("Channel closed (normal if the backend restarted)"),
        }
    }
}
