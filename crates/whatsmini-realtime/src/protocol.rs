//! Wire format of the real-time channel.
//!
//! Outbound frames are `{"to": ..., "text": ...}`. Inbound frames are either
//! `{"from": ..., "text": ...}` or arbitrary text (server notices, pings),
//! and both must reach the UI.

use whatsmini_core::{InboundMessage, OutboundMessage, WidgetEvent};

/// Path of the channel endpoint relative to the real-time origin.
pub const CHANNEL_PATH: &str = "/ws";

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Frame matching the message shape.
    Message(InboundMessage),
    /// Anything else, kept verbatim.
    Opaque(String),
}

impl InboundFrame {
    /// Decode a text frame. Never fails: unparseable frames become `Opaque`.
    #[must_use]
    pub fn decode(text: &str) -> Self {
        serde_json::from_str::<InboundMessage>(text)
            .map_or_else(|_| Self::Opaque(text.to_string()), Self::Message)
    }

    /// Line to surface to the UI.
    #[must_use]
    pub fn into_event(self) -> WidgetEvent {
        match self {
            Self::Message(message) => WidgetEvent::Inbound(message),
            Self::Opaque(text) => WidgetEvent::Opaque(text),
        }
    }
}

/// Encode an outbound message as a text frame.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode_outbound(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Channel URL carrying the token as a query parameter.
#[must_use]
pub fn channel_url(ws_base: &str, token: &str) -> String {
    format!(
        "{}{CHANNEL_PATH}?token={}",
        ws_base.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_frame() {
        let frame = InboundFrame::decode(r#"{"from":"bob","text":"hi"}"#);
        assert_eq!(
            frame,
            InboundFrame::Message(InboundMessage {
                from: "bob".into(),
                text: "hi".into(),
            })
        );
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let frame = InboundFrame::decode(r#"{"from":"bob","text":"hi","ts":1}"#);
        assert!(matches!(frame, InboundFrame::Message(_)));
    }

    #[test]
    fn test_non_matching_frames_are_opaque() {
        for raw in [
            "ping",
            r#"{"text":"no sender"}"#,
            r#"{"from":"bob"}"#,
            r#"{"from":"bob","text":5}"#,
            r#""quoted""#,
            "",
        ] {
            assert_eq!(InboundFrame::decode(raw), InboundFrame::Opaque(raw.to_string()));
        }
    }

    #[test]
    fn test_frames_map_to_distinct_events() {
        let structured = InboundFrame::decode(r#"{"from":"bob","text":"hi"}"#).into_event();
        let opaque = InboundFrame::decode("ping").into_event();
        assert!(matches!(structured, WidgetEvent::Inbound(_)));
        assert_eq!(opaque, WidgetEvent::Opaque("ping".into()));
    }

    #[test]
    fn test_encode_outbound() {
        let frame = encode_outbound(&OutboundMessage::new("bob", "hi")).unwrap();
        assert_eq!(frame, r#"{"to":"bob","text":"hi"}"#);
    }

    #[test]
    fn test_channel_url_encodes_token() {
        assert_eq!(channel_url("wss://api.example/", "abc"), "wss://api.example/ws?token=abc");
        assert_eq!(
            channel_url("ws://127.0.0.1:9000", "a b/c+d"),
            "ws://127.0.0.1:9000/ws?token=a%20b%2Fc%2Bd"
        );
    }
}
