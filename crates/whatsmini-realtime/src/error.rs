//! Channel errors.

use thiserror::Error;
use whatsmini_core::ChannelState;

/// Error returned synchronously by channel operations.
///
/// Transport failures after `connect` returns are reported through the
/// output sink, not here.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Cannot connect without a session token")]
    Precondition,
    #[error("Channel is not connected ({0})")]
    NotConnected(ChannelState),
    #[error("{0}")]
    Validation(String),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
