//! Error types for HTTP operations.

use thiserror::Error;

/// Transport failure that survived every retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("Request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },
    #[error("Network error after {attempts} attempt(s): {reason}")]
    Transport { attempts: u32, reason: String },
}

impl NetworkError {
    /// Number of attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts } | Self::Transport { attempts, .. } => *attempts,
        }
    }

    /// Whether the last attempt failed by timing out.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Register/login error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("A {0} request is already in progress")]
    Busy(&'static str),
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Error for key and upload calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{detail}")]
    Rejected { status: u16, detail: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}
