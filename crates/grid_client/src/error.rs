//! Failure taxonomy for grid reads and writes.

use shared::error::ErrorStatus;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Precondition,
    Codec,
    Transport,
    Application,
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("no host identity available for request")]
    MissingContext,
    #[error("{0} is not configured for this grid")]
    Unsupported(&'static str),
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    Status { status: u16, body: String },
    #[error("server rejected request: {0}")]
    Application(#[from] ErrorStatus),
}

impl GridError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingContext | Self::Unsupported(_) => ErrorCategory::Precondition,
            Self::Encode(_) | Self::Decode(_) => ErrorCategory::Codec,
            Self::Transport(_) | Self::Status { .. } => ErrorCategory::Transport,
            Self::Application(_) => ErrorCategory::Application,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.category() == ErrorCategory::Transport
    }
}
