//! Provider error types.

use std::time::Duration;

use thiserror::Error;

use fleetscale_state::StateError;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("instance not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("provider misconfigured: {0}")]
    Misconfigured(String),
}

impl ProviderError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_) | ProviderError::Transport(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NotFound(_)
            | ProviderError::Decode(_)
            | ProviderError::State(_)
            | ProviderError::Misconfigured(_) => false,
        }
    }
}
