//! LLM error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Timeout, refused connection, or a body that could not be read
    #[error("Network error: {0}")]
    Network(String),
    /// The provider answered with a non-success status
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// A success status whose body we could not decode
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
    /// Client construction or request building failed
    #[error("LLM client error: {0}")]
    Client(String),
}

impl LlmError {
    /// Whether repeating the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Client(_) => false,
        }
    }
}
