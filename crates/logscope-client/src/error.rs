//! Error types for the backend client and push channel.

use thiserror::Error;

/// Errors that can occur talking to the log backend.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// The payload was valid JSON but not an array of entries.
    #[error("unexpected response format: expected an array, got {0}")]
    UnexpectedShape(&'static str),

    /// The payload was not valid JSON.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The configured endpoint is not a usable URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    /// A push channel frame could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The push channel transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Whether the backend answered with something other than an array
    pub fn is_unexpected_shape(&self) -> bool {
        matches!(self, Self::UnexpectedShape(_))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
