//! Error types for the aggregation engine.

use thiserror::Error;

use logscope_client::ClientError;

/// Failures surfaced to the consumer as the current error status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The initial fetch or a search failed.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with something other than an array.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The push channel reported a connection error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The tailer has been shut down.
    #[error("engine stopped")]
    Stopped,
}

impl EngineError {
    /// Whether this came from a backend request
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::UnexpectedResponse(_))
    }
}

impl From<&ClientError> for EngineError {
    fn from(err: &ClientError) -> Self {
        if err.is_unexpected_shape() {
            Self::UnexpectedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<ClientError> for EngineError {
    fn from(err: ClientError) -> Self {
        Self::from(&err)
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
