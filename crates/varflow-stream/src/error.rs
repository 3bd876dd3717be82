//! Error types for stream handling.

use thiserror::Error;

/// Failure opening or reading a stream connection.
///
/// Cloneable so it can be both logged and forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream transport error: {message}")]
pub struct StreamTransportError {
    pub message: String,
}

impl StreamTransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// A framed line was not a `{ type, data }` JSON object.
    #[error("malformed stream event: {line}")]
    MalformedEvent {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize stream parameters: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] StreamTransportError),
}

impl StreamError {
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::MalformedEvent { .. } => "Received an unreadable update from the server.",
            Self::Transport(_) => "The live connection to the server was interrupted.",
            Self::Serialization(_) => "An unexpected error occurred.",
        }
    }

    /// Returns whether reconnecting may recover from this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
