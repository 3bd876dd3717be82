//! Error types for variable resolution.

use thiserror::Error;
use varflow_model::{ModelError, VariableKind};

/// Failure reported by a [`Transport`](crate::resolver::Transport).
///
/// Cloneable so one failure can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("request for {uid} failed: {message}")]
pub struct TransportError {
    pub uid: String,
    pub message: String,
    /// Whether the backend indicated the request may succeed if repeated.
    pub retryable: bool,
}

impl TransportError {
    pub fn new(uid: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Write rejected because the variable kind is computed or server-owned.
    #[error("{kind} '{uid}' is read-only")]
    ReadOnlyVariable { kind: VariableKind, uid: String },

    /// A stream variable was found on an eager (preload) resolution path.
    #[error("stream variable '{uid}' cannot be resolved eagerly")]
    StreamPreloadUnsupported { uid: String },

    /// A request was built for a variable that is not derived.
    #[error("variable '{uid}' is not a derived variable")]
    NotDerived { uid: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CoreError {
    /// Returns a message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::ReadOnlyVariable { .. } => "This value cannot be edited.",
            Self::StreamPreloadUnsupported { .. } => {
                "Streaming values cannot be loaded ahead of time."
            }
            Self::NotDerived { .. } => "Only derived values can be requested from the server.",
            Self::Transport(_) => "Could not reach the server. Please try again.",
            Self::Serialization(_) | Self::Model(_) => "An unexpected error occurred.",
        }
    }

    /// Returns whether repeating the failed operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(err) if err.retryable)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
