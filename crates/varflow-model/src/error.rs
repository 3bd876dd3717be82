use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid variable definition: {0}")]
    InvalidVariable(#[source] serde_json::Error),

    #[error("invalid normalized payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
