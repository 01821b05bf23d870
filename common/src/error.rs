use thiserror::Error;

/// Errors raised while constructing or validating shared wire/domain types.
#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid heartbeat: {0}")]
    InvalidHeartbeat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
