use thiserror::Error;

/// Main error type for the StoreWatch client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("buffer error: {0}")]
    Buffer(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
