use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The vector index or its metadata sidecar could not be loaded.
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
