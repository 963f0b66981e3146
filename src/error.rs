#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),
    #[error("Serialization error")]
    SerializationError(#[from] serde_json::Error),
    #[error("Language model request failed")]
    LlmRequestError(#[from] reqwest::Error),
    #[error("Unexpected language model response: {0}")]
    LlmResponseError(String),
    #[error("Store rejected write: {0}")]
    StoreError(String),
}
