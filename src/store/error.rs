use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("write timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("write task failed: {0}")]
    Task(String),
}
