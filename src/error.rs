use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Parent category not found: {0}")]
    ParentNotFound(String),
    #[error("Already exists: {0}")]
    DuplicateKey(String),
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Extraction service unreachable: {0}")]
    ConnectionFailure(String),
    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

pub type CoreResult<T> = Result<T, CoreError>;
