use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store lock was poisoned by a panicking writer
    #[error("Token store lock poisoned")]
    Poisoned,
}

/// Storage result type
pub type StorageResult<T> = Result<T, StorageError>;
