//! Error types for the score store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while persisting or loading scores
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O errors (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stored data could not be interpreted
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The backend refused the write (used by test doubles and remote sinks)
    #[error("Write rejected: {0}")]
    WriteRejected(String),

    /// Every retry attempt failed
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { operation: String, attempts: u32, last_error: String },
}

impl StoreError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a new write rejected error
    pub fn write_rejected(msg: impl Into<String>) -> Self {
        Self::WriteRejected(msg.into())
    }

    /// Whether retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StoreError::Config(_)
                | StoreError::Serialization(_)
                | StoreError::RetriesExhausted { .. }
        )
    }
}
