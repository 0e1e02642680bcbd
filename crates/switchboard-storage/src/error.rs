//! Storage error types.

use thiserror::Error;

/// Errors that can occur while loading or caching the flag corpus.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored corpus violates its own contract (unknown operator code,
    /// dangling reference, out-of-range percent).
    #[error("Corrupt corpus: {0}")]
    Corrupt(String),

    /// Snapshot compilation or succession failure from the core.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] switchboard_core::SwitchboardError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Creates a corrupt-corpus error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt(detail.into())
    }

    /// Returns true when the error came from the store rather than from
    /// compiling what it returned.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::corrupt("distribution 4 references missing segment 9");
        assert_eq!(
            err.to_string(),
            "Corrupt corpus: distribution 4 references missing segment 9"
        );
    }

    #[test]
    fn test_store_unavailable_classification() {
        assert!(StorageError::Database(sqlx::Error::PoolClosed).is_store_unavailable());
        assert!(!StorageError::corrupt("x").is_store_unavailable());
    }
}
