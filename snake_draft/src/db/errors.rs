//! Storage error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by repositories, lock managers and draft state backends
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Transaction could not be serialized against a concurrent one
    #[error("Serialization conflict: {0}")]
    SerializationConflict(String),

    /// Stored JSON could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Transaction used after commit
    #[error("Transaction already finished")]
    TransactionFinished,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 40001 serialization_failure, 40P01 deadlock_detected
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
            && (code == "40001" || code == "40P01")
        {
            return StoreError::SerializationConflict(db_err.message().to_string());
        }
        StoreError::Database(err)
    }
}

impl StoreError {
    /// Whether the failed operation can be retried unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::SerializationConflict(_) | StoreError::Timeout(_)
        )
    }

    /// Get a client-safe error message that doesn't leak storage details
    pub fn client_message(&self) -> String {
        match self {
            StoreError::SerializationConflict(_) | StoreError::Timeout(_) => {
                "Service busy, please retry".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable() {
        let err = StoreError::Timeout(Duration::from_secs(5));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_row_not_found_is_not_retryable() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert_eq!(err.client_message(), "Internal server error");
    }
}
