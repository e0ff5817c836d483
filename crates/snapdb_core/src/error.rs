//! Error types for SnapDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SnapDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An optimistic write upgrade lost a race and must be retried.
    ///
    /// Recoverable: the caller restarts from a fresh read transaction.
    #[error("transaction must be retried: {reason}")]
    TransactionRetry {
        /// Why the upgrade could not be granted.
        reason: String,
    },

    /// The database cannot be closed while a writing transaction runs.
    #[error("cannot close database while a writing transaction is running")]
    WriterActive,

    /// A pending write admission was cancelled before it was granted.
    #[error("write admission was cancelled")]
    WriteCancelled,

    /// A write was attempted through a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction has already been committed or aborted.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a [`CoreError::TransactionRetry`] with the given reason.
    pub(crate) fn retry(reason: impl Into<String>) -> Self {
        Self::TransactionRetry {
            reason: reason.into(),
        }
    }

    /// Returns true if the caller should retry from a fresh read snapshot.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionRetry { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_is_retryable() {
        assert!(CoreError::retry("lost the race").is_retryable());
        assert!(!CoreError::WriterActive.is_retryable());
    }

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            CoreError::retry("x").to_string(),
            "transaction must be retried: x"
        );
        assert_eq!(CoreError::DatabaseClosed.to_string(), "database is closed");
    }
}
