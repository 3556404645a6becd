//! Error types for registry operations.

use std::io;
use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned by the registry driver layer.
///
/// Drivers (the relational metadata store and the embedded key-value store)
/// report failures through this type; the registry attaches backend context
/// when propagating them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred in the driver.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store is unreachable or refused to open a transaction.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The store rejected a write or a commit (constraint violation,
    /// connection loss at finalize).
    #[error("store rejected operation: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Undo-log backing store error.
    #[error("undo log storage error: {0}")]
    Storage(#[from] chainreg_storage::StorageError),

    /// The undo log is corrupted and must not be replayed.
    #[error("undo log corruption: {message}")]
    UndoCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Metadata registry (relational store) error.
    #[error("metadata registry error: {0}")]
    Metadata(#[source] StoreError),

    /// Blockchain registry (key-value store) error.
    #[error("blockchain registry error: {0}")]
    Blockchain(#[source] StoreError),

    /// Operation not permitted in the current transaction state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The registry is in an unverifiable mixed state.
    ///
    /// Produced only when a failed commit's compensating rollback itself
    /// fails, or when rollback replay fails partway. The caller must treat
    /// this as a signal to halt the node; no further operation on the
    /// registry is meaningful.
    #[error("unrecoverable registry state: {message}")]
    Unrecoverable {
        /// Description of the double failure.
        message: String,
    },
}

impl RegistryError {
    /// Creates an undo log corruption error.
    pub fn undo_corruption(message: impl Into<String>) -> Self {
        Self::UndoCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an unrecoverable error.
    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable {
            message: message.into(),
        }
    }

    /// Returns true if the registry must not be used after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecoverable_is_fatal() {
        assert!(RegistryError::unrecoverable("mixed state").is_fatal());
        assert!(!RegistryError::invalid_operation("no transaction").is_fatal());
    }

    #[test]
    fn backend_context_in_message() {
        let err = RegistryError::Metadata(StoreError::rejected("constraint violation"));
        assert!(err.to_string().contains("metadata registry"));

        let err = RegistryError::Blockchain(StoreError::unavailable("store closed"));
        assert!(err.to_string().contains("blockchain registry"));
    }
}
