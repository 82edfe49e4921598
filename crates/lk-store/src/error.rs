//! Error types for storage backends and the persistent store.

use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a [`StorageBackend`](crate::StorageBackend).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would exceed the backend's capacity.
    #[error("storage quota exceeded writing {key}: need {needed} bytes, {available} available")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Bytes the write needs.
        needed: u64,
        /// Bytes still free.
        available: u64,
    },

    /// The underlying file system failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be stored by this backend.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// Any other backend failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a save or load failed. The public store API converts these into
/// `false` or `None` after logging.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record could not be serialized.
    #[error("cannot serialize save record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The record does not fit in the storage budget even after cleanup.
    #[error("save needs {needed} bytes but only {available} of the budget remain")]
    BudgetExceeded {
        /// Bytes the record needs.
        needed: u64,
        /// Bytes left in the budget.
        available: u64,
    },

    /// The record failed structural validation and was not written.
    #[error("save record rejected: {0}")]
    Rejected(String),

    /// Stored bytes could not be read back as a save record.
    #[error("corrupted save record: {0}")]
    Corrupted(String),

    /// The backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
