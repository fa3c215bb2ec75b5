//! Error types for the shared store

use thiserror::Error;

/// Key-value store error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Compare-and-swap kept losing against concurrent writers
    #[error("write contention on key {key} after {attempts} attempts")]
    Contention {
        /// Debug rendering of the contended key
        key: String,
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
