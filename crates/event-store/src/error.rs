use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors raised by storage ports (event store, read model store, dispatcher).
///
/// Adapters convert their backend failures into one of these; hosts that wrap
/// a port call with a timeout report it as [`StoreError::Timeout`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The append lost a compare-and-append race: the stream is not at the
    /// version the writer expected.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The backend could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time.
    #[error("Store operation timed out")]
    Timeout,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other adapter-specific failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Returns true for compare-and-append conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

/// Result type for storage port operations.
pub type Result<T> = std::result::Result<T, StoreError>;
