//! Storage error types.

use thiserror::Error;

use crate::hash::Hash;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled failure.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A node referenced by a map is absent from the node store.
    #[error("missing node {0}")]
    MissingNode(Hash),

    /// Malformed tuple bytes.
    #[error("invalid tuple encoding: {0}")]
    InvalidTuple(String),

    /// The operation was cancelled through its context.
    #[error("operation cancelled")]
    Cancelled,

    /// The context deadline passed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}
