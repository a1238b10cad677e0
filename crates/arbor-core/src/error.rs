//! Core error types.

use arbor_store::{StoreError, Tuple};
use thiserror::Error;

use crate::merge::FkCVMeta;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Table not present in the root.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Index not defined on the table.
    #[error("index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },

    /// Column tag not defined on the table.
    #[error("column with tag {tag} not found on table '{table}'")]
    ColumnNotFound { table: String, tag: u64 },

    /// Foreign key does not fit the schemas it relates.
    #[error("invalid foreign key '{name}': {reason}")]
    InvalidForeignKey { name: String, reason: String },

    /// Row does not fit the table schema.
    #[error("invalid row for table '{table}': {reason}")]
    InvalidRow { table: String, reason: String },

    /// Value does not match the column type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// A secondary index entry points at a row that does not exist.
    #[error("secondary index entry of table '{table}' has no primary row")]
    DanglingIndexEntry { table: String },

    /// An artifact of the same kind with different metadata already exists
    /// for the row.
    #[error("artifact collision for key {key:?}")]
    ArtifactCollision {
        key: Tuple,
        existing_info: Vec<u8>,
        new_info: Vec<u8>,
    },

    /// A row violates two different foreign keys.
    #[error(
        "multiple violations for row not supported: pk {pk} of table '{table}' violates foreign keys '{}' and '{}'",
        .existing.referenced_table_and_columns(),
        .new.referenced_table_and_columns()
    )]
    MultipleViolationsForRow {
        pk: String,
        table: String,
        existing: Box<FkCVMeta>,
        new: Box<FkCVMeta>,
    },
}

impl Error {
    /// Check if the error is a row-level violation conflict.
    pub fn is_multiple_violations(&self) -> bool {
        matches!(self, Error::MultipleViolationsForRow { .. })
    }
}
