//! Arbor Core - merge-time constraint violation detection.
//!
//! This crate detects foreign-key violations introduced by three-way merges of
//! versioned tables. Detection is driven by structural diffs of the merged
//! tables, so its cost tracks the size of the merge rather than the size of
//! the tables. Violations are recorded in each table's artifact index.

pub mod artifact;
pub mod catalog;
pub mod error;
pub mod merge;
pub mod table;
pub mod types;

pub use artifact::{
    constraint_violations, ArtifactKey, ArtifactKind, ArtifactLedger, ConstraintViolation,
    Recorded,
};
pub use catalog::{
    Column, ColumnLocation, ForeignKey, ForeignKeyCollection, IndexDef, ReferentialAction,
    TableSchema,
};
pub use error::{Error, Result};
pub use merge::{
    detect_child_side_violations, detect_parent_side_violations, CheckOutcome, CheckerConfig,
    Detection, FkCVMeta, PartialKeyBuilder, ViolationChecker,
};
pub use table::{LoadedTable, Root, Table, TableEditor};
pub use types::{ColumnType, TupleDesc, Value};

/// Re-export the storage layer.
pub use arbor_store as store;
