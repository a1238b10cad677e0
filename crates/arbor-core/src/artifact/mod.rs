//! Merge artifacts: constraint violations and conflicts recorded per row.

mod kind;
mod ledger;
mod report;

pub use kind::ArtifactKind;
pub use ledger::{ArtifactKey, ArtifactLedger, Recorded, ViolationPayload};
pub use report::{constraint_violations, ConstraintViolation};
