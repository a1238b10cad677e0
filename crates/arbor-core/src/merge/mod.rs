//! Merge-time foreign key checks.
//!
//! The detectors compare each side of a foreign key before and after a merge
//! and record offending child rows in the child table's artifact index. The
//! [`ViolationChecker`] drives them across every foreign key of a root.

mod checker;
mod meta;
mod partial_key;
mod violations;

pub use checker::{CheckOutcome, CheckerConfig, ViolationChecker};
pub use meta::FkCVMeta;
pub use partial_key::PartialKeyBuilder;
pub use violations::{detect_child_side_violations, detect_parent_side_violations, Detection};
