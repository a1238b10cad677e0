//! Foreign key checks over a whole merged root.

use std::collections::BTreeSet;
use std::time::Duration;

use arbor_store::{Context, Hash, OrderedMap};
use tracing::{debug, info, instrument};

use crate::catalog::ForeignKey;
use crate::error::Result;
use crate::merge::meta::FkCVMeta;
use crate::merge::violations::{detect_child_side_violations, detect_parent_side_violations};
use crate::table::{LoadedTable, Root};

/// Configuration for [`ViolationChecker`].
#[derive(Debug, Clone, Default)]
pub struct CheckerConfig {
    /// Time limit for a whole check. None means no limit.
    pub timeout: Option<Duration>,
}

impl CheckerConfig {
    /// Set the time limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of a check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// The merged root with updated artifact indexes.
    pub root: Root,
    /// Names of tables with at least one violating row.
    pub violating_tables: BTreeSet<String>,
}

impl CheckOutcome {
    /// Check if any violation was found.
    pub fn has_violations(&self) -> bool {
        !self.violating_tables.is_empty()
    }
}

/// Runs both detectors for every foreign key of a merged root.
///
/// Keys are checked in name order. Each detector sees the artifacts written
/// by the ones before it, so a row violating two foreign keys is reported as
/// a conflict.
#[derive(Debug, Clone, Default)]
pub struct ViolationChecker {
    config: CheckerConfig,
}

impl ViolationChecker {
    pub fn new(config: CheckerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Check the foreign keys of `merged` against the changes made since
    /// `base`, recording violations under `provenance`.
    #[instrument(skip_all, fields(provenance = %provenance))]
    pub fn check(&self, ctx: &Context, base: &Root, merged: &Root, provenance: Hash) -> Result<CheckOutcome> {
        let ctx = match self.config.timeout {
            Some(timeout) => ctx.child_with_timeout(timeout),
            None => ctx.clone(),
        };

        let mut root = merged.clone();
        let mut violating_tables = BTreeSet::new();
        let foreign_keys: Vec<ForeignKey> = merged.foreign_keys().iter().cloned().collect();

        for fk in &foreign_keys {
            let info = {
                let child = root.table(&fk.child_table)?;
                let parent = root.table(&fk.parent_table)?;
                FkCVMeta::for_foreign_key(fk, child.schema(), parent.schema())?.to_json()?
            };

            let pre_parent_rows = base_rows(base, &root, &fk.parent_table)?;
            let detection = detect_parent_side_violations(
                &ctx,
                fk,
                &pre_parent_rows,
                &LoadedTable::parent_of(&root, fk)?,
                &LoadedTable::child_of(&root, fk)?,
                provenance,
                &info,
            )?;
            if detection.found_violation {
                violating_tables.insert(fk.child_table.clone());
            }
            root.put_table(detection.table);

            let pre_child_rows = base_rows(base, &root, &fk.child_table)?;
            let detection = detect_child_side_violations(
                &ctx,
                fk,
                &pre_child_rows,
                &LoadedTable::parent_of(&root, fk)?,
                &LoadedTable::child_of(&root, fk)?,
                provenance,
                &info,
            )?;
            if detection.found_violation {
                violating_tables.insert(fk.child_table.clone());
            }
            root.put_table(detection.table);

            debug!(foreign_key = %fk.name, "Checked foreign key");
        }

        info!(
            foreign_keys = foreign_keys.len(),
            violating_tables = violating_tables.len(),
            "Foreign key check completed"
        );
        Ok(CheckOutcome {
            root,
            violating_tables,
        })
    }
}

/// Rows of `table` in the base root. A table the merge created starts empty.
fn base_rows(base: &Root, merged: &Root, table: &str) -> Result<OrderedMap> {
    if base.has_table(table) {
        return Ok(base.table(table)?.rows().clone());
    }
    let store = merged.table(table)?.store().clone();
    Ok(OrderedMap::empty(store)?)
}
