//! Foreign key violation detection over merge diffs.
//!
//! Each detector handles one side of one foreign key. It diffs the side's
//! primary rows from before to after the merge and only looks at rows the
//! merge touched, probing the other side's secondary index by partial key.
//! Violations are written to the child table's artifact index, which is
//! flushed once at the end of the pass.

use arbor_store::{diff, Change, Context, Hash, OrderedMap, Tuple};
use tracing::{debug, info, instrument, warn};

use crate::artifact::{ArtifactKind, ArtifactLedger, Recorded};
use crate::catalog::ForeignKey;
use crate::error::{Error, Result};
use crate::merge::meta::FkCVMeta;
use crate::merge::partial_key::PartialKeyBuilder;
use crate::table::{LoadedTable, Table};
use crate::types::TupleDesc;

/// Result of one detector pass.
#[derive(Debug, Clone)]
pub struct Detection {
    /// The child table with its updated artifact index.
    pub table: Table,
    /// Whether any violating row was found.
    pub found_violation: bool,
}

/// Find child rows left dangling by parent rows the merge removed or changed.
///
/// For every parent row removed or modified between `pre_parent_rows` and
/// the merged parent, the old row's foreign key values are looked up in the
/// merged parent index. If no equivalent parent remains, every child row
/// referencing those values is recorded as a violation. Old rows with a NULL
/// foreign key column never served as a parent and are skipped.
#[instrument(skip_all, fields(foreign_key = %fk.name, table = %post_child.name))]
pub fn detect_parent_side_violations(
    ctx: &Context,
    fk: &ForeignKey,
    pre_parent_rows: &OrderedMap,
    post_parent: &LoadedTable,
    post_child: &LoadedTable,
    provenance: Hash,
    info: &[u8],
) -> Result<Detection> {
    let mut partial = PartialKeyBuilder::new(post_parent.table.schema(), &post_parent.index, fk.width())?;
    let child_schema = post_child.table.schema();
    let key_desc = child_schema.key_desc();
    let pk_width = child_schema.key_width();

    let mut ledger = ArtifactLedger::new(post_child.table.artifacts());
    let mut found_violation = false;
    let mut violations = 0u64;

    for change in diff(ctx, pre_parent_rows, &post_parent.row_data) {
        match change? {
            Change::Removed { key, from } | Change::Modified { key, from, .. } => {
                let key = Tuple::decode(&key)?;
                let from = Tuple::decode(&from)?;
                let Some(partial_key) = partial.build(&key, &from) else {
                    continue;
                };

                let range = PartialKeyBuilder::prefix_range(&partial_key);
                if post_parent.index_data.first_in(ctx, range.clone())?.is_some() {
                    // An equivalent parent still exists
                    continue;
                }

                for entry in post_child.index_data.iter_range(ctx, range)? {
                    let (index_key, _) = entry?;
                    let child_key = Tuple::decode(&index_key)?.suffix(pk_width);
                    let child_value = post_child
                        .row_data
                        .get(ctx, &child_key.encode())?
                        .ok_or_else(|| Error::DanglingIndexEntry {
                            table: post_child.name.clone(),
                        })?;

                    record_violation(
                        ctx,
                        &mut ledger,
                        &child_key,
                        &child_value,
                        provenance,
                        info,
                        &key_desc,
                        &post_child.name,
                    )?;
                    found_violation = true;
                    violations += 1;
                }
            }
            Change::Added { .. } => {}
        }
    }

    finish(ctx, ledger, post_child, found_violation, violations, "parent")
}

/// Find child rows the merge added or changed whose foreign key values have
/// no parent.
///
/// Rows with a NULL foreign key column are unconstrained and skipped.
#[instrument(skip_all, fields(foreign_key = %fk.name, table = %post_child.name))]
pub fn detect_child_side_violations(
    ctx: &Context,
    fk: &ForeignKey,
    pre_child_rows: &OrderedMap,
    post_parent: &LoadedTable,
    post_child: &LoadedTable,
    provenance: Hash,
    info: &[u8],
) -> Result<Detection> {
    let mut partial = PartialKeyBuilder::new(post_child.table.schema(), &post_child.index, fk.width())?;
    let key_desc = post_child.table.schema().key_desc();

    let mut ledger = ArtifactLedger::new(post_child.table.artifacts());
    let mut found_violation = false;
    let mut violations = 0u64;

    for change in diff(ctx, pre_child_rows, &post_child.row_data) {
        match change? {
            Change::Added { key, to } | Change::Modified { key, to, .. } => {
                let row_key = Tuple::decode(&key)?;
                let row_value = Tuple::decode(&to)?;
                let Some(partial_key) = partial.build(&row_key, &row_value) else {
                    continue;
                };

                let range = PartialKeyBuilder::prefix_range(&partial_key);
                if post_parent.index_data.first_in(ctx, range)?.is_some() {
                    continue;
                }

                record_violation(
                    ctx,
                    &mut ledger,
                    &row_key,
                    &to,
                    provenance,
                    info,
                    &key_desc,
                    &post_child.name,
                )?;
                found_violation = true;
                violations += 1;
            }
            Change::Removed { .. } => {}
        }
    }

    finish(ctx, ledger, post_child, found_violation, violations, "child")
}

#[allow(clippy::too_many_arguments)]
fn record_violation(
    ctx: &Context,
    ledger: &mut ArtifactLedger,
    row_key: &Tuple,
    row_value: &[u8],
    provenance: Hash,
    info: &[u8],
    key_desc: &TupleDesc,
    table: &str,
) -> Result<()> {
    match ledger.record(ctx, row_key, provenance, ArtifactKind::ForeignKeyViolation, info, row_value) {
        Ok(recorded) => {
            debug!(
                pk = %key_desc.format(row_key),
                new = recorded != Recorded::AlreadyPresent,
                "Foreign key violation"
            );
            Ok(())
        }
        Err(Error::ArtifactCollision {
            key,
            existing_info,
            new_info,
        }) => Err(multiple_violations(&key, &existing_info, &new_info, key_desc, table)),
        Err(e) => Err(e),
    }
}

/// Translate an artifact collision into a user-facing error naming both
/// foreign keys.
fn multiple_violations(
    key: &Tuple,
    existing_info: &[u8],
    new_info: &[u8],
    key_desc: &TupleDesc,
    table: &str,
) -> Error {
    let existing = match FkCVMeta::from_json(existing_info) {
        Ok(meta) => meta,
        Err(e) => return e,
    };
    let new = match FkCVMeta::from_json(new_info) {
        Ok(meta) => meta,
        Err(e) => return e,
    };

    let pk = key_desc.format(key);
    warn!(
        pk = %pk,
        table = %table,
        existing = %existing.foreign_key,
        new = %new.foreign_key,
        "Row violates multiple foreign keys"
    );
    Error::MultipleViolationsForRow {
        pk,
        table: table.to_string(),
        existing: Box::new(existing),
        new: Box::new(new),
    }
}

fn finish(
    ctx: &Context,
    ledger: ArtifactLedger,
    post_child: &LoadedTable,
    found_violation: bool,
    violations: u64,
    side: &str,
) -> Result<Detection> {
    let artifacts = ledger.flush(ctx)?;
    if found_violation {
        info!(side, violations, "Foreign key violations found");
    } else {
        debug!(side, "No foreign key violations");
    }

    Ok(Detection {
        table: post_child.table.with_artifacts(artifacts),
        found_violation,
    })
}
