//! Reading recorded violations back out of a table.

use arbor_store::{Context, Hash, Tuple};

use crate::artifact::kind::ArtifactKind;
use crate::artifact::ledger::{ArtifactKey, ViolationPayload};
use crate::error::Result;
use crate::merge::FkCVMeta;
use crate::table::Table;
use crate::types::Value;

/// A constraint violation recorded for a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    /// Table holding the offending row.
    pub table: String,
    pub kind: ArtifactKind,
    /// Merge source that produced the violation.
    pub provenance: Hash,
    /// Key tuple of the offending row.
    pub row_key: Tuple,
    /// The row key, formatted for display.
    pub pk: String,
    /// The offending row, in column declaration order.
    pub row: Vec<Value>,
    /// Violation metadata.
    pub info: Vec<u8>,
}

impl ConstraintViolation {
    /// Foreign key metadata, for foreign key violations.
    pub fn fk_meta(&self) -> Result<Option<FkCVMeta>> {
        match self.kind {
            ArtifactKind::ForeignKeyViolation => FkCVMeta::from_json(&self.info).map(Some),
            _ => Ok(None),
        }
    }

    /// Metadata as text. Foreign key metadata is pretty printed.
    pub fn info_text(&self) -> String {
        match self.fk_meta() {
            Ok(Some(meta)) => meta.pretty_print(),
            _ => String::from_utf8_lossy(&self.info).into_owned(),
        }
    }
}

/// Decode every constraint violation recorded in `table`'s artifact index,
/// in row key order. Merge conflicts are not included.
pub fn constraint_violations(ctx: &Context, table: &Table) -> Result<Vec<ConstraintViolation>> {
    let schema = table.schema();
    let key_desc = schema.key_desc();
    let mut violations = Vec::new();

    for entry in table.artifacts().iter_all(ctx)? {
        let (key, value) = entry?;
        let key = ArtifactKey::decode(&key)?;
        if !key.kind.is_constraint_violation() {
            continue;
        }

        let payload = ViolationPayload::from_bytes(&value)?;
        let row_value = Tuple::decode(&payload.value)?;
        violations.push(ConstraintViolation {
            table: schema.name.clone(),
            kind: key.kind,
            provenance: key.provenance,
            pk: key_desc.format(&key.row_key),
            row: schema.decode_row(&key.row_key, &row_value)?,
            row_key: key.row_key,
            info: payload.info,
        });
    }
    Ok(violations)
}
