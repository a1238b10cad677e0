//! Foreign key violation metadata.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{ForeignKey, TableSchema};
use crate::error::{Error, Result};

/// Describes the foreign key a row violates.
///
/// Stored as compact JSON in the artifact payload. Field order is part of the
/// stored format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FkCVMeta {
    pub columns: Vec<String>,
    pub foreign_key: String,
    pub index: String,
    pub on_delete: String,
    pub on_update: String,
    pub referenced_columns: Vec<String>,
    pub referenced_index: String,
    pub referenced_table: String,
    pub table: String,
}

impl FkCVMeta {
    /// Build the metadata for `fk` from the schemas it relates.
    pub fn for_foreign_key(fk: &ForeignKey, child: &TableSchema, parent: &TableSchema) -> Result<Self> {
        Ok(Self {
            columns: child.column_names(&fk.child_columns)?,
            foreign_key: fk.name.clone(),
            index: fk.child_index.clone(),
            on_delete: fk.on_delete.reduced().as_sql().to_string(),
            on_update: fk.on_update.reduced().as_sql().to_string(),
            referenced_columns: parent.column_names(&fk.parent_columns)?,
            referenced_index: fk.parent_index.clone(),
            referenced_table: fk.parent_table.clone(),
            table: fk.child_table.clone(),
        })
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Render as JSON with a space after every `:` and `,`.
    ///
    /// This is the textual form shown to users and compared against
    /// historical violation text, so its layout must not change.
    ///
    /// Names are written as JSON strings: a name containing `"` or `\` is
    /// escaped and an empty column list prints as `[]`. Historical text
    /// inserted names verbatim and printed an empty list as `[""]`. The two
    /// agree for ordinary identifiers, and this output always parses back as
    /// JSON.
    pub fn pretty_print(&self) -> String {
        format!(
            "{{\"Columns\": [{}], \"ForeignKey\": {}, \"Index\": {}, \"OnDelete\": {}, \"OnUpdate\": {}, \"ReferencedColumns\": [{}], \"ReferencedIndex\": {}, \"ReferencedTable\": {}, \"Table\": {}}}",
            quote_all(&self.columns),
            quote(&self.foreign_key),
            quote(&self.index),
            quote(&self.on_delete),
            quote(&self.on_update),
            quote_all(&self.referenced_columns),
            quote(&self.referenced_index),
            quote(&self.referenced_table),
            quote(&self.table),
        )
    }

    /// The referenced side as `Table (col1, col2)`.
    pub fn referenced_table_and_columns(&self) -> String {
        format!("{} ({})", self.referenced_table, self.referenced_columns.join(", "))
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn quote_all(items: &[String]) -> String {
    items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for FkCVMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print())
    }
}

impl PartialOrd for FkCVMeta {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered by JSON text.
impl Ord for FkCVMeta {
    fn cmp(&self, other: &Self) -> Ordering {
        self.pretty_print().cmp(&other.pretty_print())
    }
}
