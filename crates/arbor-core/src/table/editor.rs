//! Row-level table editing.

use std::collections::BTreeMap;

use arbor_store::{Context, MapEditor, Tuple};
use tracing::debug;

use crate::catalog::{ColumnLocation, IndexDef, TableSchema};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::types::Value;

/// Edits a table's rows, keeping every secondary index in step.
///
/// Keyless tables store duplicate rows once with a cardinality count; inserts
/// and deletes adjust the count and only touch the indexes when a row first
/// appears or finally disappears.
pub struct TableEditor {
    table: Table,
    rows: MapEditor,
    indexes: Vec<(IndexDef, MapEditor)>,
}

impl TableEditor {
    /// Fails if the table has no map for one of its schema's indexes.
    pub(crate) fn new(table: Table) -> Result<Self> {
        let rows = table.rows().editor();
        let indexes = table
            .schema()
            .indexes
            .iter()
            .map(|def| Ok((def.clone(), table.index_data(&def.name)?.editor())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table,
            rows,
            indexes,
        })
    }

    fn schema(&self) -> &TableSchema {
        self.table.schema()
    }

    /// Insert a row given in column declaration order.
    ///
    /// A keyed row replaces any row with the same primary key. A keyless row
    /// adds one to the count of identical rows.
    pub fn insert(&mut self, ctx: &Context, row: &[Value]) -> Result<()> {
        let (key, value) = self.schema().encode_row(row)?;
        let key_bytes = key.encode();
        let existing = self.rows.get(ctx, &key_bytes)?;

        if self.schema().is_keyless() {
            let value = match existing {
                Some(old) => {
                    let old = Tuple::decode(&old)?;
                    with_cardinality(&old, self.schema().cardinality(&old)? + 1)
                }
                None => {
                    self.put_index_entries(&key, &value)?;
                    value
                }
            };
            self.rows.put(key_bytes, value.encode());
            return Ok(());
        }

        if let Some(old) = existing {
            let old = Tuple::decode(&old)?;
            self.delete_index_entries(&key, &old)?;
        }
        self.put_index_entries(&key, &value)?;
        self.rows.put(key_bytes, value.encode());
        Ok(())
    }

    /// Delete a row given in column declaration order. Keyed rows are matched
    /// by primary key only. Returns false if no such row exists.
    pub fn delete(&mut self, ctx: &Context, row: &[Value]) -> Result<bool> {
        let key = self.row_key(row)?;
        let key_bytes = key.encode();
        let Some(old) = self.rows.get(ctx, &key_bytes)? else {
            return Ok(false);
        };
        let old = Tuple::decode(&old)?;

        if self.schema().is_keyless() {
            let count = self.schema().cardinality(&old)?;
            if count > 1 {
                self.rows.put(key_bytes, with_cardinality(&old, count - 1).encode());
                return Ok(true);
            }
        }

        self.delete_index_entries(&key, &old)?;
        self.rows.delete(key_bytes);
        Ok(true)
    }

    fn row_key(&self, row: &[Value]) -> Result<Tuple> {
        let schema = self.schema();
        if schema.is_keyless() {
            return Ok(schema.encode_row(row)?.0);
        }
        if row.len() != schema.columns.len() {
            return Err(Error::InvalidRow {
                table: schema.name.clone(),
                reason: format!("expected {} values, got {}", schema.columns.len(), row.len()),
            });
        }
        let fields = schema
            .columns
            .iter()
            .zip(row)
            .filter(|(column, _)| column.primary_key)
            .map(|(_, value)| value.to_field())
            .collect();
        Ok(Tuple::new(fields))
    }

    fn put_index_entries(&mut self, key: &Tuple, value: &Tuple) -> Result<()> {
        let entries = self.index_entries(key, value)?;
        for ((_, editor), entry) in self.indexes.iter_mut().zip(entries) {
            editor.put(entry.encode(), Tuple::empty().encode());
        }
        Ok(())
    }

    fn delete_index_entries(&mut self, key: &Tuple, value: &Tuple) -> Result<()> {
        let entries = self.index_entries(key, value)?;
        for ((_, editor), entry) in self.indexes.iter_mut().zip(entries) {
            editor.delete(entry.encode());
        }
        Ok(())
    }

    /// Index keys of a stored row, one per index: the indexed fields followed
    /// by the row key.
    fn index_entries(&self, key: &Tuple, value: &Tuple) -> Result<Vec<Tuple>> {
        let schema = self.schema();
        self.indexes
            .iter()
            .map(|(def, _)| {
                let mut entry = Tuple::empty();
                for tag in &def.column_tags {
                    let field = match schema.locate(*tag) {
                        Some(ColumnLocation::Key(i)) => key.field(i),
                        Some(ColumnLocation::Value(j)) => value.field(j),
                        None => {
                            return Err(Error::ColumnNotFound {
                                table: schema.name.clone(),
                                tag: *tag,
                            })
                        }
                    };
                    entry.push(field.map(<[u8]>::to_vec));
                }
                Ok(entry.concat(key))
            })
            .collect()
    }

    /// Apply the edits and return the new table version.
    pub fn flush(self, ctx: &Context) -> Result<Table> {
        let pending = self.rows.pending();
        let rows = self.rows.flush(ctx)?;
        let mut indexes = BTreeMap::new();
        for (def, editor) in self.indexes {
            indexes.insert(def.name, editor.flush(ctx)?);
        }

        debug!(table = %self.table.name(), rows = pending, "Flushed table edits");
        Ok(Table::from_parts(
            self.table.schema().clone(),
            rows,
            indexes,
            self.table.artifacts().clone(),
        ))
    }
}

fn with_cardinality(value: &Tuple, count: u64) -> Tuple {
    let mut fields: Vec<Option<Vec<u8>>> = value.fields().map(|f| f.map(<[u8]>::to_vec)).collect();
    if let Some(first) = fields.first_mut() {
        *first = Value::Uint64(count).to_field();
    }
    Tuple::new(fields)
}
