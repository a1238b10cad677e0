//! Index-prefix keys for foreign key lookups.

use arbor_store::{KeyRange, Tuple, TupleBuilder};

use crate::catalog::{ColumnLocation, IndexDef, TableSchema};
use crate::error::{Error, Result};

/// Projects a row onto the leading foreign key columns of a secondary index.
///
/// The encoded partial key is a byte prefix of the index key of every row
/// with the same values in those columns, so it can drive a prefix scan of
/// the index. Column locations are resolved once, up front.
pub struct PartialKeyBuilder {
    locations: Vec<ColumnLocation>,
    builder: TupleBuilder,
}

impl PartialKeyBuilder {
    /// Create a builder over the first `width` columns of `index`.
    pub fn new(schema: &TableSchema, index: &IndexDef, width: usize) -> Result<Self> {
        if width == 0 || width > index.column_tags.len() {
            return Err(Error::InvalidForeignKey {
                name: index.name.clone(),
                reason: format!(
                    "index '{}' covers {} columns, {} needed",
                    index.name,
                    index.column_tags.len(),
                    width
                ),
            });
        }

        let locations = index.column_tags[..width]
            .iter()
            .map(|tag| {
                schema.locate(*tag).ok_or_else(|| Error::ColumnNotFound {
                    table: schema.name.clone(),
                    tag: *tag,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            builder: TupleBuilder::new(width),
            locations,
        })
    }

    /// Number of fields in built keys.
    pub fn width(&self) -> usize {
        self.locations.len()
    }

    /// Build the partial key of the row stored as (`key`, `value`).
    ///
    /// Returns `None` if any contributing column is NULL: such a row neither
    /// references nor can be referenced through the foreign key.
    pub fn build(&mut self, key: &Tuple, value: &Tuple) -> Option<Tuple> {
        for (i, location) in self.locations.iter().enumerate() {
            let field = match location {
                ColumnLocation::Key(j) => key.field(*j),
                ColumnLocation::Value(j) => value.field(*j),
            };
            match field {
                Some(bytes) => self.builder.put_raw(i, Some(bytes)),
                None => {
                    // Reset the slots already filled
                    self.builder.build();
                    return None;
                }
            }
        }
        Some(self.builder.build())
    }

    /// Range of index keys starting with `partial_key`.
    pub fn prefix_range(partial_key: &Tuple) -> KeyRange {
        KeyRange::prefix(&partial_key.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::types::{ColumnType, Value};

    fn schema() -> TableSchema {
        TableSchema::new("child")
            .with_column(Column::primary_key("id", 1, ColumnType::Int64))
            .with_column(Column::new("a", 2, ColumnType::Int64))
            .with_column(Column::new("b", 3, ColumnType::String))
            .with_index(IndexDef::new("ab_idx", [2, 3]))
            .with_index(IndexDef::new("id_a_idx", [1, 2]))
    }

    fn keyless() -> TableSchema {
        TableSchema::new("log")
            .with_column(Column::new("a", 1, ColumnType::Int64))
            .with_column(Column::new("b", 2, ColumnType::Int64))
            .with_index(IndexDef::new("b_idx", [2]))
    }

    #[test]
    fn test_composite_key_from_value_columns() {
        let schema = schema();
        let mut builder = PartialKeyBuilder::new(&schema, schema.index("ab_idx").unwrap(), 2).unwrap();
        let (key, value) = schema
            .encode_row(&[Value::Int64(1), Value::Int64(7), Value::String("x".into())])
            .unwrap();

        let partial = builder.build(&key, &value).unwrap();
        assert_eq!(partial, Tuple::new(vec![Value::Int64(7).to_field(), Value::String("x".into()).to_field()]));
    }

    #[test]
    fn test_key_and_value_columns_mix() {
        let schema = schema();
        let mut builder = PartialKeyBuilder::new(&schema, schema.index("id_a_idx").unwrap(), 2).unwrap();
        let (key, value) = schema
            .encode_row(&[Value::Int64(1), Value::Int64(7), Value::Null])
            .unwrap();
        let partial = builder.build(&key, &value).unwrap();
        assert_eq!(partial.field(0), key.field(0));
        assert_eq!(partial.field(1), value.field(0));
    }

    #[test]
    fn test_null_yields_no_key() {
        let schema = schema();
        let mut builder = PartialKeyBuilder::new(&schema, schema.index("ab_idx").unwrap(), 2).unwrap();
        let (key, value) = schema
            .encode_row(&[Value::Int64(1), Value::Int64(7), Value::Null])
            .unwrap();
        assert!(builder.build(&key, &value).is_none());

        // A NULL beyond the foreign key width does not matter
        let mut narrow = PartialKeyBuilder::new(&schema, schema.index("ab_idx").unwrap(), 1).unwrap();
        assert_eq!(narrow.build(&key, &value).unwrap().count(), 1);
    }

    #[test]
    fn test_keyless_offset() {
        let schema = keyless();
        let mut builder = PartialKeyBuilder::new(&schema, schema.index("b_idx").unwrap(), 1).unwrap();
        let (key, value) = schema.encode_row(&[Value::Int64(3), Value::Int64(4)]).unwrap();

        let partial = builder.build(&key, &value).unwrap();
        assert_eq!(partial.field(0), Value::Int64(4).to_field().as_deref());
    }

    #[test]
    fn test_partial_key_prefixes_index_key() {
        let schema = schema();
        let mut builder = PartialKeyBuilder::new(&schema, schema.index("ab_idx").unwrap(), 1).unwrap();
        let (key, value) = schema
            .encode_row(&[Value::Int64(1), Value::Int64(7), Value::String("x".into())])
            .unwrap();
        let partial = builder.build(&key, &value).unwrap();

        let index_key = Tuple::new(vec![value.field(0).map(<[u8]>::to_vec), value.field(1).map(<[u8]>::to_vec)])
            .concat(&key)
            .encode();
        assert!(PartialKeyBuilder::prefix_range(&partial).contains(&index_key));
    }

    #[test]
    fn test_width_is_checked() {
        let schema = schema();
        let index = schema.index("ab_idx").unwrap();
        assert!(PartialKeyBuilder::new(&schema, index, 3).is_err());
        assert!(PartialKeyBuilder::new(&schema, index, 0).is_err());
    }
}
