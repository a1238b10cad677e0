//! Table schemas.

use arbor_store::{Hash, Tuple};

use crate::error::{Error, Result};
use crate::types::{ColumnType, TupleDesc, Value};

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Stable column tag.
    pub tag: u64,
    /// Column type.
    pub column_type: ColumnType,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Whether the column accepts NULL.
    pub nullable: bool,
}

impl Column {
    /// Create a nullable value column.
    pub fn new(name: impl Into<String>, tag: u64, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            tag,
            column_type,
            primary_key: false,
            nullable: true,
        }
    }

    /// Create a primary key column.
    pub fn primary_key(name: impl Into<String>, tag: u64, column_type: ColumnType) -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..Self::new(name, tag, column_type)
        }
    }

    /// Reject NULL values.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// A secondary index definition.
///
/// Index entries are keyed by the indexed columns followed by the row's
/// primary key, with an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    /// Index name (unique within the table).
    pub name: String,
    /// Tags of the indexed columns, in index order.
    pub column_tags: Vec<u64>,
    /// Whether the indexed columns are unique.
    pub unique: bool,
}

impl IndexDef {
    /// Create a non-unique index.
    pub fn new(name: impl Into<String>, column_tags: impl IntoIterator<Item = u64>) -> Self {
        Self {
            name: name.into(),
            column_tags: column_tags.into_iter().collect(),
            unique: false,
        }
    }

    /// Mark the index as unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Where a column's field lives in a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnLocation {
    /// Field index in the key tuple.
    Key(usize),
    /// Field index in the value tuple.
    Value(usize),
}

/// A table schema.
///
/// Rows are stored with the primary key columns as the key tuple and the
/// remaining columns as the value tuple, both in declaration order. A table
/// without primary key columns is keyless: its key is the hash of the row's
/// values and its value tuple starts with a hidden cardinality field counting
/// duplicate rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Secondary indexes.
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Add a column.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a secondary index.
    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Primary key columns in key order.
    pub fn pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Value columns in value order.
    pub fn non_pk_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Check if the table has no primary key.
    pub fn is_keyless(&self) -> bool {
        !self.columns.iter().any(|c| c.primary_key)
    }

    /// Number of fields in the key tuple.
    pub fn key_width(&self) -> usize {
        if self.is_keyless() {
            1
        } else {
            self.pk_columns().count()
        }
    }

    /// Get a column by tag.
    pub fn column_by_tag(&self, tag: u64) -> Option<&Column> {
        self.columns.iter().find(|c| c.tag == tag)
    }

    /// Get a column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get a secondary index by name.
    pub fn index(&self, name: &str) -> Result<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| Error::IndexNotFound {
                table: self.name.clone(),
                index: name.to_string(),
            })
    }

    /// Locate the stored field of the column with `tag`.
    ///
    /// Value positions of keyless tables account for the leading cardinality
    /// field.
    pub fn locate(&self, tag: u64) -> Option<ColumnLocation> {
        if let Some(i) = self.pk_columns().position(|c| c.tag == tag) {
            return Some(ColumnLocation::Key(i));
        }
        let offset = usize::from(self.is_keyless());
        self.non_pk_columns()
            .position(|c| c.tag == tag)
            .map(|j| ColumnLocation::Value(j + offset))
    }

    /// Descriptor of the key tuple.
    pub fn key_desc(&self) -> TupleDesc {
        if self.is_keyless() {
            return TupleDesc::new(vec![ColumnType::Bytes]);
        }
        TupleDesc::new(self.pk_columns().map(|c| c.column_type).collect())
    }

    /// Descriptor of the value tuple.
    pub fn value_desc(&self) -> TupleDesc {
        let mut types = Vec::new();
        if self.is_keyless() {
            types.push(ColumnType::Uint64);
        }
        types.extend(self.non_pk_columns().map(|c| c.column_type));
        TupleDesc::new(types)
    }

    /// Descriptor of the key tuple of a secondary index.
    pub fn index_key_desc(&self, index: &IndexDef) -> Result<TupleDesc> {
        let mut types = Vec::with_capacity(index.column_tags.len() + self.key_width());
        for tag in &index.column_tags {
            types.push(self.column(*tag)?.column_type);
        }
        types.extend(self.key_desc().types);
        Ok(TupleDesc::new(types))
    }

    /// Names of the columns with the given tags.
    pub fn column_names(&self, tags: &[u64]) -> Result<Vec<String>> {
        tags.iter()
            .map(|tag| self.column(*tag).map(|c| c.name.clone()))
            .collect()
    }

    fn column(&self, tag: u64) -> Result<&Column> {
        self.column_by_tag(tag).ok_or_else(|| Error::ColumnNotFound {
            table: self.name.clone(),
            tag,
        })
    }

    /// Check that the schema is well formed.
    pub fn validate(&self) -> Result<()> {
        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.tag == column.tag) {
                return Err(self.invalid(format!("duplicate column tag {}", column.tag)));
            }
            if column.primary_key && column.nullable {
                return Err(self.invalid(format!("primary key column '{}' is nullable", column.name)));
            }
        }
        for index in &self.indexes {
            if index.column_tags.is_empty() {
                return Err(self.invalid(format!("index '{}' has no columns", index.name)));
            }
            for tag in &index.column_tags {
                self.column(*tag)?;
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidRow {
            table: self.name.clone(),
            reason,
        }
    }

    /// Encode a row given in column declaration order.
    ///
    /// Keyless rows are keyed by the hash of their encoded values and carry a
    /// cardinality of one.
    pub fn encode_row(&self, values: &[Value]) -> Result<(Tuple, Tuple)> {
        if values.len() != self.columns.len() {
            return Err(self.invalid(format!(
                "expected {} values, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        let mut key = Tuple::empty();
        let mut value = Tuple::empty();
        for (column, v) in self.columns.iter().zip(values) {
            if !column.column_type.accepts(v) {
                return Err(Error::TypeMismatch {
                    expected: column.column_type.name().to_string(),
                    actual: v.type_name().to_string(),
                });
            }
            if v.is_null() && !column.nullable {
                return Err(self.invalid(format!("column '{}' is not nullable", column.name)));
            }
            if column.primary_key {
                key.push(v.to_field());
            } else {
                value.push(v.to_field());
            }
        }

        if self.is_keyless() {
            let hash = Hash::of(&value.encode());
            let key = Tuple::from_values([hash.as_bytes().to_vec()]);
            let value = Tuple::new(vec![Value::Uint64(1).to_field()]).concat(&value);
            return Ok((key, value));
        }
        Ok((key, value))
    }

    /// Decode a stored row into values in column declaration order.
    pub fn decode_row(&self, key: &Tuple, value: &Tuple) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .map(|column| {
                let field = match self.locate(column.tag) {
                    Some(ColumnLocation::Key(i)) => key.field(i),
                    Some(ColumnLocation::Value(j)) => value.field(j),
                    None => None,
                };
                Value::from_field(column.column_type, field)
            })
            .collect()
    }

    /// Cardinality of a stored keyless row. Rows of keyed tables count once.
    pub fn cardinality(&self, value: &Tuple) -> Result<u64> {
        if !self.is_keyless() {
            return Ok(1);
        }
        match Value::from_field(ColumnType::Uint64, value.field(0))? {
            Value::Uint64(n) => Ok(n),
            _ => Err(Error::Deserialization(format!(
                "keyless row of table '{}' has no cardinality",
                self.name
            ))),
        }
    }
}
