//! Foreign key definitions.

use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::schema::TableSchema;
use crate::error::{Error, Result};

/// Action taken on child rows when a referenced parent row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    /// No action declared.
    #[default]
    Default,
    /// Apply the change to child rows.
    Cascade,
    /// Check the constraint at the end of the statement.
    NoAction,
    /// Prevent the change if child rows exist.
    Restrict,
    /// Set the child's foreign key columns to NULL.
    SetNull,
}

impl ReferentialAction {
    /// SQL keyword for the action. Empty when none was declared.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Default => "",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::SetNull => "SET NULL",
        }
    }

    /// The effective action: an undeclared action behaves as RESTRICT.
    pub fn reduced(&self) -> ReferentialAction {
        match self {
            ReferentialAction::Default => ReferentialAction::Restrict,
            other => *other,
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reduced().as_sql())
    }
}

/// A foreign key from a child table's columns to a parent table's columns.
///
/// Both sides are backed by a secondary index whose leading columns are the
/// foreign key columns, in foreign key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Table declaring the foreign key.
    pub child_table: String,
    /// Column tags on the child table.
    pub child_columns: Vec<u64>,
    /// Child index whose prefix covers `child_columns`.
    pub child_index: String,
    /// Referenced table.
    pub parent_table: String,
    /// Referenced column tags.
    pub parent_columns: Vec<u64>,
    /// Parent index whose prefix covers `parent_columns`.
    pub parent_index: String,
    /// ON UPDATE action.
    pub on_update: ReferentialAction,
    /// ON DELETE action.
    pub on_delete: ReferentialAction,
}

impl ForeignKey {
    /// Create a foreign key. Index names default to empty and must be set.
    pub fn new(
        name: impl Into<String>,
        child_table: impl Into<String>,
        child_columns: impl IntoIterator<Item = u64>,
        parent_table: impl Into<String>,
        parent_columns: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            name: name.into(),
            child_table: child_table.into(),
            child_columns: child_columns.into_iter().collect(),
            child_index: String::new(),
            parent_table: parent_table.into(),
            parent_columns: parent_columns.into_iter().collect(),
            parent_index: String::new(),
            on_update: ReferentialAction::Default,
            on_delete: ReferentialAction::Default,
        }
    }

    /// Set the child-side index.
    pub fn with_child_index(mut self, index: impl Into<String>) -> Self {
        self.child_index = index.into();
        self
    }

    /// Set the parent-side index.
    pub fn with_parent_index(mut self, index: impl Into<String>) -> Self {
        self.parent_index = index.into();
        self
    }

    /// Set the ON DELETE action.
    pub fn with_on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the ON UPDATE action.
    pub fn with_on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Number of columns in the foreign key.
    pub fn width(&self) -> usize {
        self.child_columns.len()
    }

    /// Check if the foreign key references its own table.
    pub fn is_self_referential(&self) -> bool {
        self.child_table == self.parent_table
    }

    /// Check the foreign key against the schemas it relates.
    pub fn validate(&self, child: &TableSchema, parent: &TableSchema) -> Result<()> {
        if self.child_columns.is_empty() {
            return Err(self.invalid("no columns"));
        }
        if self.child_columns.len() != self.parent_columns.len() {
            return Err(self.invalid(format!(
                "{} child columns but {} referenced columns",
                self.child_columns.len(),
                self.parent_columns.len()
            )));
        }
        if child.name != self.child_table || parent.name != self.parent_table {
            return Err(self.invalid("schemas do not match the declared tables"));
        }

        let child_index = child.index(&self.child_index)?;
        if !child_index.column_tags.starts_with(&self.child_columns) {
            return Err(self.invalid(format!(
                "index '{}' does not start with the foreign key columns",
                child_index.name
            )));
        }
        let parent_index = parent.index(&self.parent_index)?;
        if !parent_index.column_tags.starts_with(&self.parent_columns) {
            return Err(self.invalid(format!(
                "index '{}' does not start with the referenced columns",
                parent_index.name
            )));
        }

        for (child_tag, parent_tag) in self.child_columns.iter().zip(&self.parent_columns) {
            let child_column = child.column_by_tag(*child_tag).ok_or(Error::ColumnNotFound {
                table: child.name.clone(),
                tag: *child_tag,
            })?;
            let parent_column = parent.column_by_tag(*parent_tag).ok_or(Error::ColumnNotFound {
                table: parent.name.clone(),
                tag: *parent_tag,
            })?;
            if child_column.column_type != parent_column.column_type {
                return Err(self.invalid(format!(
                    "column '{}' is {} but references {} column '{}'",
                    child_column.name,
                    child_column.column_type.name(),
                    parent_column.column_type.name(),
                    parent_column.name
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidForeignKey {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// The foreign keys of a database, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKeyCollection {
    keys: BTreeMap<String, ForeignKey>,
}

impl ForeignKeyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a foreign key. Names must be unique.
    pub fn add(&mut self, fk: ForeignKey) -> Result<()> {
        if self.keys.contains_key(&fk.name) {
            return Err(fk.invalid("a foreign key with this name already exists"));
        }
        self.keys.insert(fk.name.clone(), fk);
        Ok(())
    }

    /// Remove a foreign key by name.
    pub fn remove(&mut self, name: &str) -> Option<ForeignKey> {
        self.keys.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&ForeignKey> {
        self.keys.get(name)
    }

    /// Iterate over all foreign keys in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ForeignKey> {
        self.keys.values()
    }

    /// Foreign keys declared by `table`.
    pub fn declared_by<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.keys.values().filter(move |fk| fk.child_table == table)
    }

    /// Foreign keys referencing `table`.
    pub fn referenced_by<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.keys.values().filter(move |fk| fk.parent_table == table)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
