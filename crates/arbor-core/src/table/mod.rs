//! Table snapshots.
//!
//! A [`Table`] bundles the immutable maps that make up one version of a
//! table: the primary rows, one map per secondary index, and the artifact
//! index recording constraint violations. A [`Root`] is a set of tables plus
//! the foreign keys relating them.

mod editor;

pub use editor::TableEditor;

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_store::{Context, NodeStore, OrderedMap};

use crate::artifact::{constraint_violations, ConstraintViolation};
use crate::catalog::{ForeignKey, ForeignKeyCollection, IndexDef, TableSchema};
use crate::error::{Error, Result};

/// One version of a table.
#[derive(Debug, Clone)]
pub struct Table {
    schema: Arc<TableSchema>,
    rows: OrderedMap,
    indexes: BTreeMap<String, OrderedMap>,
    artifacts: OrderedMap,
}

impl Table {
    /// Create an empty table in `store`.
    pub fn new(store: Arc<dyn NodeStore>, schema: TableSchema) -> Result<Self> {
        schema.validate()?;
        let empty = OrderedMap::empty(store)?;
        let indexes = schema
            .indexes
            .iter()
            .map(|index| (index.name.clone(), empty.clone()))
            .collect();

        Ok(Self {
            schema: Arc::new(schema),
            rows: empty.clone(),
            indexes,
            artifacts: empty,
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    /// The node store backing the table's maps.
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        self.rows.store()
    }

    /// Primary row map.
    pub fn rows(&self) -> &OrderedMap {
        &self.rows
    }

    /// Map of the secondary index named `index`.
    pub fn index_data(&self, index: &str) -> Result<&OrderedMap> {
        self.indexes.get(index).ok_or_else(|| Error::IndexNotFound {
            table: self.schema.name.clone(),
            index: index.to_string(),
        })
    }

    /// Artifact index.
    pub fn artifacts(&self) -> &OrderedMap {
        &self.artifacts
    }

    /// This table with its artifact index replaced.
    pub fn with_artifacts(&self, artifacts: OrderedMap) -> Table {
        Table {
            artifacts,
            ..self.clone()
        }
    }

    /// Start editing the table's rows.
    pub fn editor(&self) -> Result<TableEditor> {
        TableEditor::new(self.clone())
    }

    /// Constraint violations recorded for the table.
    pub fn violations(&self, ctx: &Context) -> Result<Vec<ConstraintViolation>> {
        constraint_violations(ctx, self)
    }

    pub(crate) fn from_parts(
        schema: Arc<TableSchema>,
        rows: OrderedMap,
        indexes: BTreeMap<String, OrderedMap>,
        artifacts: OrderedMap,
    ) -> Self {
        Self {
            schema,
            rows,
            indexes,
            artifacts,
        }
    }
}

/// A table opened for one side of a foreign key.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    /// Table name.
    pub name: String,
    /// The table snapshot.
    pub table: Table,
    /// The index backing the foreign key on this side.
    pub index: IndexDef,
    /// Primary row map.
    pub row_data: OrderedMap,
    /// Map of `index`.
    pub index_data: OrderedMap,
}

impl LoadedTable {
    /// Open `table` with the index named `index`.
    pub fn load(table: &Table, index: &str) -> Result<Self> {
        let def = table.schema().index(index)?.clone();
        Ok(Self {
            name: table.name().to_string(),
            table: table.clone(),
            index_data: table.index_data(index)?.clone(),
            row_data: table.rows().clone(),
            index: def,
        })
    }

    /// Open the parent side of `fk`.
    pub fn parent_of(root: &Root, fk: &ForeignKey) -> Result<Self> {
        Self::load(root.table(&fk.parent_table)?, &fk.parent_index)
    }

    /// Open the child side of `fk`.
    pub fn child_of(root: &Root, fk: &ForeignKey) -> Result<Self> {
        Self::load(root.table(&fk.child_table)?, &fk.child_index)
    }
}

/// A database version: tables by name and their foreign keys.
#[derive(Debug, Clone, Default)]
pub struct Root {
    tables: BTreeMap<String, Table>,
    foreign_keys: ForeignKeyCollection,
}

impl Root {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn with_table(mut self, table: Table) -> Self {
        self.put_table(table);
        self
    }

    /// Add or replace a table.
    pub fn put_table(&mut self, table: Table) {
        self.tables.insert(table.name().to_string(), table);
    }

    /// Get a table by name.
    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterate over tables in name order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn foreign_keys(&self) -> &ForeignKeyCollection {
        &self.foreign_keys
    }

    /// Declare a foreign key between two tables of this root.
    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> Result<()> {
        let child = self.table(&fk.child_table)?;
        let parent = self.table(&fk.parent_table)?;
        fk.validate(child.schema(), parent.schema())?;
        self.foreign_keys.add(fk)
    }

    /// Declare a foreign key, builder style.
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Result<Self> {
        self.add_foreign_key(fk)?;
        Ok(self)
    }
}
