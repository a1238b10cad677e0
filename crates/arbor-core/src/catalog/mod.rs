//! Schema catalog: tables, secondary indexes and foreign keys.

mod foreign_key;
mod schema;

pub use foreign_key::{ForeignKey, ForeignKeyCollection, ReferentialAction};
pub use schema::{Column, ColumnLocation, IndexDef, TableSchema};
