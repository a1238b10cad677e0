//! Arbor Store - content-addressed ordered maps.
//!
//! This crate provides the storage layer Arbor's merge checks run on:
//! immutable, hash-addressed, ordered key/value trees that can be diffed in
//! time proportional to the size of the difference, scanned by key range,
//! and edited through a transactional editor.

pub mod cache;
pub mod chunker;
pub mod config;
pub mod context;
pub mod diff;
pub mod editor;
pub mod error;
pub mod hash;
pub mod map;
pub mod node;
pub mod store;
pub mod tuple;

pub use cache::{CacheStats, NodeCache};
pub use config::{ChunkConfig, StoreConfig};
pub use context::Context;
pub use diff::{diff, Change, ChangeKind, Diff};
pub use editor::MapEditor;
pub use error::StoreError;
pub use hash::Hash;
pub use map::{KeyRange, OrderedMap, RangeIter};
pub use node::Node;
pub use store::{MemoryNodeStore, NodeStore, SledNodeStore};
pub use tuple::{Tuple, TupleBuilder};
