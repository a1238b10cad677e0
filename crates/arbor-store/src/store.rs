//! Content-addressed node storage.
//!
//! Nodes are written once and addressed by the hash of their serialized
//! bytes, so identical subtrees of different maps are stored once and share a
//! hash.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use sled::{Db, Tree};
use tracing::debug;

use crate::cache::{CacheStats, NodeCache};
use crate::config::{ChunkConfig, StoreConfig};
use crate::error::StoreError;
use crate::hash::Hash;
use crate::node::Node;

/// Tree name for serialized nodes.
const NODES_TREE: &str = "nodes";

/// Tree name for named root pointers.
const ROOTS_TREE: &str = "roots";

/// Storage for immutable tree nodes.
pub trait NodeStore: Send + Sync {
    /// Read the node with the given hash.
    fn read(&self, hash: &Hash) -> Result<Arc<Node>, StoreError>;

    /// Write a node and return its hash.
    fn write(&self, node: &Node) -> Result<Hash, StoreError>;

    /// Check whether a node is present.
    fn contains(&self, hash: &Hash) -> Result<bool, StoreError>;

    /// Chunking parameters for maps built on this store.
    fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig::default()
    }
}

/// In-memory node store.
#[derive(Default)]
pub struct MemoryNodeStore {
    nodes: DashMap<Hash, Arc<Node>>,
    chunking: ChunkConfig,
    reads: AtomicU64,
}

impl MemoryNodeStore {
    /// Create an empty store with default chunking.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given chunking parameters.
    pub fn with_chunking(chunking: ChunkConfig) -> Self {
        Self {
            chunking,
            ..Default::default()
        }
    }

    /// Create a shareable store.
    pub fn shared() -> Arc<dyn NodeStore> {
        Arc::new(Self::new())
    }

    /// Number of distinct nodes stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of node reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl NodeStore for MemoryNodeStore {
    fn read(&self, hash: &Hash) -> Result<Arc<Node>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.nodes
            .get(hash)
            .map(|n| Arc::clone(n.value()))
            .ok_or(StoreError::MissingNode(*hash))
    }

    fn write(&self, node: &Node) -> Result<Hash, StoreError> {
        let hash = Hash::of(&node.to_bytes()?);
        self.nodes
            .entry(hash)
            .or_insert_with(|| Arc::new(node.clone()));
        Ok(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        Ok(self.nodes.contains_key(hash))
    }

    fn chunk_config(&self) -> ChunkConfig {
        self.chunking
    }
}

/// Node store persisted in sled, with a bounded cache of decoded nodes.
pub struct SledNodeStore {
    db: Db,
    nodes: Tree,
    roots: Tree,
    cache: NodeCache,
    chunking: ChunkConfig,
}

impl SledNodeStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        let nodes = db.open_tree(NODES_TREE)?;
        let roots = db.open_tree(ROOTS_TREE)?;

        debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "Opened node store"
        );

        Ok(Self {
            db,
            nodes,
            roots,
            cache: NodeCache::new(config.node_cache_entries),
            chunking: config.chunking,
        })
    }

    /// Record `hash` as the root stored under `name`.
    pub fn set_root(&self, name: &str, hash: Hash) -> Result<(), StoreError> {
        self.roots.insert(name.as_bytes(), hash.as_bytes().as_slice())?;
        Ok(())
    }

    /// Look up the root stored under `name`.
    pub fn root(&self, name: &str) -> Result<Option<Hash>, StoreError> {
        match self.roots.get(name.as_bytes())? {
            Some(bytes) => Hash::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| StoreError::Deserialization(format!("corrupt root '{}'", name))),
            None => Ok(None),
        }
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of distinct nodes stored.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of decoded nodes currently cached.
    pub fn cached_nodes(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.stats()
    }
}

impl NodeStore for SledNodeStore {
    fn read(&self, hash: &Hash) -> Result<Arc<Node>, StoreError> {
        if let Some(node) = self.cache.get(hash) {
            return Ok(node);
        }

        let bytes = self
            .nodes
            .get(hash.as_bytes())?
            .ok_or(StoreError::MissingNode(*hash))?;
        let node = Arc::new(Node::from_bytes(&bytes)?);
        self.cache.insert(*hash, Arc::clone(&node));
        Ok(node)
    }

    fn write(&self, node: &Node) -> Result<Hash, StoreError> {
        let bytes = node.to_bytes()?;
        let hash = Hash::of(&bytes);
        if !self.nodes.contains_key(hash.as_bytes())? {
            self.nodes.insert(hash.as_bytes(), bytes)?;
        }
        Ok(hash)
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        if self.cache.contains(hash) {
            return Ok(true);
        }
        Ok(self.nodes.contains_key(hash.as_bytes())?)
    }

    fn chunk_config(&self) -> ChunkConfig {
        self.chunking
    }
}
