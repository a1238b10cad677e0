//! Tree nodes.
//!
//! Leaves hold sorted key/value entries. Internal nodes hold, for each child,
//! the child's greatest key, the child's hash, and the number of entries under
//! it. A node's identity is the blake3 hash of its serialized form.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::StoreError;
use crate::hash::Hash;

/// A tree node.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct Node {
    /// Height above the leaves (0 for leaves).
    pub level: u8,

    /// Entry keys (leaves) or greatest key of each child (internal).
    pub keys: Vec<Vec<u8>>,

    /// Entry values (leaves) or child hashes (internal).
    pub values: Vec<Vec<u8>>,

    /// Entry count of each child subtree. Empty for leaves.
    pub subtree_counts: Vec<u64>,
}

impl Node {
    /// Create a leaf node.
    pub fn leaf(keys: Vec<Vec<u8>>, values: Vec<Vec<u8>>) -> Self {
        Self {
            level: 0,
            keys,
            values,
            subtree_counts: Vec::new(),
        }
    }

    /// Create an internal node.
    pub fn internal(level: u8, keys: Vec<Vec<u8>>, children: Vec<Hash>, counts: Vec<u64>) -> Self {
        Self {
            level,
            keys,
            values: children.iter().map(|h| h.as_bytes().to_vec()).collect(),
            subtree_counts: counts,
        }
    }

    /// An empty leaf, the root of an empty map.
    pub fn empty() -> Self {
        Self::leaf(Vec::new(), Vec::new())
    }

    /// Check if this is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Number of entries (leaf) or children (internal).
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the node has no entries.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Hash of child `i` of an internal node.
    pub fn child(&self, i: usize) -> Result<Hash, StoreError> {
        self.values
            .get(i)
            .and_then(|bytes| Hash::from_slice(bytes))
            .ok_or_else(|| {
                StoreError::Deserialization(format!("node has no child hash at slot {}", i))
            })
    }

    /// Total number of entries under this node.
    pub fn tree_count(&self) -> u64 {
        if self.is_leaf() {
            self.keys.len() as u64
        } else {
            self.subtree_counts.iter().sum()
        }
    }

    /// Index of the first key that is not less than `key`.
    ///
    /// For internal nodes this is the child whose subtree may contain `key`.
    pub fn search(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| k.as_slice() < key)
    }

    /// Serialize the node using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize a node using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        // Buffers handed out by sled carry no alignment guarantee
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}
