//! Content-defined chunking of sorted entries into a tree.
//!
//! Entries are fed in ascending key order. A node closes after an entry whose
//! salted key hash falls under the configured threshold, or when the node
//! reaches its byte cap. Each closed node is written to the store and
//! becomes an entry (greatest key, hash, count) of the level above. Internal
//! nodes close only once they hold at least two children, so every level is
//! strictly smaller than the one below it and the build terminates.

use crate::config::ChunkConfig;
use crate::error::StoreError;
use crate::hash::Hash;
use crate::node::Node;
use crate::store::NodeStore;

#[derive(Debug, Default)]
struct PendingLevel {
    keys: Vec<Vec<u8>>,
    values: Vec<Vec<u8>>,
    counts: Vec<u64>,
    bytes: usize,
    emitted: usize,
}

/// Streams sorted entries into a new tree.
pub struct TreeBuilder<'a> {
    store: &'a dyn NodeStore,
    config: ChunkConfig,
    levels: Vec<PendingLevel>,
    entries: u64,
}

impl<'a> TreeBuilder<'a> {
    /// Create a builder writing into `store`.
    pub fn new(store: &'a dyn NodeStore, config: ChunkConfig) -> Self {
        Self {
            store,
            config,
            levels: Vec::new(),
            entries: 0,
        }
    }

    /// Add the next entry. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries += 1;
        self.push(0, key, value, 1)
    }

    /// Number of entries added so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    fn push(&mut self, level: usize, key: Vec<u8>, value: Vec<u8>, count: u64) -> Result<(), StoreError> {
        if self.levels.len() <= level {
            self.levels.push(PendingLevel::default());
        }

        let boundary = {
            let pending = &mut self.levels[level];
            pending.bytes += key.len() + value.len();
            let boundary = is_boundary(&self.config, level, &key, pending.keys.len() + 1, pending.bytes);
            pending.keys.push(key);
            pending.values.push(value);
            pending.counts.push(count);
            boundary
        };

        if boundary {
            self.emit(level)?;
        }
        Ok(())
    }

    /// Close the pending node at `level` and hand it to the level above.
    fn emit(&mut self, level: usize) -> Result<(), StoreError> {
        let (node, last_key) = self.take_node(level);
        let count = node.tree_count();
        let hash = self.store.write(&node)?;
        self.levels[level].emitted += 1;
        self.push(level + 1, last_key, hash.as_bytes().to_vec(), count)
    }

    fn take_node(&mut self, level: usize) -> (Node, Vec<u8>) {
        let pending = &mut self.levels[level];
        let keys = std::mem::take(&mut pending.keys);
        let values = std::mem::take(&mut pending.values);
        let counts = std::mem::take(&mut pending.counts);
        pending.bytes = 0;

        let last_key = keys.last().cloned().unwrap_or_default();
        let node = if level == 0 {
            Node::leaf(keys, values)
        } else {
            Node {
                level: level as u8,
                keys,
                values,
                subtree_counts: counts,
            }
        };
        (node, last_key)
    }

    /// Flush every pending level and return the root hash and entry count.
    pub fn finish(mut self) -> Result<(Hash, u64), StoreError> {
        let mut level = 0;
        loop {
            if level == self.levels.len() {
                // Nothing was ever added
                let hash = self.store.write(&Node::empty())?;
                return Ok((hash, 0));
            }

            let is_top = level + 1 == self.levels.len();
            if is_top && self.levels[level].emitted == 0 {
                let (node, _) = self.take_node(level);
                if !node.is_leaf() && node.len() == 1 {
                    // A single child is its own root
                    return Ok((node.child(0)?, node.tree_count()));
                }
                let count = node.tree_count();
                return Ok((self.store.write(&node)?, count));
            }

            if !self.levels[level].keys.is_empty() {
                self.emit(level)?;
            }
            level += 1;
        }
    }
}

fn is_boundary(config: &ChunkConfig, level: usize, key: &[u8], entries: usize, bytes: usize) -> bool {
    let min_entries = if level == 0 { 1 } else { 2 };
    if entries < min_entries {
        return false;
    }
    if bytes >= config.max_node_bytes {
        return true;
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(&[level as u8]);
    hasher.update(key);
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    let sample = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    sample < config.boundary_threshold()
}
