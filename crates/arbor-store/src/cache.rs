//! Bounded cache of decoded tree nodes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::hash::Hash;
use crate::node::Node;

/// Default number of decoded nodes kept in memory.
pub const DEFAULT_NODE_CACHE_ENTRIES: usize = 16 * 1024;

struct CachedNode {
    node: Arc<Node>,
    last_used: AtomicU64,
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of nodes dropped to stay under the entry limit.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Node cache with least-recently-used eviction.
///
/// When full, the oldest eighth of the entries is dropped in one pass. A
/// limit of zero disables caching.
pub struct NodeCache {
    entries: DashMap<Hash, CachedNode>,
    max_entries: usize,
    clock: AtomicU64,
    stats: CacheStats,
}

impl NodeCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            clock: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    /// Look up a node, marking it as recently used.
    pub fn get(&self, hash: &Hash) -> Option<Arc<Node>> {
        match self.entries.get(hash) {
            Some(entry) => {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.node))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a node, evicting old entries if the cache is full.
    pub fn insert(&self, hash: Hash, node: Arc<Node>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&hash) {
            self.evict_lru();
        }
        self.entries.insert(
            hash,
            CachedNode {
                node,
                last_used: AtomicU64::new(self.tick()),
            },
        );
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_lru(&self) {
        let mut by_age: Vec<(u64, Hash)> = self
            .entries
            .iter()
            .map(|entry| (entry.last_used.load(Ordering::Relaxed), *entry.key()))
            .collect();
        let count = (self.max_entries / 8).max(1).min(by_age.len());
        if count == 0 {
            return;
        }
        by_age.select_nth_unstable_by_key(count - 1, |(last_used, _)| *last_used);

        for (_, hash) in &by_age[..count] {
            self.entries.remove(hash);
        }
        self.stats.evictions.fetch_add(count as u64, Ordering::Relaxed);
        trace!(evicted = count, remaining = self.entries.len(), "Evicted cached nodes");
    }
}
