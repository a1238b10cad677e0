//! Store and chunking configuration.

use std::path::PathBuf;

use crate::cache::DEFAULT_NODE_CACHE_ENTRIES;

/// Default target fanout for content-defined chunking.
pub const DEFAULT_TARGET_FANOUT: u32 = 32;

/// Default hard cap on encoded node size (16 KiB).
pub const DEFAULT_MAX_NODE_BYTES: usize = 16 * 1024;

/// Configuration for content-defined chunking of tree nodes.
///
/// A node boundary falls after an entry whose key hash lands under
/// `u32::MAX / target_fanout`, so boundaries depend on content rather than on
/// edit history and unchanged regions of two maps produce identical nodes.
/// `max_node_bytes` forces a boundary when a node grows too large.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Expected number of entries per node.
    pub target_fanout: u32,

    /// Maximum accumulated key/value bytes per node.
    pub max_node_bytes: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_fanout: DEFAULT_TARGET_FANOUT,
            max_node_bytes: DEFAULT_MAX_NODE_BYTES,
        }
    }
}

impl ChunkConfig {
    /// Set the target fanout (at least 2).
    pub fn with_target_fanout(mut self, fanout: u32) -> Self {
        self.target_fanout = fanout.max(2);
        self
    }

    /// Set the maximum node size in bytes.
    pub fn with_max_node_bytes(mut self, bytes: usize) -> Self {
        self.max_node_bytes = bytes;
        self
    }

    /// Boundary threshold for key hashes.
    pub(crate) fn boundary_threshold(&self) -> u32 {
        u32::MAX / self.target_fanout.max(2)
    }
}

/// Configuration for the sled-backed node store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the store directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Background flush interval in milliseconds. None disables background
    /// flushing; writes then reach disk only on an explicit flush.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary store (deleted on drop).
    pub temporary: bool,

    /// Maximum number of decoded nodes cached in memory.
    pub node_cache_entries: usize,

    /// Chunking parameters for maps created in this store.
    pub chunking: ChunkConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./arbor_data"),
            cache_capacity: 256 * 1024 * 1024, // 256MB
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
            node_cache_entries: DEFAULT_NODE_CACHE_ENTRIES,
            chunking: ChunkConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the decoded node cache limit. Zero disables the cache.
    pub fn with_node_cache_entries(mut self, entries: usize) -> Self {
        self.node_cache_entries = entries;
        self
    }

    /// Set the background flush interval.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Set the chunking parameters.
    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    /// Disable compression.
    pub fn without_compression(mut self) -> Self {
        self.compression = false;
        self
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config.flush_every_ms(self.flush_every_ms)
    }
}
