//! Immutable ordered maps.
//!
//! An [`OrderedMap`] is a root hash plus the store holding its nodes. It is
//! cheap to clone and never changes; edits go through a [`MapEditor`] and
//! produce a new map.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use crate::chunker::TreeBuilder;
use crate::context::Context;
use crate::editor::MapEditor;
use crate::error::StoreError;
use crate::hash::Hash;
use crate::node::Node;
use crate::store::NodeStore;

/// A range of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl KeyRange {
    /// Every key.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        if prefix.is_empty() {
            return Self::all();
        }
        Self {
            start: Bound::Included(prefix.to_vec()),
            end: match prefix_successor(prefix) {
                Some(end) => Bound::Excluded(end),
                None => Bound::Unbounded,
            },
        }
    }

    /// Keys in `[start, end)`.
    pub fn between(start: &[u8], end: &[u8]) -> Self {
        Self {
            start: Bound::Included(start.to_vec()),
            end: Bound::Excluded(end.to_vec()),
        }
    }

    /// Keys not less than `start`.
    pub fn starting_at(start: &[u8]) -> Self {
        Self {
            start: Bound::Included(start.to_vec()),
            end: Bound::Unbounded,
        }
    }

    /// Check if `key` lies inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        !self.is_before_start(key) && !self.is_past_end(key)
    }

    /// Check if `key` sorts before the start of the range.
    pub fn is_before_start(&self, key: &[u8]) -> bool {
        match &self.start {
            Bound::Included(start) => key < start.as_slice(),
            Bound::Excluded(start) => key <= start.as_slice(),
            Bound::Unbounded => false,
        }
    }

    /// Check if `key` sorts after the end of the range.
    pub fn is_past_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(end) => key > end.as_slice(),
            Bound::Excluded(end) => key >= end.as_slice(),
            Bound::Unbounded => false,
        }
    }

    /// The key a forward scan should seek to.
    fn seek_key(&self) -> &[u8] {
        match &self.start {
            Bound::Included(k) | Bound::Excluded(k) => k,
            Bound::Unbounded => &[],
        }
    }
}

/// Smallest byte string greater than every string starting with `prefix`.
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// An immutable, content-addressed ordered map.
#[derive(Clone)]
pub struct OrderedMap {
    store: Arc<dyn NodeStore>,
    root: Hash,
}

impl OrderedMap {
    /// Create an empty map in `store`.
    pub fn empty(store: Arc<dyn NodeStore>) -> Result<Self, StoreError> {
        let root = store.write(&Node::empty())?;
        Ok(Self { store, root })
    }

    /// Open the map rooted at `root`.
    pub fn load(store: Arc<dyn NodeStore>, root: Hash) -> Self {
        Self { store, root }
    }

    /// Build a map from unordered entries. Later duplicates win.
    pub fn from_entries<I>(store: Arc<dyn NodeStore>, entries: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let sorted: BTreeMap<Vec<u8>, Vec<u8>> = entries.into_iter().collect();
        let mut builder = TreeBuilder::new(store.as_ref(), store.chunk_config());
        for (key, value) in sorted {
            builder.add(key, value)?;
        }
        let (root, _) = builder.finish()?;
        Ok(Self { store, root })
    }

    /// Hash of the root node.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// The node store backing this map.
    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    fn load_node(&self, ctx: &Context, hash: &Hash) -> Result<Arc<Node>, StoreError> {
        ctx.check()?;
        self.store.read(hash)
    }

    /// Number of entries.
    pub fn count(&self, ctx: &Context) -> Result<u64, StoreError> {
        Ok(self.load_node(ctx, &self.root)?.tree_count())
    }

    /// Check if the map has no entries.
    pub fn is_empty(&self, ctx: &Context) -> Result<bool, StoreError> {
        Ok(self.load_node(ctx, &self.root)?.is_empty())
    }

    /// Look up the value stored under `key`.
    pub fn get(&self, ctx: &Context, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut node = self.load_node(ctx, &self.root)?;
        loop {
            let idx = node.search(key);
            if idx == node.len() {
                return Ok(None);
            }
            if node.is_leaf() {
                return Ok((node.keys[idx] == key).then(|| node.values[idx].clone()));
            }
            let child = node.child(idx)?;
            node = self.load_node(ctx, &child)?;
        }
    }

    /// Check if `key` is present.
    pub fn has(&self, ctx: &Context, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(ctx, key)?.is_some())
    }

    /// Iterate over the entries in `range` in ascending key order.
    pub fn iter_range(&self, ctx: &Context, range: KeyRange) -> Result<RangeIter, StoreError> {
        RangeIter::seek(Arc::clone(&self.store), ctx.clone(), self.root, range)
    }

    /// Iterate over every entry.
    pub fn iter_all(&self, ctx: &Context) -> Result<RangeIter, StoreError> {
        self.iter_range(ctx, KeyRange::all())
    }

    /// The first entry in `range`, if any.
    pub fn first_in(
        &self,
        ctx: &Context,
        range: KeyRange,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.iter_range(ctx, range)?.next().transpose()
    }

    /// Start an editor over this map.
    pub fn editor(&self) -> MapEditor {
        MapEditor::new(self.clone())
    }
}

impl PartialEq for OrderedMap {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}

impl Eq for OrderedMap {}

impl fmt::Debug for OrderedMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMap").field("root", &self.root).finish()
    }
}

struct Frame {
    node: Arc<Node>,
    idx: usize,
}

/// Forward iterator over a key range of an [`OrderedMap`].
///
/// Yields an error at most once; the iterator is exhausted afterwards.
pub struct RangeIter {
    store: Arc<dyn NodeStore>,
    ctx: Context,
    stack: Vec<Frame>,
    range: KeyRange,
    done: bool,
}

impl RangeIter {
    fn seek(
        store: Arc<dyn NodeStore>,
        ctx: Context,
        root: Hash,
        range: KeyRange,
    ) -> Result<Self, StoreError> {
        let mut iter = Self {
            store,
            ctx,
            stack: Vec::new(),
            range,
            done: false,
        };

        let mut node = iter.load(&root)?;
        loop {
            let idx = node.search(iter.range.seek_key());
            if node.is_leaf() {
                iter.stack.push(Frame { node, idx });
                break;
            }
            if idx == node.len() {
                iter.done = true;
                break;
            }
            let child = node.child(idx)?;
            iter.stack.push(Frame { node, idx });
            node = iter.load(&child)?;
        }
        Ok(iter)
    }

    fn load(&self, hash: &Hash) -> Result<Arc<Node>, StoreError> {
        self.ctx.check()?;
        self.store.read(hash)
    }

    /// Move to the first entry of the next leaf. Returns false at the end.
    fn advance(&mut self) -> Result<bool, StoreError> {
        self.stack.pop();
        loop {
            let Some(parent) = self.stack.last_mut() else {
                return Ok(false);
            };
            parent.idx += 1;
            if parent.idx < parent.node.len() {
                break;
            }
            self.stack.pop();
        }

        loop {
            let Some(frame) = self.stack.last() else {
                return Ok(false);
            };
            if frame.node.is_leaf() {
                return Ok(true);
            }
            let child = frame.node.child(frame.idx)?;
            let node = self.load(&child)?;
            self.stack.push(Frame { node, idx: 0 });
        }
    }
}

impl Iterator for RangeIter {
    type Item = Result<(Vec<u8>, Vec<u8>), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let Some(leaf) = self.stack.last_mut() else {
                self.done = true;
                return None;
            };

            if leaf.idx < leaf.node.len() {
                let idx = leaf.idx;
                leaf.idx += 1;
                let key = &leaf.node.keys[idx];
                if self.range.is_past_end(key) {
                    self.done = true;
                    return None;
                }
                if self.range.is_before_start(key) {
                    continue;
                }
                return Some(Ok((key.clone(), leaf.node.values[idx].clone())));
            }

            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
