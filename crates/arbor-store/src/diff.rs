//! Structural diff of two ordered maps.
//!
//! The diff walks both trees at once, keeping for each side a frontier of
//! not-yet-visited items (unexpanded subtrees and individual entries) in key
//! order. Two subtrees with the same hash at the head of both frontiers hold
//! identical entries and are skipped without being loaded, so the work done
//! is proportional to the size of the difference rather than the size of the
//! maps.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::StoreError;
use crate::hash::Hash;
use crate::map::OrderedMap;
use crate::store::NodeStore;

/// The kind of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single difference between two maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The key exists only in the new map.
    Added { key: Vec<u8>, to: Vec<u8> },
    /// The key exists only in the old map.
    Removed { key: Vec<u8>, from: Vec<u8> },
    /// The key exists in both maps with different values.
    Modified {
        key: Vec<u8>,
        from: Vec<u8>,
        to: Vec<u8>,
    },
}

impl Change {
    /// The changed key.
    pub fn key(&self) -> &[u8] {
        match self {
            Change::Added { key, .. } | Change::Removed { key, .. } | Change::Modified { key, .. } => key,
        }
    }

    /// The kind of change.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Added { .. } => ChangeKind::Added,
            Change::Removed { .. } => ChangeKind::Removed,
            Change::Modified { .. } => ChangeKind::Modified,
        }
    }

    /// The value in the old map, if the key existed there.
    pub fn from(&self) -> Option<&[u8]> {
        match self {
            Change::Added { .. } => None,
            Change::Removed { from, .. } | Change::Modified { from, .. } => Some(from),
        }
    }

    /// The value in the new map, if the key exists there.
    pub fn to(&self) -> Option<&[u8]> {
        match self {
            Change::Removed { .. } => None,
            Change::Added { to, .. } | Change::Modified { to, .. } => Some(to),
        }
    }
}

enum Item {
    /// An unexpanded subtree. The level is unknown for roots.
    Subtree { hash: Hash, level: Option<u8> },
    Entry { key: Vec<u8>, value: Vec<u8> },
}

enum Step {
    Done,
    SkipBoth,
    ExpandBefore,
    ExpandAfter,
    ExpandBoth,
    TakeBefore,
    TakeAfter,
    TakeBoth,
}

/// One side of the diff. The frontier is a stack whose top is the smallest
/// remaining item.
struct Side {
    store: Arc<dyn NodeStore>,
    frontier: Vec<Item>,
}

impl Side {
    fn new(map: &OrderedMap) -> Self {
        Self {
            store: Arc::clone(map.store()),
            frontier: vec![Item::Subtree {
                hash: map.root(),
                level: None,
            }],
        }
    }

    /// Replace the subtree at the head of the frontier with its contents.
    fn expand(&mut self, ctx: &Context) -> Result<(), StoreError> {
        let Some(Item::Subtree { hash, .. }) = self.frontier.pop() else {
            return Ok(());
        };
        ctx.check()?;
        let node = self.store.read(&hash)?;

        if node.is_leaf() {
            for (key, value) in node.keys.iter().zip(&node.values).rev() {
                self.frontier.push(Item::Entry {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        } else {
            let level = Some(node.level - 1);
            for i in (0..node.len()).rev() {
                self.frontier.push(Item::Subtree {
                    hash: node.child(i)?,
                    level,
                });
            }
        }
        Ok(())
    }

    fn take_entry(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        match self.frontier.pop() {
            Some(Item::Entry { key, value }) => Some((key, value)),
            _ => None,
        }
    }
}

/// Lazy sequence of [`Change`]s between two maps, in ascending key order.
///
/// An error ends the sequence: it is yielded once and the iterator is
/// exhausted afterwards.
pub struct Diff {
    ctx: Context,
    before: Side,
    after: Side,
    skipped: u64,
    expanded: u64,
    done: bool,
}

/// Diff `before` against `after`.
pub fn diff(ctx: &Context, before: &OrderedMap, after: &OrderedMap) -> Diff {
    let mut diff = Diff {
        ctx: ctx.clone(),
        before: Side::new(before),
        after: Side::new(after),
        skipped: 0,
        expanded: 0,
        done: false,
    };
    if before.root() == after.root() {
        diff.before.frontier.clear();
        diff.after.frontier.clear();
    }
    diff
}

impl Diff {
    /// Number of identical subtrees skipped so far.
    pub fn skipped_subtrees(&self) -> u64 {
        self.skipped
    }

    fn decide(&self) -> Step {
        use Item::{Entry, Subtree};

        match (self.before.frontier.last(), self.after.frontier.last()) {
            (None, None) => Step::Done,
            (Some(Subtree { .. }), None) => Step::ExpandBefore,
            (Some(Entry { .. }), None) => Step::TakeBefore,
            (None, Some(Subtree { .. })) => Step::ExpandAfter,
            (None, Some(Entry { .. })) => Step::TakeAfter,
            (Some(Subtree { hash: a, level: la }), Some(Subtree { hash: b, level: lb })) => {
                if a == b {
                    Step::SkipBoth
                } else {
                    match (la, lb) {
                        (Some(la), Some(lb)) if la > lb => Step::ExpandBefore,
                        (Some(la), Some(lb)) if la < lb => Step::ExpandAfter,
                        _ => Step::ExpandBoth,
                    }
                }
            }
            (Some(Subtree { .. }), Some(Entry { .. })) => Step::ExpandBefore,
            (Some(Entry { .. }), Some(Subtree { .. })) => Step::ExpandAfter,
            (Some(Entry { key: a, .. }), Some(Entry { key: b, .. })) => match a.cmp(b) {
                Ordering::Less => Step::TakeBefore,
                Ordering::Greater => Step::TakeAfter,
                Ordering::Equal => Step::TakeBoth,
            },
        }
    }

    /// Advance until the next change. `Ok(None)` means both trees are exhausted.
    fn step(&mut self) -> Result<Option<Change>, StoreError> {
        loop {
            match self.decide() {
                Step::Done => return Ok(None),
                Step::SkipBoth => {
                    self.before.frontier.pop();
                    self.after.frontier.pop();
                    self.skipped += 1;
                }
                Step::ExpandBefore => {
                    self.before.expand(&self.ctx)?;
                    self.expanded += 1;
                }
                Step::ExpandAfter => {
                    self.after.expand(&self.ctx)?;
                    self.expanded += 1;
                }
                Step::ExpandBoth => {
                    self.before.expand(&self.ctx)?;
                    self.after.expand(&self.ctx)?;
                    self.expanded += 2;
                }
                Step::TakeBefore => {
                    if let Some((key, from)) = self.before.take_entry() {
                        return Ok(Some(Change::Removed { key, from }));
                    }
                }
                Step::TakeAfter => {
                    if let Some((key, to)) = self.after.take_entry() {
                        return Ok(Some(Change::Added { key, to }));
                    }
                }
                Step::TakeBoth => {
                    let before = self.before.take_entry();
                    let after = self.after.take_entry();
                    if let (Some((key, from)), Some((_, to))) = (before, after) {
                        if from != to {
                            return Ok(Some(Change::Modified { key, from, to }));
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for Diff {
    type Item = Result<Change, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(change)) => Some(Ok(change)),
            Ok(None) => {
                self.done = true;
                debug!(
                    skipped_subtrees = self.skipped,
                    expanded_nodes = self.expanded,
                    "Diff finished"
                );
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;
    use crate::store::MemoryNodeStore;
    use std::collections::BTreeMap;

    /// Deterministic pseudo-random sequence.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn key(i: u64) -> Vec<u8> {
        i.to_be_bytes().to_vec()
    }

    fn naive_diff(before: &BTreeMap<Vec<u8>, Vec<u8>>, after: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<Change> {
        let mut keys: Vec<&Vec<u8>> = before.keys().chain(after.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|k| match (before.get(k), after.get(k)) {
                (Some(from), None) => Some(Change::Removed { key: k.clone(), from: from.clone() }),
                (None, Some(to)) => Some(Change::Added { key: k.clone(), to: to.clone() }),
                (Some(from), Some(to)) if from != to => Some(Change::Modified {
                    key: k.clone(),
                    from: from.clone(),
                    to: to.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_diff_matches_naive_comparison() {
        let ctx = Context::background();
        let store: Arc<dyn NodeStore> = Arc::new(MemoryNodeStore::with_chunking(
            ChunkConfig::default().with_target_fanout(6),
        ));
        let mut rng = Lcg(7);

        let before: BTreeMap<_, _> = (0..2000u64).map(|i| (key(i * 3), key(rng.next()))).collect();
        let mut after = before.clone();
        for _ in 0..150 {
            let k = key(rng.next() % 6000);
            match rng.next() % 3 {
                0 => {
                    after.remove(&k);
                }
                _ => {
                    after.insert(k, key(rng.next()));
                }
            }
        }

        let before_map = OrderedMap::from_entries(Arc::clone(&store), before.clone()).unwrap();
        let after_map = OrderedMap::from_entries(Arc::clone(&store), after.clone()).unwrap();

        let changes: Vec<Change> = diff(&ctx, &before_map, &after_map)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(changes, naive_diff(&before, &after));

        let reversed: Vec<Change> = diff(&ctx, &after_map, &before_map)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(reversed, naive_diff(&after, &before));
    }

    #[test]
    fn test_diff_skips_shared_subtrees() {
        let ctx = Context::background();
        let store = Arc::new(MemoryNodeStore::with_chunking(
            ChunkConfig::default().with_target_fanout(8),
        ));
        let shared: Arc<dyn NodeStore> = store.clone();

        let before = OrderedMap::from_entries(
            Arc::clone(&shared),
            (0..10_000u64).map(|i| (key(i), b"value".to_vec())),
        )
        .unwrap();
        let mut editor = before.editor();
        editor.put(key(4321), b"VALUE".to_vec());
        let after = editor.flush(&ctx).unwrap();

        let reads_before = store.reads();
        let mut diff = diff(&ctx, &before, &after);
        let changes: Vec<Change> = diff.by_ref().collect::<Result<_, _>>().unwrap();
        let reads = store.reads() - reads_before;

        assert_eq!(
            changes,
            vec![Change::Modified {
                key: key(4321),
                from: b"value".to_vec(),
                to: b"VALUE".to_vec(),
            }]
        );
        assert!(reads < 50, "diff loaded {} nodes", reads);
        assert!(diff.skipped_subtrees() > 0);
    }

    #[test]
    fn test_identical_maps_load_nothing() {
        let ctx = Context::background();
        let store = Arc::new(MemoryNodeStore::new());
        let shared: Arc<dyn NodeStore> = store.clone();
        let map = OrderedMap::from_entries(shared, (0..100u64).map(|i| (key(i), vec![]))).unwrap();

        let reads_before = store.reads();
        assert_eq!(diff(&ctx, &map, &map.clone()).count(), 0);
        assert_eq!(store.reads(), reads_before);
    }

    #[test]
    fn test_diff_against_empty_map() {
        let ctx = Context::background();
        let store = MemoryNodeStore::shared();
        let empty = OrderedMap::empty(Arc::clone(&store)).unwrap();
        let map = OrderedMap::from_entries(store, (0..3u64).map(|i| (key(i), vec![1]))).unwrap();

        let changes: Vec<ChangeKind> = diff(&ctx, &empty, &map).map(|c| c.unwrap().kind()).collect();
        assert_eq!(changes, vec![ChangeKind::Added; 3]);

        let removed: Vec<Change> = diff(&ctx, &map, &empty).map(|c| c.unwrap()).collect();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].from(), Some(&[1u8][..]));
        assert_eq!(removed[0].to(), None);
    }

    #[test]
    fn test_cancelled_diff_yields_error_once() {
        let ctx = Context::background();
        let store = MemoryNodeStore::shared();
        let a = OrderedMap::from_entries(Arc::clone(&store), vec![(key(1), vec![1])]).unwrap();
        let b = OrderedMap::from_entries(store, vec![(key(1), vec![2])]).unwrap();

        ctx.cancel();
        let mut diff = diff(&ctx, &a, &b);
        assert!(matches!(diff.next(), Some(Err(StoreError::Cancelled))));
        assert!(diff.next().is_none());
    }
}
