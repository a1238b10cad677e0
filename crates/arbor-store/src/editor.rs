//! Transactional editing of ordered maps.

use std::collections::BTreeMap;
use std::ops::Bound;

use tracing::debug;

use crate::chunker::TreeBuilder;
use crate::context::Context;
use crate::error::StoreError;
use crate::map::{KeyRange, OrderedMap};

/// Accumulates point writes against a base map.
///
/// Reads through the editor see its pending writes. [`MapEditor::flush`]
/// consumes the editor and produces the edited map; the base map is never
/// changed.
pub struct MapEditor {
    base: OrderedMap,
    /// Pending edits; `None` marks a deletion.
    edits: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl MapEditor {
    /// Start editing `base`.
    pub fn new(base: OrderedMap) -> Self {
        Self {
            base,
            edits: BTreeMap::new(),
        }
    }

    /// The map this editor started from.
    pub fn base(&self) -> &OrderedMap {
        &self.base
    }

    /// Set `key` to `value`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.edits.insert(key, Some(value));
    }

    /// Remove `key`.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.edits.insert(key, None);
    }

    /// Look up `key`, seeing pending writes.
    pub fn get(&self, ctx: &Context, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.edits.get(key) {
            Some(edit) => Ok(edit.clone()),
            None => self.base.get(ctx, key),
        }
    }

    /// Check if `key` is present, seeing pending writes.
    pub fn has(&self, ctx: &Context, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(ctx, key)?.is_some())
    }

    /// Collect the entries in `range`, seeing pending writes.
    pub fn scan(
        &self,
        ctx: &Context,
        range: &KeyRange,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for entry in self.base.iter_range(ctx, range.clone())? {
            let (key, value) = entry?;
            merged.insert(key, value);
        }

        let pending = self
            .edits
            .range::<Vec<u8>, _>((range.start.clone(), Bound::Unbounded))
            .take_while(|(key, _)| !range.is_past_end(key));
        for (key, edit) in pending {
            match edit {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Number of pending edits.
    pub fn pending(&self) -> usize {
        self.edits.len()
    }

    /// Check if any edit is pending.
    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Apply the pending edits and return the new map.
    ///
    /// The base map is streamed and merged with the edits into a fresh tree.
    /// Unchanged regions chunk identically and resolve to nodes already in the
    /// store.
    pub fn flush(self, ctx: &Context) -> Result<OrderedMap, StoreError> {
        if self.edits.is_empty() {
            return Ok(self.base);
        }

        let store = self.base.store().clone();
        let mut builder = TreeBuilder::new(store.as_ref(), store.chunk_config());
        let mut base = self.base.iter_all(ctx)?.peekable();
        let mut edits = self.edits.into_iter().peekable();

        loop {
            let take_base = match (base.peek(), edits.peek()) {
                (None, None) => break,
                (Some(Err(_)), _) => true,
                (Some(Ok((base_key, _))), Some((edit_key, _))) => base_key < edit_key,
                (Some(_), None) => true,
                (None, Some(_)) => false,
            };

            if take_base {
                if let Some(entry) = base.next() {
                    let (key, value) = entry?;
                    builder.add(key, value)?;
                }
                continue;
            }

            if let Some((key, edit)) = edits.next() {
                // Drop the base entry the edit replaces
                if matches!(base.peek(), Some(Ok((base_key, _))) if *base_key == key) {
                    base.next();
                }
                if let Some(value) = edit {
                    builder.add(key, value)?;
                }
            }
        }

        let entries = builder.entries();
        let (root, _) = builder.finish()?;
        debug!(
            base = %self.base.root(),
            root = %root,
            entries,
            "Flushed map edits"
        );
        Ok(OrderedMap::load(store, root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNodeStore;

    fn base() -> OrderedMap {
        OrderedMap::from_entries(
            MemoryNodeStore::shared(),
            (0u8..10).map(|i| (vec![i], vec![i * 10])),
        )
        .unwrap()
    }

    #[test]
    fn test_reads_see_pending_writes() {
        let ctx = Context::background();
        let mut editor = base().editor();
        editor.put(vec![3], vec![99]);
        editor.delete(vec![4]);
        editor.put(vec![20], vec![1]);

        assert_eq!(editor.get(&ctx, &[3]).unwrap(), Some(vec![99]));
        assert_eq!(editor.get(&ctx, &[4]).unwrap(), None);
        assert!(editor.has(&ctx, &[20]).unwrap());
        assert!(editor.has(&ctx, &[5]).unwrap());

        let scanned = editor.scan(&ctx, &KeyRange::between(&[2], &[6])).unwrap();
        assert_eq!(
            scanned,
            vec![(vec![2], vec![20]), (vec![3], vec![99]), (vec![5], vec![50])]
        );
    }

    #[test]
    fn test_flush_applies_edits() {
        let ctx = Context::background();
        let original = base();
        let mut editor = original.editor();
        editor.put(vec![3], vec![99]);
        editor.delete(vec![0]);
        editor.delete(vec![42]);
        editor.put(vec![20], vec![1]);
        let edited = editor.flush(&ctx).unwrap();

        let entries: Vec<_> = edited.iter_all(&ctx).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 10);
        assert_eq!(entries[0], (vec![1], vec![10]));
        assert_eq!(entries[2], (vec![3], vec![99]));
        assert_eq!(entries[9], (vec![20], vec![1]));

        // The base map is untouched
        assert_eq!(original.get(&ctx, &[3]).unwrap(), Some(vec![30]));
        assert_eq!(original.count(&ctx).unwrap(), 10);
    }

    #[test]
    fn test_flush_without_edits_keeps_root() {
        let ctx = Context::background();
        let original = base();
        let flushed = original.editor().flush(&ctx).unwrap();
        assert_eq!(flushed.root(), original.root());
    }

    #[test]
    fn test_reverting_edit_restores_root() {
        let ctx = Context::background();
        let original = base();

        let mut editor = original.editor();
        editor.delete(vec![7]);
        let without = editor.flush(&ctx).unwrap();
        assert_ne!(without.root(), original.root());

        let mut editor = without.editor();
        editor.put(vec![7], vec![70]);
        let restored = editor.flush(&ctx).unwrap();
        assert_eq!(restored.root(), original.root());
    }
}
