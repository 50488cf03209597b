//! Copy-on-write view of lazy storage.
//!
//! [`StorageView`] layers pending diffs over a read-only base without
//! touching it, so several runs can be chained before anything is committed.

use crate::core::value::LazyKind;
use crate::storage::lazy_diff::{DiffEntry, LazyStorageMut, apply_diff};
use crate::storage::storage_trait::{BigMapSnapshot, LazyStorage};
use crate::virtual_machine::errors::VMError;
use std::collections::BTreeMap;

/// Write overlay on top of a base storage.
///
/// Big maps touched by a diff are copied out of the base on first write.
/// Reads check the overlay first and fall through to the base.
pub struct StorageView<'a> {
    base: &'a dyn LazyStorage,
    /// Pending writes: `Some` for a (re)written map, `None` for a removal.
    pub(crate) big_maps: BTreeMap<i64, Option<BigMapSnapshot>>,
    pub(crate) sapling_states: BTreeMap<i64, Option<u16>>,
    next_id: i64,
}

impl<'a> StorageView<'a> {
    pub fn new(base: &'a dyn LazyStorage) -> Self {
        Self {
            base,
            big_maps: BTreeMap::new(),
            sapling_states: BTreeMap::new(),
            next_id: base.next_free_id(),
        }
    }

    /// View of `base` with `diff` applied.
    pub fn with_diff(base: &'a dyn LazyStorage, diff: &[DiffEntry]) -> Result<Self, VMError> {
        let mut view = Self::new(base);
        view.apply(diff)?;
        Ok(view)
    }

    pub fn apply(&mut self, diff: &[DiffEntry]) -> Result<(), VMError> {
        apply_diff(self, diff)
    }

    /// Number of big maps and sapling states written or removed.
    pub fn touched(&self) -> usize {
        self.big_maps.len() + self.sapling_states.len()
    }
}

impl LazyStorage for StorageView<'_> {
    fn big_map(&self, id: i64) -> Option<&BigMapSnapshot> {
        match self.big_maps.get(&id) {
            Some(written) => written.as_ref(),
            None => self.base.big_map(id),
        }
    }

    fn sapling_state(&self, id: i64) -> Option<u16> {
        match self.sapling_states.get(&id) {
            Some(written) => *written,
            None => self.base.sapling_state(id),
        }
    }

    fn next_free_id(&self) -> i64 {
        self.next_id
    }
}

impl LazyStorageMut for StorageView<'_> {
    fn put_big_map(&mut self, id: i64, snapshot: BigMapSnapshot) {
        self.next_id = self.next_id.max(id + 1);
        self.big_maps.insert(id, Some(snapshot));
    }

    fn big_map_mut(&mut self, id: i64) -> Option<&mut BigMapSnapshot> {
        if !self.big_maps.contains_key(&id) {
            let copied = self.base.big_map(id)?.clone();
            self.big_maps.insert(id, Some(copied));
        }
        self.big_maps.get_mut(&id)?.as_mut()
    }

    fn put_sapling_state(&mut self, id: i64, memo_size: u16) {
        self.next_id = self.next_id.max(id + 1);
        self.sapling_states.insert(id, Some(memo_size));
    }

    fn delete(&mut self, kind: LazyKind, id: i64) {
        match kind {
            LazyKind::BigMap => {
                self.big_maps.insert(id, None);
            }
            LazyKind::SaplingState => {
                self.sapling_states.insert(id, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::{Node, Prim};
    use crate::storage::lazy_diff::DiffAction;
    use crate::storage::memory_storage::MemoryStorage;

    fn base() -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        let mut snapshot = BigMapSnapshot::new(Node::prim(Prim::string), Node::prim(Prim::nat));
        snapshot
            .entries
            .insert("k".into(), (Node::string("k"), Node::int(1)));
        storage.insert_big_map(0, snapshot);
        storage
    }

    fn entry(action: DiffAction) -> DiffEntry {
        DiffEntry {
            kind: LazyKind::BigMap,
            id: 0,
            action,
        }
    }

    #[test]
    fn view_reads_through_to_base() {
        let base = base();
        let view = StorageView::new(&base);
        assert_eq!(view.big_map(0).unwrap().get("k"), Some(&Node::int(1)));
        assert!(view.big_map(1).is_none());
        assert_eq!(view.next_free_id(), 1);
    }

    #[test]
    fn writes_shadow_base_without_touching_it() {
        let base = base();
        let view = StorageView::with_diff(
            &base,
            &[entry(DiffAction::Update {
                key: Node::string("k"),
                key_hash: "k".into(),
                value: Node::int(2),
            })],
        )
        .unwrap();
        assert_eq!(view.big_map(0).unwrap().get("k"), Some(&Node::int(2)));
        assert_eq!(base.big_map(0).unwrap().get("k"), Some(&Node::int(1)));
        assert_eq!(view.touched(), 1);
    }

    #[test]
    fn removal_hides_the_base_map() {
        let base = base();
        let view = StorageView::with_diff(&base, &[entry(DiffAction::Remove { key: None })]).unwrap();
        assert!(view.big_map(0).is_none());
        assert!(base.big_map(0).is_some());
    }

    #[test]
    fn write_after_remove_fails() {
        let base = base();
        let result = StorageView::with_diff(
            &base,
            &[
                entry(DiffAction::Remove { key: None }),
                entry(DiffAction::Remove {
                    key: Some((Node::string("k"), "k".into())),
                }),
            ],
        );
        assert!(result.is_err());
    }
}
