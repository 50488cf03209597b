use crate::core::value::LazyKind;
use crate::storage::lazy_diff::{DiffEntry, LazyStorageMut, apply_diff};
use crate::storage::storage_trait::{BigMapSnapshot, LazyStorage};
use crate::virtual_machine::errors::VMError;
use std::collections::BTreeMap;

/// In-memory lazy storage.
///
/// Holds big maps and sapling states in ordered maps. Used to chain runs
/// in tests and tools: apply the diff of one run before starting the next.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    big_maps: BTreeMap<i64, BigMapSnapshot>,
    sapling_states: BTreeMap<i64, u16>,
    next_id: i64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a big map directly, bypassing the diff machinery.
    pub fn insert_big_map(&mut self, id: i64, snapshot: BigMapSnapshot) {
        self.put_big_map(id, snapshot);
    }

    /// Applies a diff produced by a successful run.
    ///
    /// Entries are applied in order; on error the entries before the failing
    /// one stay applied.
    pub fn apply(&mut self, diff: &[DiffEntry]) -> Result<(), VMError> {
        apply_diff(self, diff)
    }

    fn bump(&mut self, id: i64) {
        self.next_id = self.next_id.max(id + 1);
    }
}

impl LazyStorage for MemoryStorage {
    fn big_map(&self, id: i64) -> Option<&BigMapSnapshot> {
        self.big_maps.get(&id)
    }

    fn sapling_state(&self, id: i64) -> Option<u16> {
        self.sapling_states.get(&id).copied()
    }

    fn next_free_id(&self) -> i64 {
        self.next_id
    }
}

impl LazyStorageMut for MemoryStorage {
    fn put_big_map(&mut self, id: i64, snapshot: BigMapSnapshot) {
        self.bump(id);
        self.big_maps.insert(id, snapshot);
    }

    fn big_map_mut(&mut self, id: i64) -> Option<&mut BigMapSnapshot> {
        self.big_maps.get_mut(&id)
    }

    fn put_sapling_state(&mut self, id: i64, memo_size: u16) {
        self.bump(id);
        self.sapling_states.insert(id, memo_size);
    }

    fn delete(&mut self, kind: LazyKind, id: i64) {
        match kind {
            LazyKind::BigMap => {
                self.big_maps.remove(&id);
            }
            LazyKind::SaplingState => {
                self.sapling_states.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::{Node, Prim};
    use crate::storage::lazy_diff::{DiffAction, Layout};

    fn copy(id: i64, source: Option<i64>) -> DiffEntry {
        DiffEntry {
            kind: LazyKind::BigMap,
            id,
            action: DiffAction::Copy {
                source,
                layout: Layout::BigMap {
                    key_type: Node::prim(Prim::string),
                    value_type: Node::prim(Prim::nat),
                },
            },
        }
    }

    fn update(id: i64, hash: &str, value: i64) -> DiffEntry {
        DiffEntry {
            kind: LazyKind::BigMap,
            id,
            action: DiffAction::Update {
                key: Node::string(hash),
                key_hash: hash.to_string(),
                value: Node::int(value),
            },
        }
    }

    #[test]
    fn copy_clones_the_source() {
        let mut storage = MemoryStorage::new();
        storage
            .apply(&[copy(0, None), update(0, "a", 1), copy(1, Some(0)), update(1, "b", 2)])
            .unwrap();
        assert_eq!(storage.big_map(0).unwrap().entries.len(), 1);
        assert_eq!(storage.big_map(1).unwrap().entries.len(), 2);
        assert_eq!(storage.big_map(1).unwrap().get("a"), Some(&Node::int(1)));
        assert_eq!(storage.next_free_id(), 2);
    }

    #[test]
    fn fresh_map_starts_empty_with_declared_types() {
        let mut storage = MemoryStorage::new();
        storage.apply(&[copy(4, None)]).unwrap();
        assert_eq!(
            storage.big_map(4),
            Some(&BigMapSnapshot::new(Node::prim(Prim::string), Node::prim(Prim::nat)))
        );
        assert_eq!(storage.next_free_id(), 5);
    }

    #[test]
    fn later_updates_override_earlier_ones() {
        let mut storage = MemoryStorage::new();
        storage
            .apply(&[copy(0, None), update(0, "a", 1), update(0, "a", 5)])
            .unwrap();
        assert_eq!(storage.big_map(0).unwrap().get("a"), Some(&Node::int(5)));
    }

    #[test]
    fn whole_removal_forgets_the_map() {
        let mut storage = MemoryStorage::new();
        storage
            .apply(&[
                copy(0, None),
                DiffEntry {
                    kind: LazyKind::BigMap,
                    id: 0,
                    action: DiffAction::Remove { key: None },
                },
            ])
            .unwrap();
        assert!(storage.big_map(0).is_none());
        assert!(matches!(storage.snapshot(0), Err(VMError::StorageResolution { .. })));
        assert_eq!(storage.next_free_id(), 1);
    }

    #[test]
    fn update_of_unknown_map_fails() {
        let mut storage = MemoryStorage::new();
        assert!(storage.apply(&[update(3, "a", 1)]).is_err());
    }

    #[test]
    fn sapling_states_share_the_counter() {
        let mut storage = MemoryStorage::new();
        storage
            .apply(&[
                copy(0, None),
                DiffEntry {
                    kind: LazyKind::SaplingState,
                    id: 1,
                    action: DiffAction::Copy {
                        source: None,
                        layout: Layout::SaplingState { memo_size: 8 },
                    },
                },
            ])
            .unwrap();
        assert_eq!(storage.sapling_state(1), Some(8));
        assert_eq!(storage.next_free_id(), 2);
    }
}
