//! Lazy storage diffs: what a run did to big maps and sapling states.
//!
//! [`extract`] reconciles the overlays left in a post-run value into an
//! ordered [`LazyDiff`] and rewrites the value's identifiers. [`merge`] goes
//! the other way and folds a diff back into the placeholders of a value.
//! [`apply_diff`] writes a diff into any [`LazyStorageMut`].
//!
//! Entries apply in order. Identifiers only originate from `Copy`.

use crate::core::data::parse_data;
use crate::core::ty::TypeInterner;
use crate::core::unparse::{Mode, key_hash, unparse};
use crate::core::value::{LazyKind, Value};
use crate::micheline::Node;
use crate::storage::storage_trait::{BigMapSnapshot, LazyStorage};
use crate::virtual_machine::errors::VMError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Shape of a lazily stored structure, carried by `Copy`.
#[derive(Clone, Debug, PartialEq)]
pub enum Layout {
    BigMap { key_type: Node, value_type: Node },
    SaplingState { memo_size: u16 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum DiffAction {
    /// Allocates the target id, starting from the contents of `source` when set.
    Copy { source: Option<i64>, layout: Layout },
    /// Binds `key` (stored under `key_hash`) to `value`.
    Update { key: Node, key_hash: String, value: Node },
    /// Removes one key, or the whole structure when `key` is `None`.
    Remove { key: Option<(Node, String)> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiffEntry {
    pub kind: LazyKind,
    pub id: i64,
    pub action: DiffAction,
}

pub type LazyDiff = Vec<DiffEntry>;

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: ", self.kind.as_str(), self.id)?;
        match &self.action {
            DiffAction::Copy { source: Some(s), .. } => write!(f, "copy from {}", s),
            DiffAction::Copy { source: None, .. } => f.write_str("alloc"),
            DiffAction::Update { key, value, .. } => write!(f, "{} => {}", key, value),
            DiffAction::Remove { key: Some((key, _)) } => write!(f, "remove {}", key),
            DiffAction::Remove { key: None } => f.write_str("remove"),
        }
    }
}

/// Hands out fresh lazy storage identifiers.
#[derive(Clone, Copy, Debug)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    pub fn new(next: i64) -> Self {
        Self { next }
    }

    /// Starts right after the last identifier `storage` knows about.
    pub fn from_storage(storage: &dyn LazyStorage) -> Self {
        Self::new(storage.next_free_id())
    }

    pub fn fresh(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn peek(&self) -> i64 {
        self.next
    }
}

fn lazy_ids(value: &Value) -> BTreeMap<i64, LazyKind> {
    let mut ids = BTreeMap::new();
    value.for_each_lazy(&mut |v| match v {
        Value::BigMap(map) => {
            if let Some(id) = map.id {
                ids.insert(id, LazyKind::BigMap);
            }
        }
        Value::SaplingState { id: Some(id), .. } => {
            ids.insert(*id, LazyKind::SaplingState);
        }
        _ => {}
    });
    ids
}

/// Reconciles the post-run value `post` against the pre-run value `pre`.
///
/// An identifier present in `pre` is kept by its first occurrence in
/// `post`. Any other structure (fresh, duplicated or foreign) is given a new
/// identifier through a `Copy` of its old one. All copies come first so they
/// observe the stored contents of their sources; overlay writes follow in key
/// order, then whole removals of identifiers `post` dropped. Overlays are
/// cleared and identifiers rewritten in place.
pub fn extract(pre: &Value, post: &mut Value, allocator: &mut IdAllocator) -> Result<LazyDiff, VMError> {
    let pre_ids = lazy_ids(pre);
    let mut kept = BTreeSet::new();
    let mut copies = Vec::new();
    let mut updates = Vec::new();

    post.for_each_lazy_mut(&mut |v| -> Result<(), VMError> {
        match v {
            Value::BigMap(map) => {
                let (id, fresh) = match map.id {
                    Some(id) if pre_ids.contains_key(&id) && kept.insert(id) => (id, false),
                    source => {
                        let id = allocator.fresh();
                        copies.push(DiffEntry {
                            kind: LazyKind::BigMap,
                            id,
                            action: DiffAction::Copy {
                                source,
                                layout: Layout::BigMap {
                                    key_type: map.key_type.to_node(),
                                    value_type: map.value_type.to_node(),
                                },
                            },
                        });
                        (id, source.is_none())
                    }
                };
                for (key, value) in std::mem::take(&mut map.overlay) {
                    let hash = key_hash(&key, &map.key_type)?;
                    let key = unparse(&key, &map.key_type, Mode::Optimized)?;
                    let action = match value {
                        Some(value) => DiffAction::Update {
                            key,
                            key_hash: hash,
                            value: unparse(&value, &map.value_type, Mode::Optimized)?,
                        },
                        None if fresh => continue,
                        None => DiffAction::Remove {
                            key: Some((key, hash)),
                        },
                    };
                    updates.push(DiffEntry {
                        kind: LazyKind::BigMap,
                        id,
                        action,
                    });
                }
                map.id = Some(id);
            }
            Value::SaplingState { id, memo_size } => match *id {
                Some(existing) if pre_ids.contains_key(&existing) && kept.insert(existing) => {}
                source => {
                    let fresh = allocator.fresh();
                    copies.push(DiffEntry {
                        kind: LazyKind::SaplingState,
                        id: fresh,
                        action: DiffAction::Copy {
                            source,
                            layout: Layout::SaplingState {
                                memo_size: *memo_size,
                            },
                        },
                    });
                    *id = Some(fresh);
                }
            },
            _ => {}
        }
        Ok(())
    })?;

    let removals = pre_ids
        .into_iter()
        .filter(|(id, _)| !kept.contains(id))
        .map(|(id, kind)| DiffEntry {
            kind,
            id,
            action: DiffAction::Remove { key: None },
        });
    copies.extend(updates);
    copies.extend(removals);
    Ok(copies)
}

/// Net effect of a diff on one identifier, relative to pre-diff storage.
struct Resolved {
    /// Stored identifier the contents start from.
    base: Option<i64>,
    /// Key hash to key and new value (`None` for removals).
    changes: BTreeMap<String, (Node, Option<Node>)>,
}

fn resolve(diff: &[DiffEntry], kind: LazyKind, id: i64) -> Resolved {
    let mut resolved = Resolved {
        base: Some(id),
        changes: BTreeMap::new(),
    };
    for (i, entry) in diff.iter().enumerate() {
        if entry.id != id || entry.kind != kind {
            continue;
        }
        match &entry.action {
            DiffAction::Copy { source: Some(source), .. } => {
                resolved = resolve(&diff[..i], kind, *source);
            }
            DiffAction::Copy { source: None, .. } | DiffAction::Remove { key: None } => {
                resolved = Resolved {
                    base: None,
                    changes: BTreeMap::new(),
                };
            }
            DiffAction::Update { key, key_hash, value } => {
                resolved
                    .changes
                    .insert(key_hash.clone(), (key.clone(), Some(value.clone())));
            }
            DiffAction::Remove { key: Some((key, key_hash)) } => {
                if resolved.base.is_some() {
                    resolved.changes.insert(key_hash.clone(), (key.clone(), None));
                } else {
                    resolved.changes.remove(key_hash);
                }
            }
        }
    }
    resolved
}

/// Folds `diff` into the placeholders of `value`.
///
/// Afterwards every big map reads, against the storage the diff was computed
/// on, as it would against storage with the diff applied: identifiers
/// allocated by the diff are traced back to their source and the entries
/// written since become overlay entries.
pub fn merge(value: &mut Value, diff: &[DiffEntry], interner: &mut TypeInterner) -> Result<(), VMError> {
    value.for_each_lazy_mut(&mut |v| -> Result<(), VMError> {
        match v {
            Value::BigMap(map) => {
                let Some(id) = map.id else {
                    return Ok(());
                };
                let resolved = resolve(diff, LazyKind::BigMap, id);
                map.id = resolved.base;
                for (_, (key, value)) in resolved.changes {
                    let key = parse_data(&key, &map.key_type, interner)?;
                    let value = value
                        .map(|node| parse_data(&node, &map.value_type, interner))
                        .transpose()?;
                    map.overlay.insert(key, value);
                }
            }
            Value::SaplingState { id, .. } => {
                if let Some(current) = *id {
                    *id = resolve(diff, LazyKind::SaplingState, current).base;
                }
            }
            _ => {}
        }
        Ok(())
    })
}

/// Storage that lazy diffs can be written to.
pub trait LazyStorageMut: LazyStorage {
    fn put_big_map(&mut self, id: i64, snapshot: BigMapSnapshot);

    /// Mutable access to a big map, `None` if `id` is unknown.
    fn big_map_mut(&mut self, id: i64) -> Option<&mut BigMapSnapshot>;

    fn put_sapling_state(&mut self, id: i64, memo_size: u16);

    fn delete(&mut self, kind: LazyKind, id: i64);
}

/// Writes `diff` into `storage`, entry by entry.
///
/// Stops at the first entry referring to an unknown identifier.
pub fn apply_diff(storage: &mut dyn LazyStorageMut, diff: &[DiffEntry]) -> Result<(), VMError> {
    let unknown = |kind: LazyKind, id: i64| VMError::StorageResolution {
        kind: kind.as_str(),
        id,
    };
    for entry in diff {
        match &entry.action {
            DiffAction::Copy {
                source,
                layout: Layout::BigMap { key_type, value_type },
            } => {
                let mut snapshot = BigMapSnapshot::new(key_type.clone(), value_type.clone());
                if let Some(source) = source {
                    snapshot.entries = storage.snapshot(*source)?.entries.clone();
                }
                storage.put_big_map(entry.id, snapshot);
            }
            DiffAction::Copy {
                source,
                layout: Layout::SaplingState { memo_size },
            } => {
                if let Some(source) = source {
                    storage.memo_size(*source)?;
                }
                storage.put_sapling_state(entry.id, *memo_size);
            }
            DiffAction::Update { key, key_hash, value } => {
                storage
                    .big_map_mut(entry.id)
                    .ok_or_else(|| unknown(entry.kind, entry.id))?
                    .entries
                    .insert(key_hash.clone(), (key.clone(), value.clone()));
            }
            DiffAction::Remove {
                key: Some((_, key_hash)),
            } => {
                storage
                    .big_map_mut(entry.id)
                    .ok_or_else(|| unknown(entry.kind, entry.id))?
                    .entries
                    .remove(key_hash);
            }
            DiffAction::Remove { key: None } => storage.delete(entry.kind, entry.id),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ty::Type;
    use crate::core::value::BigMap;
    use crate::storage::memory_storage::MemoryStorage;

    fn nat_map(id: Option<i64>, overlay: &[(u64, Option<u64>)]) -> Value {
        let mut map = BigMap::empty(Type::nat(), Type::nat());
        map.id = id;
        for (k, v) in overlay {
            map.overlay.insert(Value::nat(*k), v.map(Value::nat));
        }
        Value::BigMap(map)
    }

    fn id_of(value: &Value) -> Option<i64> {
        match value {
            Value::BigMap(map) => map.id,
            _ => None,
        }
    }

    #[test]
    fn kept_map_only_writes_its_overlay() {
        let pre = nat_map(Some(0), &[]);
        let mut post = nat_map(Some(0), &[(1, Some(10)), (2, None)]);
        let diff = extract(&pre, &mut post, &mut IdAllocator::new(1)).unwrap();
        assert_eq!(diff.len(), 2);
        assert!(matches!(diff[0].action, DiffAction::Update { .. }));
        assert!(matches!(diff[1].action, DiffAction::Remove { key: Some(_) }));
        assert_eq!(id_of(&post), Some(0));
        assert!(matches!(&post, Value::BigMap(map) if map.overlay.is_empty()));
    }

    #[test]
    fn fresh_map_is_allocated_by_copy() {
        let pre = Value::Unit;
        let mut post = nat_map(None, &[(1, Some(1)), (5, None)]);
        let diff = extract(&pre, &mut post, &mut IdAllocator::new(7)).unwrap();
        assert_eq!(diff.len(), 2);
        assert_eq!(diff[0].id, 7);
        assert!(matches!(diff[0].action, DiffAction::Copy { source: None, .. }));
        assert!(matches!(diff[1].action, DiffAction::Update { .. }));
        assert_eq!(id_of(&post), Some(7));
    }

    #[test]
    fn duplicates_copy_before_any_write() {
        let pre = nat_map(Some(3), &[]);
        let mut post = Value::pair(nat_map(Some(3), &[(1, Some(1))]), nat_map(Some(3), &[(2, Some(2))]));
        let diff = extract(&pre, &mut post, &mut IdAllocator::new(4)).unwrap();
        assert!(matches!(diff[0].action, DiffAction::Copy { source: Some(3), .. }));
        assert_eq!(diff[0].id, 4);
        assert_eq!((diff[1].id, diff[2].id), (3, 4));
    }

    #[test]
    fn dropped_ids_are_removed() {
        let pre = Value::pair(nat_map(Some(0), &[]), nat_map(Some(1), &[]));
        let mut post = Value::pair(nat_map(Some(1), &[]), Value::Unit);
        let diff = extract(&pre, &mut post, &mut IdAllocator::new(2)).unwrap();
        assert_eq!(
            diff,
            vec![DiffEntry {
                kind: LazyKind::BigMap,
                id: 0,
                action: DiffAction::Remove { key: None },
            }]
        );
    }

    #[test]
    fn update_then_remove_leaves_key_absent() {
        let mut storage = MemoryStorage::new();
        let pre = Value::Unit;
        let mut post = nat_map(None, &[(1, Some(1))]);
        let first = extract(&pre, &mut post, &mut IdAllocator::from_storage(&storage)).unwrap();
        storage.apply(&first).unwrap();

        let pre = post.clone();
        let mut post = nat_map(Some(0), &[(1, None)]);
        let second = extract(&pre, &mut post, &mut IdAllocator::from_storage(&storage)).unwrap();
        storage.apply(&second).unwrap();

        let key = key_hash(&Value::nat(1), &Type::nat()).unwrap();
        assert!(storage.big_map(0).unwrap().get(&key).is_none());
        assert_eq!(storage.next_free_id(), 1);
    }

    #[test]
    fn merge_traces_copies_back_to_their_source() {
        let mut storage = MemoryStorage::new();
        let mut seed = nat_map(None, &[(1, Some(1))]);
        let diff = extract(&Value::Unit, &mut seed, &mut IdAllocator::from_storage(&storage)).unwrap();
        storage.apply(&diff).unwrap();

        let pre = seed.clone();
        let mut post = Value::pair(seed.clone(), nat_map(Some(0), &[(2, Some(2))]));
        let diff = extract(&pre, &mut post, &mut IdAllocator::from_storage(&storage)).unwrap();

        let mut interner = TypeInterner::new();
        let mut view = post.clone();
        merge(&mut view, &diff, &mut interner).unwrap();
        let Value::Pair(kept, copied) = &view else {
            panic!("expected a pair");
        };
        assert_eq!(id_of(kept), Some(0));
        let Value::BigMap(copied) = copied.as_ref() else {
            panic!("expected a big map");
        };
        assert_eq!(copied.id, Some(0));
        assert_eq!(copied.overlay.get(&Value::nat(2)), Some(&Some(Value::nat(2))));
    }

    #[test]
    fn whole_removal_detaches_the_map() {
        let diff = vec![DiffEntry {
            kind: LazyKind::BigMap,
            id: 5,
            action: DiffAction::Remove { key: None },
        }];
        let mut value = nat_map(Some(5), &[]);
        merge(&mut value, &diff, &mut TypeInterner::new()).unwrap();
        assert_eq!(id_of(&value), None);
    }

    #[test]
    fn unknown_source_is_a_resolution_error() {
        let diff = vec![DiffEntry {
            kind: LazyKind::BigMap,
            id: 1,
            action: DiffAction::Copy {
                source: Some(9),
                layout: Layout::BigMap {
                    key_type: Type::nat().to_node(),
                    value_type: Type::nat().to_node(),
                },
            },
        }];
        let mut storage = MemoryStorage::new();
        assert!(matches!(
            storage.apply(&diff),
            Err(VMError::StorageResolution { kind: "big_map", id: 9 })
        ));
    }
}
