//! Read access to lazily loaded storage.
//!
//! Defines the [`LazyStorage`] trait the interpreter reads big maps and
//! sapling states through, along with the [`BigMapSnapshot`] it returns.

use crate::core::value::LazyKind;
use crate::micheline::Node;
use crate::virtual_machine::errors::VMError;
use std::collections::BTreeMap;

/// Contents of a stored big map.
///
/// Entries are keyed by the expression hash of the packed key and keep the
/// key and value in optimized Micheline form.
#[derive(Clone, Debug, PartialEq)]
pub struct BigMapSnapshot {
    pub key_type: Node,
    pub value_type: Node,
    pub entries: BTreeMap<String, (Node, Node)>,
}

impl BigMapSnapshot {
    pub fn new(key_type: Node, value_type: Node) -> Self {
        Self {
            key_type,
            value_type,
            entries: BTreeMap::new(),
        }
    }

    /// Value stored under `key_hash`, if any.
    pub fn get(&self, key_hash: &str) -> Option<&Node> {
        self.entries.get(key_hash).map(|(_, value)| value)
    }
}

/// Storage accessor for big maps and sapling states.
///
/// Reads observe a fixed snapshot for the duration of a run. Identifiers of
/// both kinds are drawn from a single counter.
pub trait LazyStorage {
    /// Big map stored under `id`.
    fn big_map(&self, id: i64) -> Option<&BigMapSnapshot>;

    /// Memo size of the sapling state stored under `id`.
    fn sapling_state(&self, id: i64) -> Option<u16>;

    /// Smallest identifier not yet allocated.
    fn next_free_id(&self) -> i64;

    /// Like [`LazyStorage::big_map`], failing with `StorageResolution` on unknown ids.
    fn snapshot(&self, id: i64) -> Result<&BigMapSnapshot, VMError> {
        self.big_map(id).ok_or(VMError::StorageResolution {
            kind: LazyKind::BigMap.as_str(),
            id,
        })
    }

    /// Memo size of a known sapling state, failing with `StorageResolution` otherwise.
    fn memo_size(&self, id: i64) -> Result<u16, VMError> {
        self.sapling_state(id).ok_or(VMError::StorageResolution {
            kind: LazyKind::SaplingState.as_str(),
            id,
        })
    }
}
