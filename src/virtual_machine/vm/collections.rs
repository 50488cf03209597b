//! Pairs, options, unions, lists, sets, maps, big maps and byte strings.

use super::Interpreter;
use super::gas::GasCategory;
use super::stack::expected;
use crate::core::data::parse_data;
use crate::core::ty::Type;
use crate::core::unparse::{key_hash, pack, unpack};
use crate::core::value::{BigMap, Value};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instr::ConcatForm;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Component `n` of a right comb: odd indices are left members, even ones the tails.
fn get_n(value: Value, n: usize) -> Option<Value> {
    match (n, value) {
        (0, value) => Some(value),
        (1, Value::Pair(a, _)) => Some(*a),
        (n, Value::Pair(_, b)) => get_n(*b, n - 2),
        _ => None,
    }
}

fn update_n(target: Value, n: usize, replacement: Value) -> Option<Value> {
    match (n, target) {
        (0, _) => Some(replacement),
        (1, Value::Pair(_, b)) => Some(Value::Pair(Box::new(replacement), b)),
        (n, Value::Pair(a, b)) => Some(Value::Pair(a, Box::new(update_n(*b, n - 2, replacement)?))),
        _ => None,
    }
}

impl Interpreter<'_> {
    /// Looks `key` up in the overlay, then in stored contents.
    pub(crate) fn big_map_get(&mut self, map: &BigMap, key: &Value) -> Result<Option<Value>, VMError> {
        if let Some(entry) = map.overlay.get(key) {
            return Ok(entry.clone());
        }
        let Some(id) = map.id else {
            return Ok(None);
        };
        let storage = self.ctx.storage;
        let snapshot = storage.snapshot(id)?;
        let hash = key_hash(key, &map.key_type)?;
        match snapshot.get(&hash) {
            None => Ok(None),
            Some(node) => {
                let cost = self.cost.storage_read(node.size());
                self.charge(GasCategory::StorageRead, cost)?;
                parse_data(node, &map.value_type, &mut self.interner).map(Some)
            }
        }
    }

    // ==================== Pairs ====================

    pub(super) fn op_pair(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        let mut items = self.stack.split_off(instr, n)?;
        items.reverse();
        self.stack.push(Value::comb(items));
        Ok(())
    }

    pub(super) fn op_unpair(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        let mut parts = Vec::with_capacity(n);
        let mut rest = self.stack.pop(instr)?;
        for _ in 1..n {
            match rest {
                Value::Pair(a, b) => {
                    parts.push(*a);
                    rest = *b;
                }
                other => return Err(expected(instr, "pair", &other)),
            }
        }
        parts.push(rest);
        parts.reverse();
        self.stack.extend(parts);
        Ok(())
    }

    pub(super) fn op_car(&mut self, instr: &'static str) -> Result<(), VMError> {
        let (a, _) = self.stack.pop_pair(instr)?;
        self.stack.push(a);
        Ok(())
    }

    pub(super) fn op_cdr(&mut self, instr: &'static str) -> Result<(), VMError> {
        let (_, b) = self.stack.pop_pair(instr)?;
        self.stack.push(b);
        Ok(())
    }

    pub(super) fn op_get_n(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        let kind = value.kind_name();
        let component = get_n(value, n)
            .ok_or_else(|| VMError::TypeMismatch(format!("{} {} is out of range for {}", instr, n, kind)))?;
        self.stack.push(component);
        Ok(())
    }

    pub(super) fn op_update_n(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        let replacement = self.stack.pop(instr)?;
        let target = self.stack.pop(instr)?;
        let kind = target.kind_name();
        let updated = update_n(target, n, replacement)
            .ok_or_else(|| VMError::TypeMismatch(format!("{} {} is out of range for {}", instr, n, kind)))?;
        self.stack.push(updated);
        Ok(())
    }

    // ==================== Options and unions ====================

    pub(super) fn op_some(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        self.stack.push(Value::some(value));
        Ok(())
    }

    pub(super) fn op_none(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::none());
        Ok(())
    }

    pub(super) fn op_left(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        self.stack.push(Value::left(value));
        Ok(())
    }

    pub(super) fn op_right(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        self.stack.push(Value::right(value));
        Ok(())
    }

    // ==================== Containers ====================

    pub(super) fn op_nil(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::List(Vec::new()));
        Ok(())
    }

    pub(super) fn op_cons(&mut self, instr: &'static str) -> Result<(), VMError> {
        let head = self.stack.pop(instr)?;
        let mut items = self.stack.pop_list(instr)?;
        items.insert(0, head);
        self.stack.push(Value::List(items));
        Ok(())
    }

    pub(super) fn op_size(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        let len = value
            .len()
            .ok_or_else(|| expected(instr, "string, bytes, list, set or map", &value))?;
        self.stack.push(Value::Nat(BigInt::from(len)));
        Ok(())
    }

    pub(super) fn op_empty_set(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Set(BTreeSet::new()));
        Ok(())
    }

    pub(super) fn op_empty_map(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Map(BTreeMap::new()));
        Ok(())
    }

    pub(super) fn op_empty_big_map(
        &mut self,
        _instr: &'static str,
        key_type: &Arc<Type>,
        value_type: &Arc<Type>,
    ) -> Result<(), VMError> {
        self.stack
            .push(Value::BigMap(BigMap::empty(key_type.clone(), value_type.clone())));
        Ok(())
    }

    pub(super) fn op_mem(&mut self, instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop(instr)?;
        let found = match self.stack.pop(instr)? {
            Value::Set(items) => items.contains(&key),
            Value::Map(entries) => entries.contains_key(&key),
            Value::BigMap(map) => self.big_map_get(&map, &key)?.is_some(),
            other => return Err(expected(instr, "set, map or big_map", &other)),
        };
        self.stack.push(Value::Bool(found));
        Ok(())
    }

    pub(super) fn op_get(&mut self, instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop(instr)?;
        let found = match self.stack.pop(instr)? {
            Value::Map(mut entries) => entries.remove(&key),
            Value::BigMap(map) => self.big_map_get(&map, &key)?,
            other => return Err(expected(instr, "map or big_map", &other)),
        };
        self.stack.push(Value::Option(found.map(Box::new)));
        Ok(())
    }

    pub(super) fn op_update(&mut self, instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop(instr)?;
        let value = self.stack.pop(instr)?;
        let updated = match (self.stack.pop(instr)?, value) {
            (Value::Set(mut items), Value::Bool(present)) => {
                if present {
                    items.insert(key);
                } else {
                    items.remove(&key);
                }
                Value::Set(items)
            }
            (Value::Map(mut entries), Value::Option(value)) => {
                match value {
                    Some(value) => entries.insert(key, *value),
                    None => entries.remove(&key),
                };
                Value::Map(entries)
            }
            (Value::BigMap(mut map), Value::Option(value)) => {
                map.overlay.insert(key, value.map(|v| *v));
                Value::BigMap(map)
            }
            (other, _) => return Err(expected(instr, "set, map or big_map", &other)),
        };
        self.stack.push(updated);
        Ok(())
    }

    pub(super) fn op_get_and_update(&mut self, instr: &'static str) -> Result<(), VMError> {
        let key = self.stack.pop(instr)?;
        let value = self.stack.pop_option(instr)?;
        let (updated, previous) = match self.stack.pop(instr)? {
            Value::Map(mut entries) => {
                let previous = match value {
                    Some(value) => entries.insert(key, value),
                    None => entries.remove(&key),
                };
                (Value::Map(entries), previous)
            }
            Value::BigMap(mut map) => {
                let previous = self.big_map_get(&map, &key)?;
                map.overlay.insert(key, value);
                (Value::BigMap(map), previous)
            }
            other => return Err(expected(instr, "map or big_map", &other)),
        };
        self.stack.push(updated);
        self.stack.push(Value::Option(previous.map(Box::new)));
        Ok(())
    }

    // ==================== Strings and bytes ====================

    pub(super) fn op_concat(&mut self, instr: &'static str, form: ConcatForm) -> Result<(), VMError> {
        let joined = match form {
            ConcatForm::Pair => match (self.stack.pop(instr)?, self.stack.pop(instr)?) {
                (Value::String(a), Value::String(b)) => Value::String(a + &b),
                (Value::Bytes(mut a), Value::Bytes(b)) => {
                    a.extend(b);
                    Value::Bytes(a)
                }
                (other, _) => return Err(expected(instr, "two strings or two bytes", &other)),
            },
            ConcatForm::List { bytes: true } => {
                let mut out = Vec::new();
                for item in self.stack.pop_list(instr)? {
                    match item {
                        Value::Bytes(b) => out.extend(b),
                        other => return Err(expected(instr, "bytes", &other)),
                    }
                }
                Value::Bytes(out)
            }
            ConcatForm::List { bytes: false } => {
                let mut out = String::new();
                for item in self.stack.pop_list(instr)? {
                    match item {
                        Value::String(s) => out.push_str(&s),
                        other => return Err(expected(instr, "string", &other)),
                    }
                }
                Value::String(out)
            }
        };
        self.stack.push(joined);
        Ok(())
    }

    /// `SLICE offset length target`: `None` when the range leaves the target.
    pub(super) fn op_slice(&mut self, instr: &'static str) -> Result<(), VMError> {
        let offset = self.stack.pop_nat(instr)?;
        let length = self.stack.pop_nat(instr)?;
        let target = self.stack.pop(instr)?;
        let range = match (offset.to_usize(), length.to_usize()) {
            (Some(offset), Some(length)) => offset.checked_add(length).map(|end| offset..end),
            _ => None,
        };
        let sliced = match target {
            Value::String(s) => range
                .filter(|r| r.end <= s.len())
                .map(|r| Value::String(s[r].to_string())),
            Value::Bytes(b) => range
                .filter(|r| r.end <= b.len())
                .map(|r| Value::Bytes(b[r].to_vec())),
            other => return Err(expected(instr, "string or bytes", &other)),
        };
        self.stack.push(Value::Option(sliced.map(Box::new)));
        Ok(())
    }

    pub(super) fn op_pack(&mut self, instr: &'static str, ty: &Arc<Type>) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        let bytes = pack(&value, ty)?;
        self.charge(GasCategory::Serialization, bytes.len() as u64 / 2)?;
        self.stack.push(Value::Bytes(bytes));
        Ok(())
    }

    pub(super) fn op_unpack(&mut self, instr: &'static str, ty: &Arc<Type>) -> Result<(), VMError> {
        let bytes = self.stack.pop_bytes(instr)?;
        let value = unpack(&bytes, ty, &mut self.interner);
        self.stack.push(Value::Option(value.map(Box::new)));
        Ok(())
    }
}
