//! Runtime values.
//!
//! Values carry no type of their own: the checker guarantees that every
//! value on the stack matches the statically inferred type at that point.
//! Where a value holds data whose type cannot be recovered from its shape
//! (empty collections, big maps, lambdas, tickets, contracts), the type is
//! stored alongside.

use crate::core::ty::{Type, TypeKind};
use crate::micheline::Node;
use crate::types::address::{Address, Destination, L2Address};
use crate::types::keys::{ChainId, KeyHash, PublicKey, Signature};
use crate::utils::time::format_rfc3339;
use crate::virtual_machine::instr::Block;
use bls12_381::{G1Affine, G2Affine, Scalar};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Kind of lazily loaded storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LazyKind {
    BigMap,
    SaplingState,
}

impl LazyKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LazyKind::BigMap => "big_map",
            LazyKind::SaplingState => "sapling_state",
        }
    }
}

/// A big map: an optional storage identifier plus the writes made during the current run.
///
/// `overlay` maps a key to `Some(value)` for an insertion and `None` for a removal.
/// Keys absent from the overlay are read through to storage when `id` is set.
#[derive(Clone, Debug)]
pub struct BigMap {
    pub id: Option<i64>,
    pub key_type: Arc<Type>,
    pub value_type: Arc<Type>,
    pub overlay: BTreeMap<Value, Option<Value>>,
}

impl BigMap {
    pub fn empty(key_type: Arc<Type>, value_type: Arc<Type>) -> Self {
        Self {
            id: None,
            key_type,
            value_type,
            overlay: BTreeMap::new(),
        }
    }

    pub fn with_id(id: i64, key_type: Arc<Type>, value_type: Arc<Type>) -> Self {
        Self {
            id: Some(id),
            ..Self::empty(key_type, value_type)
        }
    }
}

/// A closure. `code` is the source the lambda was written with, `body` its typed form.
#[derive(Clone, Debug)]
pub struct Lambda {
    pub arg: Arc<Type>,
    pub ret: Arc<Type>,
    pub code: Node,
    pub body: Block,
    /// Pushes itself under its argument when executed.
    pub recursive: bool,
}

impl PartialEq for Lambda {
    fn eq(&self, other: &Self) -> bool {
        self.recursive == other.recursive
            && self.arg == other.arg
            && self.ret == other.ret
            && self.code == other.code
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub ticketer: Address,
    pub content_type: Arc<Type>,
    pub content: Box<Value>,
    pub amount: BigInt,
}

/// Operations emitted by a run, with their payloads already in optimized form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Transfer {
        destination: Destination,
        parameter: Node,
        amount: i64,
        nonce: u32,
    },
    SetDelegate {
        delegate: Option<KeyHash>,
        nonce: u32,
    },
    CreateContract {
        address: Address,
        delegate: Option<KeyHash>,
        balance: i64,
        script: Node,
        storage: Node,
        nonce: u32,
    },
    Emit {
        tag: Option<String>,
        ty: Node,
        payload: Node,
        nonce: u32,
    },
}

impl Operation {
    pub fn nonce(&self) -> u32 {
        match self {
            Operation::Transfer { nonce, .. }
            | Operation::SetDelegate { nonce, .. }
            | Operation::CreateContract { nonce, .. }
            | Operation::Emit { nonce, .. } => *nonce,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Transfer {
                destination,
                parameter,
                amount,
                ..
            } => write!(f, "transfer {} mumav to {} with {}", amount, destination, parameter),
            Operation::SetDelegate { delegate, .. } => match delegate {
                Some(kh) => write!(f, "set delegate {}", kh),
                None => f.write_str("withdraw delegate"),
            },
            Operation::CreateContract {
                address, balance, ..
            } => write!(f, "originate {} with {} mumav", address, balance),
            Operation::Emit { tag, payload, .. } => {
                write!(f, "emit %{} {}", tag.as_deref().unwrap_or(""), payload)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(BigInt),
    /// Non-negative.
    Nat(BigInt),
    String(String),
    Bytes(Vec<u8>),
    /// Non-negative, bounded by `i64::MAX`.
    Mumav(i64),
    /// Seconds since the epoch.
    Timestamp(BigInt),
    Address(Destination),
    Key(PublicKey),
    KeyHash(KeyHash),
    Signature(Signature),
    ChainId(ChainId),
    TxRollupL2Address(L2Address),
    Pair(Box<Value>, Box<Value>),
    Option(Option<Box<Value>>),
    Left(Box<Value>),
    Right(Box<Value>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    BigMap(BigMap),
    Lambda(Arc<Lambda>),
    Contract {
        destination: Destination,
        param_type: Arc<Type>,
    },
    Operation(Box<Operation>),
    Ticket(Box<Ticket>),
    Bls12381G1(G1Affine),
    Bls12381G2(G2Affine),
    Bls12381Fr(Scalar),
    SaplingState {
        id: Option<i64>,
        memo_size: u16,
    },
    SaplingTransaction(Vec<u8>),
    Chest(Vec<u8>),
    ChestKey(Vec<u8>),
}

impl Value {
    pub fn nat(n: u64) -> Value {
        Value::Nat(BigInt::from(n))
    }

    pub fn int(n: i64) -> Value {
        Value::Int(BigInt::from(n))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn pair(left: Value, right: Value) -> Value {
        Value::Pair(Box::new(left), Box::new(right))
    }

    pub fn some(value: Value) -> Value {
        Value::Option(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Option(None)
    }

    pub fn left(value: Value) -> Value {
        Value::Left(Box::new(value))
    }

    pub fn right(value: Value) -> Value {
        Value::Right(Box::new(value))
    }

    /// Builds the right comb `Pair a (Pair b c)` from at least one component.
    pub fn comb(mut items: Vec<Value>) -> Value {
        let mut acc = items.pop().unwrap_or(Value::Unit);
        while let Some(item) = items.pop() {
            acc = Value::pair(item, acc);
        }
        acc
    }

    /// Short name of the variant, used in error messages and type checks on pop.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Nat(_) => "nat",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Mumav(_) => "mumav",
            Value::Timestamp(_) => "timestamp",
            Value::Address(_) => "address",
            Value::Key(_) => "key",
            Value::KeyHash(_) => "key_hash",
            Value::Signature(_) => "signature",
            Value::ChainId(_) => "chain_id",
            Value::TxRollupL2Address(_) => "tx_rollup_l2_address",
            Value::Pair(..) => "pair",
            Value::Option(_) => "option",
            Value::Left(_) | Value::Right(_) => "or",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::BigMap(_) => "big_map",
            Value::Lambda(_) => "lambda",
            Value::Contract { .. } => "contract",
            Value::Operation(_) => "operation",
            Value::Ticket(_) => "ticket",
            Value::Bls12381G1(_) => "bls12_381_g1",
            Value::Bls12381G2(_) => "bls12_381_g2",
            Value::Bls12381Fr(_) => "bls12_381_fr",
            Value::SaplingState { .. } => "sapling_state",
            Value::SaplingTransaction(_) => "sapling_transaction",
            Value::Chest(_) => "chest",
            Value::ChestKey(_) => "chest_key",
        }
    }

    /// Checks that the value has the shape of `ty`, recursing into containers.
    pub fn matches(&self, ty: &Type) -> bool {
        match (&ty.kind, self) {
            (TypeKind::Unit, Value::Unit)
            | (TypeKind::Bool, Value::Bool(_))
            | (TypeKind::Int, Value::Int(_))
            | (TypeKind::String, Value::String(_))
            | (TypeKind::Bytes, Value::Bytes(_))
            | (TypeKind::Timestamp, Value::Timestamp(_))
            | (TypeKind::Address, Value::Address(_))
            | (TypeKind::Key, Value::Key(_))
            | (TypeKind::KeyHash, Value::KeyHash(_))
            | (TypeKind::Signature, Value::Signature(_))
            | (TypeKind::ChainId, Value::ChainId(_))
            | (TypeKind::TxRollupL2Address, Value::TxRollupL2Address(_))
            | (TypeKind::Operation, Value::Operation(_))
            | (TypeKind::Bls12381G1, Value::Bls12381G1(_))
            | (TypeKind::Bls12381G2, Value::Bls12381G2(_))
            | (TypeKind::Bls12381Fr, Value::Bls12381Fr(_))
            | (TypeKind::SaplingTransaction(_), Value::SaplingTransaction(_))
            | (TypeKind::SaplingTransactionDeprecated(_), Value::SaplingTransaction(_))
            | (TypeKind::Chest, Value::Chest(_))
            | (TypeKind::ChestKey, Value::ChestKey(_)) => true,
            (TypeKind::Nat, Value::Nat(n)) => !n.is_negative(),
            (TypeKind::Mumav, Value::Mumav(m)) => *m >= 0,
            (TypeKind::SaplingState(memo), Value::SaplingState { memo_size, .. }) => memo == memo_size,
            (TypeKind::Pair(a, b), Value::Pair(x, y)) => x.matches(a) && y.matches(b),
            (TypeKind::Option(_), Value::Option(None)) => true,
            (TypeKind::Option(t), Value::Option(Some(v))) => v.matches(t),
            (TypeKind::Or(a, _), Value::Left(v)) => v.matches(a),
            (TypeKind::Or(_, b), Value::Right(v)) => v.matches(b),
            (TypeKind::List(t), Value::List(items)) => items.iter().all(|v| v.matches(t)),
            (TypeKind::Set(t), Value::Set(items)) => items.iter().all(|v| v.matches(t)),
            (TypeKind::Map(k, v), Value::Map(entries)) => entries
                .iter()
                .all(|(key, value)| key.matches(k) && value.matches(v)),
            (TypeKind::BigMap(k, v), Value::BigMap(map)) => map.key_type == *k && map.value_type == *v,
            (TypeKind::Lambda(a, r), Value::Lambda(lambda)) => lambda.arg == *a && lambda.ret == *r,
            (TypeKind::Contract(t), Value::Contract { param_type, .. }) => param_type == t,
            (TypeKind::Ticket(t), Value::Ticket(ticket)) => ticket.content_type == *t,
            _ => false,
        }
    }

    /// Rough in-memory size used by the cost model.
    pub fn size(&self) -> usize {
        match self {
            Value::Int(n) | Value::Nat(n) | Value::Timestamp(n) => (n.bits() as usize).div_ceil(8).max(1),
            Value::String(s) => s.len(),
            Value::Bytes(b)
            | Value::SaplingTransaction(b)
            | Value::Chest(b)
            | Value::ChestKey(b) => b.len(),
            Value::Pair(a, b) => 1 + a.size() + b.size(),
            Value::Option(Some(v)) | Value::Left(v) | Value::Right(v) => 1 + v.size(),
            Value::List(items) => items.iter().map(Value::size).sum::<usize>() + items.len(),
            Value::Set(items) => items.iter().map(Value::size).sum::<usize>() + items.len(),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| k.size() + v.size() + 1)
                .sum(),
            Value::BigMap(map) => map
                .overlay
                .iter()
                .map(|(k, v)| k.size() + v.as_ref().map_or(0, Value::size) + 1)
                .sum(),
            Value::Lambda(lambda) => lambda.code.size(),
            Value::Ticket(ticket) => 22 + ticket.content.size(),
            Value::Bls12381G2(_) => 192,
            Value::Bls12381G1(_) => 96,
            _ => 8,
        }
    }

    /// Collection length for `SIZE`, if the value has one.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(items) => Some(items.len()),
            Value::Set(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    pub fn is_zero_amount(&self) -> bool {
        match self {
            Value::Nat(n) | Value::Int(n) => n.is_zero(),
            Value::Mumav(m) => *m == 0,
            _ => false,
        }
    }

    /// Visits every big map and sapling state reachable from this value.
    pub fn for_each_lazy(&self, f: &mut impl FnMut(&Value)) {
        match self {
            Value::BigMap(_) | Value::SaplingState { .. } => f(self),
            Value::Pair(a, b) => {
                a.for_each_lazy(f);
                b.for_each_lazy(f);
            }
            Value::Option(Some(v)) | Value::Left(v) | Value::Right(v) => v.for_each_lazy(f),
            Value::List(items) => items.iter().for_each(|v| v.for_each_lazy(f)),
            Value::Map(entries) => entries.values().for_each(|v| v.for_each_lazy(f)),
            _ => {}
        }
    }

    /// Mutable counterpart of [`Value::for_each_lazy`].
    pub fn for_each_lazy_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut Value) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Value::BigMap(_) | Value::SaplingState { .. } => f(self),
            Value::Pair(a, b) => {
                a.for_each_lazy_mut(f)?;
                b.for_each_lazy_mut(f)
            }
            Value::Option(Some(v)) | Value::Left(v) | Value::Right(v) => v.for_each_lazy_mut(f),
            Value::List(items) => items.iter_mut().try_for_each(|v| v.for_each_lazy_mut(f)),
            Value::Map(entries) => entries.values_mut().try_for_each(|v| v.for_each_lazy_mut(f)),
            _ => Ok(()),
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    bytes.iter().try_for_each(|b| write!(f, "{:02x}", b))
}

fn write_seq<'a, I: Iterator<Item = &'a Value>>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result {
    f.write_str("{")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(" ;")?;
        }
        write!(f, " {}", item)?;
    }
    f.write_str(" }")
}

/// Readable rendering without type information, used in traces.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("Unit"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(n) | Value::Nat(n) => write!(f, "{}", n),
            Value::Mumav(m) => write!(f, "{}", m),
            Value::Timestamp(t) => match i64::try_from(t).ok().and_then(format_rfc3339) {
                Some(text) => write!(f, "{:?}", text),
                None => write!(f, "{}", t),
            },
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) | Value::SaplingTransaction(b) | Value::Chest(b) | Value::ChestKey(b) => {
                write_hex(f, b)
            }
            Value::Address(d) => write!(f, "\"{}\"", d),
            Value::Key(k) => write!(f, "\"{}\"", k),
            Value::KeyHash(k) => write!(f, "\"{}\"", k),
            Value::Signature(s) => write!(f, "\"{}\"", s),
            Value::ChainId(c) => write!(f, "\"{}\"", c),
            Value::TxRollupL2Address(a) => write!(f, "\"{}\"", a),
            Value::Pair(a, b) => write!(f, "(Pair {} {})", a, b),
            Value::Option(None) => f.write_str("None"),
            Value::Option(Some(v)) => write!(f, "(Some {})", v),
            Value::Left(v) => write!(f, "(Left {})", v),
            Value::Right(v) => write!(f, "(Right {})", v),
            Value::List(items) => write_seq(f, items.iter()),
            Value::Set(items) => write_seq(f, items.iter()),
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ;")?;
                    }
                    write!(f, " Elt {} {}", k, v)?;
                }
                f.write_str(" }")
            }
            Value::BigMap(map) => match map.id {
                Some(id) if map.overlay.is_empty() => write!(f, "{}", id),
                id => {
                    if let Some(id) = id {
                        write!(f, "{} ", id)?;
                    }
                    f.write_str("{")?;
                    for (i, (k, v)) in map.overlay.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ;")?;
                        }
                        match v {
                            Some(v) => write!(f, " Elt {} {}", k, v)?,
                            None => write!(f, " Elt {} <removed>", k)?,
                        }
                    }
                    f.write_str(" }")
                }
            },
            Value::Lambda(lambda) => write!(f, "{}", lambda.code),
            Value::Contract { destination, .. } => write!(f, "\"{}\"", destination),
            Value::Operation(op) => write!(f, "<{}>", op),
            Value::Ticket(t) => write!(f, "(Pair \"{}\" {} {})", t.ticketer, t.content, t.amount),
            Value::Bls12381G1(p) => write_hex(f, &p.to_uncompressed()),
            Value::Bls12381G2(p) => write_hex(f, &p.to_uncompressed()),
            Value::Bls12381Fr(s) => write_hex(f, &s.to_bytes()),
            Value::SaplingState { id: Some(id), .. } => write!(f, "{}", id),
            Value::SaplingState { id: None, .. } => f.write_str("{}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comb_builds_right_nested_pairs() {
        let v = Value::comb(vec![Value::nat(1), Value::nat(2), Value::nat(3)]);
        assert_eq!(
            v,
            Value::pair(Value::nat(1), Value::pair(Value::nat(2), Value::nat(3)))
        );
        assert_eq!(v.to_string(), "(Pair 1 (Pair 2 3))");
    }

    #[test]
    fn matches_checks_nested_shapes() {
        let ty = Type::pair(Type::nat(), Type::option(Type::string()));
        assert!(Value::pair(Value::nat(1), Value::none()).matches(&ty));
        assert!(Value::pair(Value::nat(1), Value::some(Value::string("a"))).matches(&ty));
        assert!(!Value::pair(Value::int(1), Value::none()).matches(&ty));
        assert!(!Value::Nat(BigInt::from(-1)).matches(&Type::nat()));
    }

    #[test]
    fn lazy_values_are_visited() {
        let map = Value::BigMap(BigMap::with_id(4, Type::nat(), Type::nat()));
        let v = Value::pair(Value::some(map), Value::List(vec![Value::SaplingState { id: None, memo_size: 8 }]));
        let mut seen = Vec::new();
        v.for_each_lazy(&mut |lazy| seen.push(lazy.kind_name()));
        assert_eq!(seen, vec!["big_map", "sapling_state"]);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Value::Timestamp(BigInt::from(0)).to_string(), "\"1970-01-01T00:00:00Z\"");
        assert_eq!(Value::Bytes(vec![0xab]).to_string(), "0xab");
        assert_eq!(Value::List(vec![]).to_string(), "{ }");
    }
}
