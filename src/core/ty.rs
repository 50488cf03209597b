//! Michelson types.
//!
//! A [`Type`] is an immutable tree whose nodes carry optional `:type` and
//! `%field` annotations. Children are shared through `Arc` so typed programs
//! can be sent across threads and cloned cheaply.
//!
//! Equality and hashing ignore annotations: two types are equal when they
//! are structurally equal.

use crate::micheline::Node;
use crate::utils;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Prim, PrimKind};
use num_traits::ToPrimitive;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Unit,
    Never,
    Bool,
    Int,
    Nat,
    String,
    ChainId,
    Bytes,
    Mumav,
    KeyHash,
    Key,
    Signature,
    Timestamp,
    Address,
    TxRollupL2Address,
    Operation,
    Bls12381G1,
    Bls12381G2,
    Bls12381Fr,
    Chest,
    ChestKey,
    /// Memo size in bytes.
    SaplingState(u16),
    SaplingTransaction(u16),
    SaplingTransactionDeprecated(u16),
    Option(Arc<Type>),
    List(Arc<Type>),
    Set(Arc<Type>),
    Ticket(Arc<Type>),
    Contract(Arc<Type>),
    Pair(Arc<Type>, Arc<Type>),
    Or(Arc<Type>, Arc<Type>),
    Lambda(Arc<Type>, Arc<Type>),
    Map(Arc<Type>, Arc<Type>),
    BigMap(Arc<Type>, Arc<Type>),
}

#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    /// `%field` annotation, without the sigil.
    pub field: Option<String>,
    /// `:type` annotation, without the sigil.
    pub name: Option<String>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

macro_rules! leaf_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $fn_name() -> Arc<Type> {
                Type::arc(TypeKind::$kind)
            }
        )*
    };
}

impl Type {
    pub fn new(kind: TypeKind) -> Type {
        Type {
            kind,
            field: None,
            name: None,
        }
    }

    pub fn arc(kind: TypeKind) -> Arc<Type> {
        Arc::new(Type::new(kind))
    }

    leaf_constructors! {
        unit => Unit,
        never => Never,
        bool => Bool,
        int => Int,
        nat => Nat,
        string => String,
        chain_id => ChainId,
        bytes => Bytes,
        mumav => Mumav,
        key_hash => KeyHash,
        key => Key,
        signature => Signature,
        timestamp => Timestamp,
        address => Address,
        operation => Operation,
        bls12_381_g1 => Bls12381G1,
        bls12_381_g2 => Bls12381G2,
        bls12_381_fr => Bls12381Fr,
    }

    pub fn option(inner: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Option(inner))
    }

    pub fn list(inner: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::List(inner))
    }

    pub fn set(inner: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Set(inner))
    }

    pub fn ticket(inner: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Ticket(inner))
    }

    pub fn contract(inner: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Contract(inner))
    }

    pub fn pair(left: Arc<Type>, right: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Pair(left, right))
    }

    pub fn or(left: Arc<Type>, right: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Or(left, right))
    }

    pub fn lambda(arg: Arc<Type>, ret: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Lambda(arg, ret))
    }

    pub fn map(key: Arc<Type>, value: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::Map(key, value))
    }

    pub fn big_map(key: Arc<Type>, value: Arc<Type>) -> Arc<Type> {
        Type::arc(TypeKind::BigMap(key, value))
    }

    /// Returns a copy with the given field annotation.
    pub fn with_field(&self, field: Option<String>) -> Type {
        Type {
            field,
            ..self.clone()
        }
    }

    /// Primitive that spells this type.
    pub fn prim(&self) -> Prim {
        match &self.kind {
            TypeKind::Unit => Prim::unit,
            TypeKind::Never => Prim::never,
            TypeKind::Bool => Prim::bool,
            TypeKind::Int => Prim::int,
            TypeKind::Nat => Prim::nat,
            TypeKind::String => Prim::string,
            TypeKind::ChainId => Prim::chain_id,
            TypeKind::Bytes => Prim::bytes,
            TypeKind::Mumav => Prim::mumav,
            TypeKind::KeyHash => Prim::key_hash,
            TypeKind::Key => Prim::key,
            TypeKind::Signature => Prim::signature,
            TypeKind::Timestamp => Prim::timestamp,
            TypeKind::Address => Prim::address,
            TypeKind::TxRollupL2Address => Prim::tx_rollup_l2_address,
            TypeKind::Operation => Prim::operation,
            TypeKind::Bls12381G1 => Prim::bls12_381_g1,
            TypeKind::Bls12381G2 => Prim::bls12_381_g2,
            TypeKind::Bls12381Fr => Prim::bls12_381_fr,
            TypeKind::Chest => Prim::chest,
            TypeKind::ChestKey => Prim::chest_key,
            TypeKind::SaplingState(_) => Prim::sapling_state,
            TypeKind::SaplingTransaction(_) => Prim::sapling_transaction,
            TypeKind::SaplingTransactionDeprecated(_) => Prim::sapling_transaction_deprecated,
            TypeKind::Option(_) => Prim::option,
            TypeKind::List(_) => Prim::list,
            TypeKind::Set(_) => Prim::set,
            TypeKind::Ticket(_) => Prim::ticket,
            TypeKind::Contract(_) => Prim::contract,
            TypeKind::Pair(..) => Prim::pair,
            TypeKind::Or(..) => Prim::or,
            TypeKind::Lambda(..) => Prim::lambda,
            TypeKind::Map(..) => Prim::map,
            TypeKind::BigMap(..) => Prim::big_map,
        }
    }

    fn children(&self) -> Vec<&Arc<Type>> {
        match &self.kind {
            TypeKind::Option(t)
            | TypeKind::List(t)
            | TypeKind::Set(t)
            | TypeKind::Ticket(t)
            | TypeKind::Contract(t) => vec![t],
            TypeKind::Pair(a, b)
            | TypeKind::Or(a, b)
            | TypeKind::Lambda(a, b)
            | TypeKind::Map(a, b)
            | TypeKind::BigMap(a, b) => vec![a, b],
            _ => Vec::new(),
        }
    }

    /// Prints the type back to Micheline, annotations included.
    pub fn to_node(&self) -> Node {
        let args = match &self.kind {
            TypeKind::SaplingState(memo)
            | TypeKind::SaplingTransaction(memo)
            | TypeKind::SaplingTransactionDeprecated(memo) => vec![Node::int(*memo)],
            _ => self.children().into_iter().map(|t| t.to_node()).collect(),
        };
        let mut annots = Vec::new();
        if let Some(name) = &self.name {
            annots.push(format!(":{}", name));
        }
        if let Some(field) = &self.field {
            annots.push(format!("%{}", field));
        }
        Node::Prim {
            prim: self.prim(),
            args,
            annots,
        }
    }

    /// Values of the type can be ordered with `COMPARE` and used as set elements and map keys.
    pub fn is_comparable(&self) -> bool {
        match &self.kind {
            TypeKind::Unit
            | TypeKind::Never
            | TypeKind::Bool
            | TypeKind::Int
            | TypeKind::Nat
            | TypeKind::String
            | TypeKind::ChainId
            | TypeKind::Bytes
            | TypeKind::Mumav
            | TypeKind::KeyHash
            | TypeKind::Key
            | TypeKind::Signature
            | TypeKind::Timestamp
            | TypeKind::Address
            | TypeKind::TxRollupL2Address => true,
            TypeKind::Option(t) => t.is_comparable(),
            TypeKind::Pair(a, b) | TypeKind::Or(a, b) => a.is_comparable() && b.is_comparable(),
            _ => false,
        }
    }

    fn all(&self, leaf_ok: &impl Fn(&TypeKind) -> Option<bool>) -> bool {
        if let Some(verdict) = leaf_ok(&self.kind) {
            return verdict;
        }
        self.children().into_iter().all(|t| t.all(leaf_ok))
    }

    /// Can appear in a contract parameter.
    pub fn is_passable(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Operation => Some(false),
            TypeKind::Lambda(..) | TypeKind::Contract(_) => Some(true),
            _ => None,
        })
    }

    /// Can appear in contract storage.
    pub fn is_storable(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Operation | TypeKind::Contract(_) => Some(false),
            TypeKind::Lambda(..) => Some(true),
            _ => None,
        })
    }

    /// Can be written as a `PUSH` literal.
    pub fn is_pushable(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Operation
            | TypeKind::BigMap(..)
            | TypeKind::SaplingState(_)
            | TypeKind::Ticket(_)
            | TypeKind::Contract(_) => Some(false),
            TypeKind::Lambda(..) => Some(true),
            _ => None,
        })
    }

    /// Can be serialized with `PACK`.
    pub fn is_packable(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Operation
            | TypeKind::BigMap(..)
            | TypeKind::SaplingState(_)
            | TypeKind::Ticket(_) => Some(false),
            TypeKind::Lambda(..) => Some(true),
            _ => None,
        })
    }

    /// Can be copied with `DUP`.
    pub fn is_dupable(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Ticket(_) => Some(false),
            TypeKind::Lambda(..) | TypeKind::Contract(_) => Some(true),
            _ => None,
        })
    }

    /// Can be stored as a big map value.
    pub fn is_big_map_value(&self) -> bool {
        self.all(&|k| match k {
            TypeKind::Operation | TypeKind::BigMap(..) | TypeKind::SaplingState(_) => Some(false),
            TypeKind::Lambda(..) => Some(true),
            _ => None,
        })
    }

    /// Flattens a right comb of pairs into its components.
    pub fn comb_components(self: &Arc<Type>) -> Vec<Arc<Type>> {
        let mut out = Vec::new();
        let mut cur = self.clone();
        while let TypeKind::Pair(a, b) = &cur.kind {
            out.push(a.clone());
            let next = b.clone();
            cur = next;
        }
        out.push(cur);
        out
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_node())
    }
}

/// Checks that two types are equal up to annotations.
pub fn structurally_equal(a: &Type, b: &Type) -> Result<(), VMError> {
    if a == b {
        Ok(())
    } else {
        Err(VMError::TypeMismatch(format!("{} is not {}", a, b)))
    }
}

fn expect_args<'a>(prim: Prim, args: &'a [Node], n: usize) -> Result<&'a [Node], VMError> {
    if args.len() != n {
        return Err(VMError::TypeMismatch(format!(
            "{} expects {} argument(s), got {}",
            prim,
            n,
            args.len()
        )));
    }
    Ok(args)
}

fn memo_size(prim: Prim, args: &[Node]) -> Result<u16, VMError> {
    match expect_args(prim, args, 1)? {
        [Node::Int(n)] => n
            .to_u16()
            .ok_or_else(|| VMError::TypeMismatch(format!("invalid memo size {}", n))),
        _ => Err(VMError::TypeMismatch(format!("{} expects a memo size", prim))),
    }
}

/// Resolves a type expression, dispatching on its root primitive.
///
/// `pair a b c` is normalised to the right comb `pair a (pair b c)`.
pub fn resolve(node: &Node) -> Result<Type, VMError> {
    utils::stack::grow(|| resolve_node(node))
}

fn resolve_node(node: &Node) -> Result<Type, VMError> {
    let Node::Prim { prim, args, annots } = node else {
        return Err(VMError::TypeMismatch(format!("expected a type, got {}", node)));
    };
    if prim.kind() != PrimKind::Type {
        return Err(VMError::UnknownPrimitive(format!("{} is not a type", prim)));
    }

    let sub = |i: usize| resolve(&args[i]).map(Arc::new);
    let leaf = |kind: TypeKind| -> Result<TypeKind, VMError> {
        expect_args(*prim, args, 0)?;
        Ok(kind)
    };

    let kind = match prim {
        Prim::unit => leaf(TypeKind::Unit)?,
        Prim::never => leaf(TypeKind::Never)?,
        Prim::bool => leaf(TypeKind::Bool)?,
        Prim::int => leaf(TypeKind::Int)?,
        Prim::nat => leaf(TypeKind::Nat)?,
        Prim::string => leaf(TypeKind::String)?,
        Prim::chain_id => leaf(TypeKind::ChainId)?,
        Prim::bytes => leaf(TypeKind::Bytes)?,
        Prim::mumav => leaf(TypeKind::Mumav)?,
        Prim::key_hash => leaf(TypeKind::KeyHash)?,
        Prim::key => leaf(TypeKind::Key)?,
        Prim::signature => leaf(TypeKind::Signature)?,
        Prim::timestamp => leaf(TypeKind::Timestamp)?,
        Prim::address => leaf(TypeKind::Address)?,
        Prim::tx_rollup_l2_address => leaf(TypeKind::TxRollupL2Address)?,
        Prim::operation => leaf(TypeKind::Operation)?,
        Prim::bls12_381_g1 => leaf(TypeKind::Bls12381G1)?,
        Prim::bls12_381_g2 => leaf(TypeKind::Bls12381G2)?,
        Prim::bls12_381_fr => leaf(TypeKind::Bls12381Fr)?,
        Prim::chest => leaf(TypeKind::Chest)?,
        Prim::chest_key => leaf(TypeKind::ChestKey)?,
        Prim::sapling_state => TypeKind::SaplingState(memo_size(*prim, args)?),
        Prim::sapling_transaction => TypeKind::SaplingTransaction(memo_size(*prim, args)?),
        Prim::sapling_transaction_deprecated => {
            TypeKind::SaplingTransactionDeprecated(memo_size(*prim, args)?)
        }
        Prim::option | Prim::list | Prim::set | Prim::ticket | Prim::contract => {
            expect_args(*prim, args, 1)?;
            let inner = sub(0)?;
            match prim {
                Prim::option => TypeKind::Option(inner),
                Prim::list => TypeKind::List(inner),
                Prim::set => {
                    if !inner.is_comparable() {
                        return Err(VMError::TypeMismatch(format!(
                            "set element {} is not comparable",
                            inner
                        )));
                    }
                    TypeKind::Set(inner)
                }
                Prim::ticket => {
                    if !inner.is_comparable() {
                        return Err(VMError::TypeMismatch(format!(
                            "ticket content {} is not comparable",
                            inner
                        )));
                    }
                    TypeKind::Ticket(inner)
                }
                _ => TypeKind::Contract(inner),
            }
        }
        Prim::pair => {
            if args.len() < 2 {
                return Err(VMError::TypeMismatch(format!(
                    "pair expects at least 2 arguments, got {}",
                    args.len()
                )));
            }
            let left = sub(0)?;
            let right = if args.len() == 2 {
                sub(1)?
            } else {
                Arc::new(resolve(&Node::prim_args(Prim::pair, args[1..].to_vec()))?)
            };
            TypeKind::Pair(left, right)
        }
        Prim::or | Prim::lambda | Prim::map | Prim::big_map => {
            expect_args(*prim, args, 2)?;
            let (a, b) = (sub(0)?, sub(1)?);
            match prim {
                Prim::or => TypeKind::Or(a, b),
                Prim::lambda => TypeKind::Lambda(a, b),
                Prim::map | Prim::big_map if !a.is_comparable() => {
                    return Err(VMError::TypeMismatch(format!("map key {} is not comparable", a)));
                }
                Prim::map => TypeKind::Map(a, b),
                _ => {
                    if !b.is_big_map_value() {
                        return Err(VMError::TypeMismatch(format!(
                            "{} cannot be a big map value",
                            b
                        )));
                    }
                    TypeKind::BigMap(a, b)
                }
            }
        }
        other => return Err(VMError::UnknownPrimitive(format!("{} is not a type", other))),
    };

    let mut ty = Type::new(kind);
    for annot in annots {
        if let Some(field) = annot.strip_prefix('%') {
            ty.field.get_or_insert_with(|| field.to_string());
        } else if let Some(name) = annot.strip_prefix(':') {
            ty.name.get_or_insert_with(|| name.to_string());
        }
    }
    Ok(ty)
}

/// Cache of resolved types keyed by their Micheline form.
///
/// Passed by mutable reference through type checking; there is no global cache.
#[derive(Default)]
pub struct TypeInterner {
    table: HashMap<Node, Arc<Type>>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `node`, returning the shared instance on repeated requests.
    pub fn resolve(&mut self, node: &Node) -> Result<Arc<Type>, VMError> {
        if let Some(ty) = self.table.get(node) {
            return Ok(ty.clone());
        }
        let ty = Arc::new(resolve(node)?);
        self.table.insert(node.clone(), ty.clone());
        Ok(ty)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
