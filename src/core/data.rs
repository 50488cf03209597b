//! Typed data parsing: Micheline literal plus expected type to [`Value`].
//!
//! Both the readable and the optimized forms are accepted: addresses, keys,
//! key hashes, signatures and chain ids as base58 strings or raw bytes,
//! timestamps as RFC 3339 strings or integers, pairs as `Pair a b c` or as a
//! sequence of components.

use crate::core::ty::{Type, TypeInterner, TypeKind};
use crate::core::value::{BigMap, Lambda, Ticket, Value};
use crate::crypto::bls;
use crate::micheline::{Node, Prim};
use crate::types::address::{Destination, L2Address};
use crate::types::encoding::Decode;
use crate::types::keys::{ChainId, KeyHash, PublicKey, Signature};
use crate::utils;
use crate::utils::time::parse_rfc3339;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::typecheck::check_lambda;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

fn mismatch(node: &Node, ty: &Type) -> VMError {
    VMError::TypeMismatch(format!("{} is not a valid {}", node, ty))
}

/// Printable ASCII plus newline, carriage return and tab.
pub fn is_valid_string(s: &str) -> bool {
    s.bytes()
        .all(|b| matches!(b, b' '..=b'~' | b'\n' | b'\r' | b'\t'))
}

fn bytes_or_string<T>(
    node: &Node,
    ty: &Type,
    from_text: impl FnOnce(&str) -> Result<T, VMError>,
    from_bytes: impl FnOnce(&[u8]) -> Result<T, VMError>,
) -> Result<T, VMError> {
    match node {
        Node::String(s) => from_text(s),
        Node::Bytes(b) => from_bytes(b),
        _ => Err(mismatch(node, ty)),
    }
}

fn decoded<T: Decode>(bytes: &[u8]) -> Result<T, VMError> {
    T::from_bytes(bytes).map_err(|e| VMError::invalid_data(e.to_string()))
}

/// Parses `node` as a value of type `ty`.
pub fn parse_data(node: &Node, ty: &Arc<Type>, interner: &mut TypeInterner) -> Result<Value, VMError> {
    utils::stack::grow(|| parse_node(node, ty, interner))
}

fn parse_node(node: &Node, ty: &Arc<Type>, interner: &mut TypeInterner) -> Result<Value, VMError> {
    match (&ty.kind, node) {
        (TypeKind::Unit, Node::Prim { prim: Prim::Unit, args, .. }) if args.is_empty() => Ok(Value::Unit),
        (TypeKind::Bool, Node::Prim { prim: Prim::True, args, .. }) if args.is_empty() => Ok(Value::Bool(true)),
        (TypeKind::Bool, Node::Prim { prim: Prim::False, args, .. }) if args.is_empty() => {
            Ok(Value::Bool(false))
        }
        (TypeKind::Int, Node::Int(n)) => Ok(Value::Int(n.clone())),
        (TypeKind::Nat, Node::Int(n)) => {
            if n.is_negative() {
                return Err(VMError::invalid_data(format!("negative nat {}", n)));
            }
            Ok(Value::Nat(n.clone()))
        }
        (TypeKind::Mumav, Node::Int(n)) => match n.to_i64() {
            Some(m) if m >= 0 => Ok(Value::Mumav(m)),
            _ => Err(VMError::invalid_data(format!("mumav out of range: {}", n))),
        },
        (TypeKind::String, Node::String(s)) => {
            if !is_valid_string(s) {
                return Err(VMError::invalid_data(format!("invalid characters in string {:?}", s)));
            }
            Ok(Value::String(s.clone()))
        }
        (TypeKind::Bytes, Node::Bytes(b)) => Ok(Value::Bytes(b.clone())),
        (TypeKind::Timestamp, Node::Int(n)) => Ok(Value::Timestamp(n.clone())),
        (TypeKind::Timestamp, Node::String(s)) => parse_rfc3339(s)
            .map(|t| Value::Timestamp(BigInt::from(t)))
            .ok_or_else(|| VMError::invalid_data(format!("invalid timestamp {:?}", s))),
        (TypeKind::Address, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(Destination::parse(s)?),
            decoded::<Destination>,
        )
        .map(Value::Address),
        (TypeKind::Key, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(PublicKey::from_base58(s)?),
            decoded::<PublicKey>,
        )
        .map(Value::Key),
        (TypeKind::KeyHash, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(KeyHash::from_base58(s)?),
            decoded::<KeyHash>,
        )
        .map(Value::KeyHash),
        (TypeKind::Signature, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(Signature::from_base58(s)?),
            decoded::<Signature>,
        )
        .map(Value::Signature),
        (TypeKind::ChainId, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(ChainId::from_base58(s)?),
            decoded::<ChainId>,
        )
        .map(Value::ChainId),
        (TypeKind::TxRollupL2Address, _) => bytes_or_string(
            node,
            ty,
            |s| Ok(L2Address::from_base58(s)?),
            decoded::<L2Address>,
        )
        .map(Value::TxRollupL2Address),
        (TypeKind::Contract(param), _) => bytes_or_string(
            node,
            ty,
            |s| Ok(Destination::parse(s)?),
            decoded::<Destination>,
        )
        .map(|destination| Value::Contract {
            destination,
            param_type: param.clone(),
        }),
        (TypeKind::Pair(left, right), _) => parse_pair(node, ty, left, right, interner),
        (TypeKind::Option(inner), Node::Prim { prim: Prim::Some, args, .. }) => match args.as_slice() {
            [arg] => Ok(Value::some(parse_data(arg, inner, interner)?)),
            _ => Err(mismatch(node, ty)),
        },
        (TypeKind::Option(_), Node::Prim { prim: Prim::None, args, .. }) if args.is_empty() => {
            Ok(Value::none())
        }
        (TypeKind::Or(left, _), Node::Prim { prim: Prim::Left, args, .. }) if args.len() == 1 => {
            Ok(Value::left(parse_data(&args[0], left, interner)?))
        }
        (TypeKind::Or(_, right), Node::Prim { prim: Prim::Right, args, .. }) if args.len() == 1 => {
            Ok(Value::right(parse_data(&args[0], right, interner)?))
        }
        (TypeKind::List(elt), Node::Seq(items)) => items
            .iter()
            .map(|item| parse_data(item, elt, interner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (TypeKind::Set(elt), Node::Seq(items)) => {
            let mut set = BTreeSet::new();
            let mut last: Option<Value> = None;
            for item in items {
                let value = parse_data(item, elt, interner)?;
                check_sorted(last.as_ref(), &value, "set elements")?;
                last = Some(value.clone());
                set.insert(value);
            }
            Ok(Value::Set(set))
        }
        (TypeKind::Map(k, v), Node::Seq(items)) => parse_elts(items, k, v, interner).map(Value::Map),
        (TypeKind::BigMap(k, v), Node::Int(id)) => {
            let id = id
                .to_i64()
                .ok_or_else(|| VMError::invalid_data(format!("big map id out of range: {}", id)))?;
            Ok(Value::BigMap(BigMap::with_id(id, k.clone(), v.clone())))
        }
        (TypeKind::BigMap(k, v), Node::Seq(items)) => {
            let mut map = BigMap::empty(k.clone(), v.clone());
            map.overlay = parse_elts(items, k, v, interner)?
                .into_iter()
                .map(|(key, value)| (key, Some(value)))
                .collect();
            Ok(Value::BigMap(map))
        }
        (TypeKind::Lambda(arg, ret), Node::Seq(_)) => {
            let body = check_lambda(node, arg, ret, false, interner)?;
            Ok(Value::Lambda(Arc::new(Lambda {
                arg: arg.clone(),
                ret: ret.clone(),
                code: node.clone(),
                body,
                recursive: false,
            })))
        }
        (TypeKind::Lambda(arg, ret), Node::Prim { prim: Prim::Lambda_rec, args, .. }) if args.len() == 1 => {
            let body = check_lambda(&args[0], arg, ret, true, interner)?;
            Ok(Value::Lambda(Arc::new(Lambda {
                arg: arg.clone(),
                ret: ret.clone(),
                code: args[0].clone(),
                body,
                recursive: true,
            })))
        }
        (TypeKind::Ticket(content_type), _) => parse_ticket(node, ty, content_type, interner),
        (TypeKind::Bls12381G1, Node::Bytes(b)) => Ok(Value::Bls12381G1(bls::g1_from_bytes(b)?)),
        (TypeKind::Bls12381G2, Node::Bytes(b)) => Ok(Value::Bls12381G2(bls::g2_from_bytes(b)?)),
        (TypeKind::Bls12381Fr, Node::Bytes(b)) => Ok(Value::Bls12381Fr(bls::fr_from_bytes(b)?)),
        (TypeKind::Bls12381Fr, Node::Int(n)) => Ok(Value::Bls12381Fr(bls::fr_from_int(n))),
        (TypeKind::SaplingState(memo), Node::Int(id)) => Ok(Value::SaplingState {
            id: Some(
                id.to_i64()
                    .ok_or_else(|| VMError::invalid_data(format!("sapling id out of range: {}", id)))?,
            ),
            memo_size: *memo,
        }),
        (TypeKind::SaplingState(memo), Node::Seq(items)) if items.is_empty() => Ok(Value::SaplingState {
            id: None,
            memo_size: *memo,
        }),
        (TypeKind::SaplingTransaction(_) | TypeKind::SaplingTransactionDeprecated(_), Node::Bytes(b)) => {
            Ok(Value::SaplingTransaction(b.clone()))
        }
        (TypeKind::Chest, Node::Bytes(b)) => Ok(Value::Chest(b.clone())),
        (TypeKind::ChestKey, Node::Bytes(b)) => Ok(Value::ChestKey(b.clone())),
        (TypeKind::Operation, _) => Err(VMError::type_mismatch("operations have no literal form")),
        (TypeKind::Never, _) => Err(VMError::type_mismatch("never has no values")),
        _ => Err(mismatch(node, ty)),
    }
}

fn check_sorted(last: Option<&Value>, next: &Value, what: &str) -> Result<(), VMError> {
    match last.map(|l| l.cmp(next)) {
        Some(Ordering::Less) | None => Ok(()),
        Some(Ordering::Equal) => Err(VMError::invalid_data(format!("duplicate {}", what))),
        Some(Ordering::Greater) => Err(VMError::invalid_data(format!("unsorted {}", what))),
    }
}

fn parse_elts(
    items: &[Node],
    key_type: &Arc<Type>,
    value_type: &Arc<Type>,
    interner: &mut TypeInterner,
) -> Result<BTreeMap<Value, Value>, VMError> {
    let mut map = BTreeMap::new();
    let mut last: Option<Value> = None;
    for item in items {
        let (k, v) = match item.as_prim(Prim::Elt) {
            Some(([k, v], _)) => (k, v),
            _ => return Err(VMError::TypeMismatch(format!("expected Elt, got {}", item))),
        };
        let key = parse_data(k, key_type, interner)?;
        check_sorted(last.as_ref(), &key, "map keys")?;
        let value = parse_data(v, value_type, interner)?;
        last = Some(key.clone());
        map.insert(key, value);
    }
    Ok(map)
}

fn parse_pair(
    node: &Node,
    ty: &Arc<Type>,
    left: &Arc<Type>,
    right: &Arc<Type>,
    interner: &mut TypeInterner,
) -> Result<Value, VMError> {
    let items: &[Node] = match node {
        Node::Prim { prim: Prim::Pair, args, .. } => args,
        Node::Seq(items) => items,
        _ => return Err(mismatch(node, ty)),
    };
    match items {
        [] | [_] => Err(mismatch(node, ty)),
        [a, b] => Ok(Value::pair(
            parse_data(a, left, interner)?,
            parse_data(b, right, interner)?,
        )),
        [a, rest @ ..] => {
            let first = parse_data(a, left, interner)?;
            let tail = Node::prim_args(Prim::Pair, rest.to_vec());
            Ok(Value::pair(first, parse_data(&tail, right, interner)?))
        }
    }
}

fn parse_ticket(
    node: &Node,
    ty: &Arc<Type>,
    content_type: &Arc<Type>,
    interner: &mut TypeInterner,
) -> Result<Value, VMError> {
    let (ticketer, content, amount) = match node {
        Node::Prim { prim: Prim::Ticket, args, .. } => match args.as_slice() {
            [ticketer, declared, content, amount] => {
                let declared = interner.resolve(declared)?;
                crate::core::ty::structurally_equal(&declared, content_type)?;
                (ticketer, content, amount)
            }
            _ => return Err(mismatch(node, ty)),
        },
        Node::Prim { prim: Prim::Pair, args, .. } => match args.as_slice() {
            [ticketer, content, amount] => (ticketer, content, amount),
            _ => return Err(mismatch(node, ty)),
        },
        _ => return Err(mismatch(node, ty)),
    };
    let Value::Address(ticketer) = parse_data(ticketer, &Type::address(), interner)? else {
        return Err(mismatch(node, ty));
    };
    let Value::Nat(amount) = parse_data(amount, &Type::nat(), interner)? else {
        return Err(mismatch(node, ty));
    };
    Ok(Value::Ticket(Box::new(Ticket {
        ticketer: ticketer.address,
        content_type: content_type.clone(),
        content: Box::new(parse_data(content, content_type, interner)?),
        amount,
    })))
}
