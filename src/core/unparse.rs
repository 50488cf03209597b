//! Value to Micheline, plus `PACK`/`UNPACK`.
//!
//! Three output forms exist:
//! - `Readable`: base58 strings, RFC 3339 timestamps, flattened `Pair a b c`
//! - `Optimized`: raw bytes and integers, combs of four or more as sequences
//! - `OptimizedLegacy`: raw bytes and integers, binary `Pair` nesting; the form `PACK` hashes

use crate::core::data::parse_data;
use crate::core::ty::{Type, TypeInterner, TypeKind};
use crate::core::value::Value;
use crate::crypto::bls;
use crate::micheline::{Node, Prim, pack_node, script_expr_hash, unpack_node};
use crate::types::encoding::Encode;
use crate::utils;
use crate::utils::time::format_rfc3339;
use crate::virtual_machine::errors::VMError;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Readable,
    Optimized,
    OptimizedLegacy,
}

impl Mode {
    fn readable(self) -> bool {
        self == Mode::Readable
    }
}

fn text_or_bytes(mode: Mode, text: impl FnOnce() -> String, bytes: impl FnOnce() -> Vec<u8>) -> Node {
    if mode.readable() {
        Node::String(text())
    } else {
        Node::Bytes(bytes())
    }
}

/// Unparses `value`, which must have type `ty`.
pub fn unparse(value: &Value, ty: &Type, mode: Mode) -> Result<Node, VMError> {
    utils::stack::grow(|| unparse_value(value, ty, mode))
}

fn unparse_value(value: &Value, ty: &Type, mode: Mode) -> Result<Node, VMError> {
    let mismatch = || VMError::TypeMismatch(format!("cannot unparse {} as {}", value.kind_name(), ty));
    Ok(match (&ty.kind, value) {
        (TypeKind::Unit, Value::Unit) => Node::prim(Prim::Unit),
        (TypeKind::Bool, Value::Bool(b)) => Node::prim(if *b { Prim::True } else { Prim::False }),
        (TypeKind::Int, Value::Int(n)) | (TypeKind::Nat, Value::Nat(n)) => Node::Int(n.clone()),
        (TypeKind::Mumav, Value::Mumav(m)) => Node::int(*m),
        (TypeKind::String, Value::String(s)) => Node::String(s.clone()),
        (TypeKind::Bytes, Value::Bytes(b)) => Node::Bytes(b.clone()),
        (TypeKind::Timestamp, Value::Timestamp(t)) => {
            let text = if mode.readable() {
                i64::try_from(t).ok().and_then(format_rfc3339)
            } else {
                None
            };
            match text {
                Some(text) => Node::String(text),
                None => Node::Int(t.clone()),
            }
        }
        (TypeKind::Address, Value::Address(d)) => text_or_bytes(mode, || d.to_string(), || d.to_bytes()),
        (TypeKind::Contract(_), Value::Contract { destination, .. }) => {
            text_or_bytes(mode, || destination.to_string(), || destination.to_bytes())
        }
        (TypeKind::Key, Value::Key(k)) => text_or_bytes(mode, || k.to_base58(), || k.to_bytes()),
        (TypeKind::KeyHash, Value::KeyHash(k)) => text_or_bytes(mode, || k.to_base58(), || k.to_bytes()),
        (TypeKind::Signature, Value::Signature(s)) => text_or_bytes(mode, || s.to_base58(), || s.to_bytes()),
        (TypeKind::ChainId, Value::ChainId(c)) => text_or_bytes(mode, || c.to_base58(), || c.to_bytes()),
        (TypeKind::TxRollupL2Address, Value::TxRollupL2Address(a)) => {
            text_or_bytes(mode, || a.to_base58(), || a.0.to_vec())
        }
        (TypeKind::Pair(..), Value::Pair(..)) => unparse_comb(value, ty, mode)?,
        (TypeKind::Option(_), Value::Option(None)) => Node::prim(Prim::None),
        (TypeKind::Option(t), Value::Option(Some(v))) => Node::prim_args(Prim::Some, vec![unparse(v, t, mode)?]),
        (TypeKind::Or(l, _), Value::Left(v)) => Node::prim_args(Prim::Left, vec![unparse(v, l, mode)?]),
        (TypeKind::Or(_, r), Value::Right(v)) => Node::prim_args(Prim::Right, vec![unparse(v, r, mode)?]),
        (TypeKind::List(t), Value::List(items)) => Node::Seq(
            items
                .iter()
                .map(|v| unparse(v, t, mode))
                .collect::<Result<_, _>>()?,
        ),
        (TypeKind::Set(t), Value::Set(items)) => Node::Seq(
            items
                .iter()
                .map(|v| unparse(v, t, mode))
                .collect::<Result<_, _>>()?,
        ),
        (TypeKind::Map(kt, vt), Value::Map(entries)) => Node::Seq(
            entries
                .iter()
                .map(|(k, v)| Ok(Node::prim_args(Prim::Elt, vec![unparse(k, kt, mode)?, unparse(v, vt, mode)?])))
                .collect::<Result<_, VMError>>()?,
        ),
        (TypeKind::BigMap(kt, vt), Value::BigMap(map)) => match map.id {
            Some(id) => Node::int(id),
            None => Node::Seq(
                map.overlay
                    .iter()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
                    .map(|(k, v)| Ok(Node::prim_args(Prim::Elt, vec![unparse(k, kt, mode)?, unparse(v, vt, mode)?])))
                    .collect::<Result<_, VMError>>()?,
            ),
        },
        (TypeKind::Lambda(..), Value::Lambda(lambda)) => {
            if lambda.recursive {
                Node::prim_args(Prim::Lambda_rec, vec![lambda.code.clone()])
            } else {
                lambda.code.clone()
            }
        }
        (TypeKind::Ticket(t), Value::Ticket(ticket)) => {
            let ticketer = unparse(
                &Value::Address(ticket.ticketer.into()),
                &Type::new(TypeKind::Address),
                mode,
            )?;
            let content = unparse(&ticket.content, t, mode)?;
            let amount = Node::Int(ticket.amount.clone());
            if mode == Mode::OptimizedLegacy {
                Node::prim_args(Prim::Pair, vec![ticketer, Node::prim_args(Prim::Pair, vec![content, amount])])
            } else {
                Node::prim_args(Prim::Ticket, vec![ticketer, t.to_node(), content, amount])
            }
        }
        (TypeKind::Bls12381G1, Value::Bls12381G1(p)) => Node::Bytes(bls::g1_to_bytes(p)),
        (TypeKind::Bls12381G2, Value::Bls12381G2(p)) => Node::Bytes(bls::g2_to_bytes(p)),
        (TypeKind::Bls12381Fr, Value::Bls12381Fr(s)) => Node::Bytes(bls::fr_to_bytes(s)),
        (TypeKind::SaplingState(_), Value::SaplingState { id, .. }) => match id {
            Some(id) => Node::int(*id),
            None => Node::Seq(Vec::new()),
        },
        (
            TypeKind::SaplingTransaction(_) | TypeKind::SaplingTransactionDeprecated(_),
            Value::SaplingTransaction(b),
        ) => Node::Bytes(b.clone()),
        (TypeKind::Chest, Value::Chest(b)) | (TypeKind::ChestKey, Value::ChestKey(b)) => Node::Bytes(b.clone()),
        (TypeKind::Operation, Value::Operation(_)) => {
            return Err(VMError::Unsupported("operations cannot be unparsed".into()));
        }
        _ => return Err(mismatch()),
    })
}

/// Pairs along a right comb, with the shape chosen by `mode`.
fn unparse_comb(value: &Value, ty: &Type, mode: Mode) -> Result<Node, VMError> {
    if mode == Mode::OptimizedLegacy {
        let (TypeKind::Pair(lt, rt), Value::Pair(l, r)) = (&ty.kind, value) else {
            return unparse(value, ty, mode);
        };
        return Ok(Node::prim_args(Prim::Pair, vec![unparse(l, lt, mode)?, unparse(r, rt, mode)?]));
    }
    let mut items = Vec::new();
    let (mut ty, mut value) = (ty, value);
    while let (TypeKind::Pair(lt, rt), Value::Pair(l, r)) = (&ty.kind, value) {
        items.push(unparse(l, lt, mode)?);
        ty = rt.as_ref();
        value = r.as_ref();
    }
    items.push(unparse(value, ty, mode)?);
    if mode == Mode::Optimized && items.len() >= 4 {
        Ok(Node::Seq(items))
    } else {
        Ok(Node::prim_args(Prim::Pair, items))
    }
}

/// `PACK`: the `0x05`-prefixed binary of the legacy optimized form.
pub fn pack(value: &Value, ty: &Type) -> Result<Vec<u8>, VMError> {
    Ok(pack_node(&unparse(value, ty, Mode::OptimizedLegacy)?))
}

/// `UNPACK`: `None` on any decoding or typing failure.
pub fn unpack(bytes: &[u8], ty: &Arc<Type>, interner: &mut TypeInterner) -> Option<Value> {
    let node = unpack_node(bytes).ok()?;
    parse_data(&node, ty, interner).ok()
}

/// Expression hash a big map stores `key` under.
pub fn key_hash(key: &Value, key_type: &Type) -> Result<String, VMError> {
    Ok(script_expr_hash(&pack(key, key_type)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::parse;
    use crate::utils::test_utils::utils::to_hex;

    fn roundtrip(ty: &str, src: &str) -> (Value, Arc<Type>, TypeInterner) {
        let mut interner = TypeInterner::new();
        let ty = interner.resolve(&parse(ty).unwrap()).unwrap();
        let value = parse_data(&parse(src).unwrap(), &ty, &mut interner).unwrap();
        (value, ty, interner)
    }

    #[test]
    fn pack_known_vectors() {
        let (v, ty, _) = roundtrip("nat", "1");
        assert_eq!(to_hex(&pack(&v, &ty).unwrap()), "050001");
        let (v, ty, _) = roundtrip("string", "\"foo\"");
        assert_eq!(to_hex(&pack(&v, &ty).unwrap()), "050100000003666f6f");
        let (v, ty, _) = roundtrip("pair nat nat", "Pair 1 2");
        assert_eq!(to_hex(&pack(&v, &ty).unwrap()), "0507070001 0002".replace(' ', ""));
    }

    #[test]
    fn unpack_inverts_pack() {
        let (v, ty, mut interner) = roundtrip(
            "pair (list address) (option timestamp) (map string int)",
            "Pair { \"KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY\" } (Some \"2020-01-01T00:00:00Z\") { Elt \"a\" -1 }",
        );
        let packed = pack(&v, &ty).unwrap();
        assert_eq!(unpack(&packed, &ty, &mut interner), Some(v));
        assert_eq!(unpack(&[0x05, 0x00], &ty, &mut interner), None);
        assert_eq!(unpack(&packed[1..], &ty, &mut interner), None);
    }

    #[test]
    fn modes_shape_combs_and_domain_values() {
        let (v, ty, _) = roundtrip(
            "pair nat nat nat address",
            "Pair 1 2 3 \"KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY\"",
        );
        let readable = unparse(&v, &ty, Mode::Readable).unwrap();
        assert_eq!(readable.to_string(), "Pair 1 2 3 \"KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY\"");
        assert!(matches!(unparse(&v, &ty, Mode::Optimized).unwrap(), Node::Seq(items) if items.len() == 4));
        let legacy = unparse(&v, &ty, Mode::OptimizedLegacy).unwrap();
        assert!(matches!(legacy, Node::Prim { prim: Prim::Pair, ref args, .. } if args.len() == 2));
    }

    #[test]
    fn timestamps_render_as_dates_when_readable() {
        let (v, ty, _) = roundtrip("timestamp", "0");
        assert_eq!(unparse(&v, &ty, Mode::Readable).unwrap(), Node::string("1970-01-01T00:00:00Z"));
        assert_eq!(unparse(&v, &ty, Mode::Optimized).unwrap(), Node::int(0));
    }

    #[test]
    fn key_hash_is_an_expr_hash() {
        let (v, ty, _) = roundtrip("nat", "0");
        let hash = key_hash(&v, &ty).unwrap();
        assert!(hash.starts_with("expr"));
        assert_eq!(hash.len(), 54);
    }
}
