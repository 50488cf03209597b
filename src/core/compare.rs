//! Total order over values.
//!
//! Comparable values follow the `COMPARE` semantics: numeric for integers,
//! amounts and timestamps, lexicographic for strings, byte-wise for bytes and
//! hashes, `None < Some`, `Left < Right` and component-wise for pairs.
//! Values of different variants and the non-comparable variants get an
//! arbitrary but stable order so that `Value` can implement `Ord` and `Eq`
//! consistently.

use crate::core::ty::Type;
use crate::core::value::{Lambda, Value};
use crate::micheline::encode_binary;
use std::cmp::Ordering;

fn rank(v: &Value) -> u8 {
    match v {
        Value::Unit => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 2,
        Value::Nat(_) => 3,
        Value::String(_) => 4,
        Value::Bytes(_) => 5,
        Value::Mumav(_) => 6,
        Value::Timestamp(_) => 7,
        Value::Address(_) => 8,
        Value::Key(_) => 9,
        Value::KeyHash(_) => 10,
        Value::Signature(_) => 11,
        Value::ChainId(_) => 12,
        Value::TxRollupL2Address(_) => 13,
        Value::Pair(..) => 14,
        Value::Option(_) => 15,
        Value::Left(_) => 16,
        Value::Right(_) => 17,
        Value::List(_) => 18,
        Value::Set(_) => 19,
        Value::Map(_) => 20,
        Value::BigMap(_) => 21,
        Value::Lambda(_) => 22,
        Value::Contract { .. } => 23,
        Value::Operation(_) => 24,
        Value::Ticket(_) => 25,
        Value::Bls12381G1(_) => 26,
        Value::Bls12381G2(_) => 27,
        Value::Bls12381Fr(_) => 28,
        Value::SaplingState { .. } => 29,
        Value::SaplingTransaction(_) => 30,
        Value::Chest(_) => 31,
        Value::ChestKey(_) => 32,
    }
}

fn cmp_types(a: &Type, b: &Type) -> Ordering {
    if a == b {
        Ordering::Equal
    } else {
        encode_binary(&a.to_node()).cmp(&encode_binary(&b.to_node()))
    }
}

fn cmp_lambdas(a: &Lambda, b: &Lambda) -> Ordering {
    a.recursive
        .cmp(&b.recursive)
        .then_with(|| cmp_types(&a.arg, &b.arg))
        .then_with(|| cmp_types(&a.ret, &b.ret))
        .then_with(|| encode_binary(&a.code).cmp(&encode_binary(&b.code)))
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Unit, Unit) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) | (Nat(a), Nat(b)) | (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Bytes(a), Bytes(b))
            | (SaplingTransaction(a), SaplingTransaction(b))
            | (Chest(a), Chest(b))
            | (ChestKey(a), ChestKey(b)) => a.cmp(b),
            (Mumav(a), Mumav(b)) => a.cmp(b),
            (Address(a), Address(b)) => a.cmp(b),
            (Key(a), Key(b)) => a.cmp(b),
            (KeyHash(a), KeyHash(b)) => a.cmp(b),
            (Signature(a), Signature(b)) => a.cmp(b),
            (ChainId(a), ChainId(b)) => a.cmp(b),
            (TxRollupL2Address(a), TxRollupL2Address(b)) => a.cmp(b),
            (Pair(a1, b1), Pair(a2, b2)) => a1.cmp(a2).then_with(|| b1.cmp(b2)),
            (Option(a), Option(b)) => a.cmp(b),
            (Left(a), Left(b)) | (Right(a), Right(b)) => a.cmp(b),
            (List(a), List(b)) => a.cmp(b),
            (Set(a), Set(b)) => a.iter().cmp(b.iter()),
            (Map(a), Map(b)) => a.iter().cmp(b.iter()),
            (BigMap(a), BigMap(b)) => a
                .id
                .cmp(&b.id)
                .then_with(|| cmp_types(&a.key_type, &b.key_type))
                .then_with(|| cmp_types(&a.value_type, &b.value_type))
                .then_with(|| a.overlay.iter().cmp(b.overlay.iter())),
            (Lambda(a), Lambda(b)) => cmp_lambdas(a, b),
            (
                Contract {
                    destination: d1,
                    param_type: t1,
                },
                Contract {
                    destination: d2,
                    param_type: t2,
                },
            ) => d1.cmp(d2).then_with(|| cmp_types(t1, t2)),
            (Operation(a), Operation(b)) => {
                if a == b {
                    Ordering::Equal
                } else {
                    a.nonce()
                        .cmp(&b.nonce())
                        .then_with(|| format!("{:?}", a).cmp(&format!("{:?}", b)))
                }
            }
            (Ticket(a), Ticket(b)) => a
                .ticketer
                .cmp(&b.ticketer)
                .then_with(|| cmp_types(&a.content_type, &b.content_type))
                .then_with(|| a.content.cmp(&b.content))
                .then_with(|| a.amount.cmp(&b.amount)),
            (Bls12381G1(a), Bls12381G1(b)) => a.to_compressed().cmp(&b.to_compressed()),
            (Bls12381G2(a), Bls12381G2(b)) => a.to_compressed().cmp(&b.to_compressed()),
            (Bls12381Fr(a), Bls12381Fr(b)) => a.to_bytes().cmp(&b.to_bytes()),
            (
                SaplingState {
                    id: i1,
                    memo_size: m1,
                },
                SaplingState {
                    id: i2,
                    memo_size: m2,
                },
            ) => m1.cmp(m2).then_with(|| i1.cmp(i2)),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

/// `COMPARE`: -1, 0 or 1.
pub fn compare(a: &Value, b: &Value) -> i32 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::address::{Address, Destination};
    use proptest::prelude::*;

    #[test]
    fn scalars() {
        assert_eq!(compare(&Value::int(-3), &Value::int(2)), -1);
        assert_eq!(compare(&Value::string("b"), &Value::string("ab")), 1);
        assert_eq!(compare(&Value::Bytes(vec![0x01]), &Value::Bytes(vec![0x01, 0x00])), -1);
        assert_eq!(compare(&Value::Bool(false), &Value::Bool(true)), -1);
        assert_eq!(compare(&Value::Unit, &Value::Unit), 0);
        assert_eq!(compare(&Value::Mumav(10), &Value::Mumav(9)), 1);
    }

    #[test]
    fn structured() {
        assert_eq!(compare(&Value::none(), &Value::some(Value::nat(0))), -1);
        assert_eq!(compare(&Value::left(Value::nat(9)), &Value::right(Value::nat(0))), -1);
        assert_eq!(
            compare(
                &Value::pair(Value::nat(1), Value::nat(5)),
                &Value::pair(Value::nat(1), Value::nat(4))
            ),
            1
        );
    }

    #[test]
    fn implicit_before_originated() {
        let implicit = Address::from_base58("mv1ShDp4Q4aFEcFwyhPkr7YZ8nd6cNbxntvN").unwrap();
        let originated = Address::from_base58("KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY").unwrap();
        assert_eq!(
            compare(
                &Value::Address(Destination::from(implicit)),
                &Value::Address(Destination::from(originated))
            ),
            -1
        );
    }

    fn comparable_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Value::int),
            any::<u32>().prop_map(|n| Value::nat(n as u64)),
            "[a-z]{0,4}".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..4).prop_map(Value::Bytes),
            any::<bool>().prop_map(Value::Bool),
        ];
        leaf.prop_recursive(3, 16, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| Value::pair(a, b)),
                inner.clone().prop_map(Value::some),
                inner.clone().prop_map(Value::left),
                inner.prop_map(Value::right),
            ]
        })
    }

    proptest! {
        #[test]
        fn order_is_antisymmetric(a in comparable_value(), b in comparable_value()) {
            prop_assert_eq!(compare(&a, &b), -compare(&b, &a));
        }

        #[test]
        fn order_is_transitive(a in comparable_value(), b in comparable_value(), c in comparable_value()) {
            if compare(&a, &b) <= 0 && compare(&b, &c) <= 0 {
                prop_assert!(compare(&a, &c) <= 0);
            }
        }

        #[test]
        fn equality_agrees_with_order(a in comparable_value()) {
            prop_assert_eq!(compare(&a, &a.clone()), 0);
        }
    }
}
