//! Operand typing of arithmetic, bitwise and comparison instructions.

use super::{Step, StackType, ill_typed, pop};
use crate::core::ty::{Type, TypeKind};
use crate::micheline::{Node, Prim};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instr::Instr;
use std::sync::Arc;

pub(super) fn handles(prim: Prim) -> bool {
    binary_instr(prim).is_some() || unary_instr(prim).is_some()
}

fn binary_instr(prim: Prim) -> Option<Instr> {
    Some(match prim {
        Prim::ADD => Instr::Add,
        Prim::SUB => Instr::Sub,
        Prim::SUB_MUMAV => Instr::SubMumav,
        Prim::MUL => Instr::Mul,
        Prim::EDIV => Instr::Ediv,
        Prim::LSL => Instr::Lsl,
        Prim::LSR => Instr::Lsr,
        Prim::OR => Instr::Or,
        Prim::AND => Instr::And,
        Prim::XOR => Instr::Xor,
        Prim::COMPARE => Instr::Compare,
        _ => return None,
    })
}

fn unary_instr(prim: Prim) -> Option<Instr> {
    Some(match prim {
        Prim::ABS => Instr::Abs,
        Prim::ISNAT => Instr::IsNat,
        Prim::INT => Instr::Int,
        Prim::NAT => Instr::Nat,
        Prim::BYTES => Instr::Bytes,
        Prim::NEG => Instr::Neg,
        Prim::NOT => Instr::Not,
        Prim::EQ => Instr::Eq,
        Prim::NEQ => Instr::Neq,
        Prim::LT => Instr::Lt,
        Prim::GT => Instr::Gt,
        Prim::LE => Instr::Le,
        Prim::GE => Instr::Ge,
        _ => return None,
    })
}

/// Result type of a binary instruction, `a` being the top operand.
fn binary_result(prim: Prim, a: &Arc<Type>, b: &Arc<Type>) -> Option<Arc<Type>> {
    use TypeKind::*;
    Some(match (prim, &a.kind, &b.kind) {
        (Prim::ADD, Nat, Nat) => Type::nat(),
        (Prim::ADD, Nat | Int, Nat | Int) => Type::int(),
        (Prim::ADD, Timestamp, Int) | (Prim::ADD, Int, Timestamp) => Type::timestamp(),
        (Prim::ADD, Mumav, Mumav) => Type::mumav(),
        (Prim::ADD, Bls12381G1, Bls12381G1) => Type::bls12_381_g1(),
        (Prim::ADD, Bls12381G2, Bls12381G2) => Type::bls12_381_g2(),
        (Prim::ADD, Bls12381Fr, Bls12381Fr) => Type::bls12_381_fr(),

        (Prim::SUB, Nat | Int, Nat | Int) => Type::int(),
        (Prim::SUB, Timestamp, Int) => Type::timestamp(),
        (Prim::SUB, Timestamp, Timestamp) => Type::int(),
        (Prim::SUB, Mumav, Mumav) => Type::mumav(),
        (Prim::SUB_MUMAV, Mumav, Mumav) => Type::option(Type::mumav()),

        (Prim::MUL, Nat, Nat) => Type::nat(),
        (Prim::MUL, Nat | Int, Nat | Int) => Type::int(),
        (Prim::MUL, Mumav, Nat) | (Prim::MUL, Nat, Mumav) => Type::mumav(),
        (Prim::MUL, Bls12381G1, Bls12381Fr) => Type::bls12_381_g1(),
        (Prim::MUL, Bls12381G2, Bls12381Fr) => Type::bls12_381_g2(),
        (Prim::MUL, Bls12381Fr, Bls12381Fr) => Type::bls12_381_fr(),
        (Prim::MUL, Nat | Int, Bls12381Fr) | (Prim::MUL, Bls12381Fr, Nat | Int) => Type::bls12_381_fr(),

        (Prim::EDIV, Nat, Nat) => Type::option(Type::pair(Type::nat(), Type::nat())),
        (Prim::EDIV, Nat | Int, Nat | Int) => Type::option(Type::pair(Type::int(), Type::nat())),
        (Prim::EDIV, Mumav, Nat) => Type::option(Type::pair(Type::mumav(), Type::mumav())),
        (Prim::EDIV, Mumav, Mumav) => Type::option(Type::pair(Type::nat(), Type::mumav())),

        (Prim::LSL | Prim::LSR, Nat, Nat) => Type::nat(),
        (Prim::LSL | Prim::LSR, Bytes, Nat) => Type::bytes(),

        (Prim::OR | Prim::AND | Prim::XOR, Bool, Bool) => Type::bool(),
        (Prim::OR | Prim::AND | Prim::XOR, Nat, Nat) => Type::nat(),
        (Prim::OR | Prim::AND | Prim::XOR, Bytes, Bytes) => Type::bytes(),
        (Prim::AND, Int, Nat) => Type::nat(),

        (Prim::COMPARE, _, _) if a == b && a.is_comparable() => Type::int(),
        _ => return None,
    })
}

fn unary_result(prim: Prim, a: &Arc<Type>) -> Option<Arc<Type>> {
    use TypeKind::*;
    Some(match (prim, &a.kind) {
        (Prim::ABS, Int) => Type::nat(),
        (Prim::ISNAT, Int) => Type::option(Type::nat()),
        (Prim::INT, Nat | Bls12381Fr | Bytes) => Type::int(),
        (Prim::NAT, Bytes) => Type::nat(),
        (Prim::BYTES, Nat | Int) => Type::bytes(),
        (Prim::NEG, Nat | Int) => Type::int(),
        (Prim::NEG, Bls12381G1 | Bls12381G2 | Bls12381Fr) => a.clone(),
        (Prim::NOT, Bool) => Type::bool(),
        (Prim::NOT, Nat | Int) => Type::int(),
        (Prim::NOT, Bytes) => Type::bytes(),
        (Prim::EQ | Prim::NEQ | Prim::LT | Prim::GT | Prim::LE | Prim::GE, Int) => Type::bool(),
        _ => return None,
    })
}

pub(super) fn check(prim: Prim, args: &[Node], mut stack: StackType) -> Result<Step, VMError> {
    if !args.is_empty() {
        return Err(VMError::TypeMismatch(format!("{} takes no arguments", prim)));
    }
    if let Some(instr) = binary_instr(prim) {
        let a = pop(&mut stack, prim)?;
        let b = pop(&mut stack, prim)?;
        let result = binary_result(prim, &a, &b).ok_or_else(|| ill_typed(prim, &[&a, &b]))?;
        stack.push(result);
        return Ok((instr, Some(stack)));
    }
    let instr = unary_instr(prim).ok_or_else(|| VMError::UnknownPrimitive(prim.to_string()))?;
    let a = pop(&mut stack, prim)?;
    let result = unary_result(prim, &a).ok_or_else(|| ill_typed(prim, &[&a]))?;
    stack.push(result);
    Ok((instr, Some(stack)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_integer_arithmetic_widens_to_int() {
        assert_eq!(binary_result(Prim::ADD, &Type::nat(), &Type::nat()), Some(Type::nat()));
        assert_eq!(binary_result(Prim::ADD, &Type::nat(), &Type::int()), Some(Type::int()));
        assert_eq!(binary_result(Prim::SUB, &Type::nat(), &Type::nat()), Some(Type::int()));
        assert_eq!(binary_result(Prim::SUB, &Type::mumav(), &Type::mumav()), Some(Type::mumav()));
        assert_eq!(binary_result(Prim::SUB, &Type::mumav(), &Type::nat()), None);
    }

    #[test]
    fn ediv_result_shapes() {
        assert_eq!(
            binary_result(Prim::EDIV, &Type::mumav(), &Type::mumav()),
            Some(Type::option(Type::pair(Type::nat(), Type::mumav())))
        );
        assert_eq!(
            binary_result(Prim::EDIV, &Type::int(), &Type::nat()),
            Some(Type::option(Type::pair(Type::int(), Type::nat())))
        );
    }

    #[test]
    fn compare_requires_equal_comparable_operands() {
        assert_eq!(binary_result(Prim::COMPARE, &Type::string(), &Type::string()), Some(Type::int()));
        assert_eq!(binary_result(Prim::COMPARE, &Type::string(), &Type::nat()), None);
        let l = Type::list(Type::nat());
        assert_eq!(binary_result(Prim::COMPARE, &l, &l), None);
    }

    #[test]
    fn unary_tables() {
        assert_eq!(unary_result(Prim::ABS, &Type::int()), Some(Type::nat()));
        assert_eq!(unary_result(Prim::NOT, &Type::nat()), Some(Type::int()));
        assert_eq!(unary_result(Prim::EQ, &Type::nat()), None);
    }
}
