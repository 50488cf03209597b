//! Arithmetic, bitwise and comparison instructions.
//!
//! Operand order follows the stack: `a` is the top item, `b` the one below.

use super::Interpreter;
use super::stack::expected;
use crate::core::compare::compare;
use crate::core::value::Value;
use crate::crypto::bls;
use crate::virtual_machine::errors::VMError;
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

/// Largest accepted shift for integers.
const MAX_INT_SHIFT: u64 = 256;
/// Largest accepted shift for bytes.
const MAX_BYTES_SHIFT: u64 = 64_000;

/// Euclidean division: the remainder is always in `[0, |b|)`.
fn ediv(a: &BigInt, b: &BigInt) -> Option<(BigInt, BigInt)> {
    if b.is_zero() {
        return None;
    }
    let r = a.mod_floor(&b.abs());
    let q = (a - &r) / b;
    Some((q, r))
}

fn mumav_of(n: &BigInt) -> Result<i64, VMError> {
    n.to_i64().ok_or(VMError::MumavOverflow)
}

fn shift_amount(instr: &'static str, n: &BigInt, max: u64) -> Result<usize, VMError> {
    match n.to_u64() {
        Some(s) if s <= max => Ok(s as usize),
        _ => Err(VMError::GeneralOverflow(format!(
            "{} by {} exceeds {} bits",
            instr, n, max
        ))),
    }
}

/// Big-endian unsigned bytes of `n`, left-padded to `len`.
fn to_fixed_be(n: &BigInt, len: usize) -> Vec<u8> {
    if n.is_zero() {
        return vec![0; len];
    }
    let (_, raw) = n.to_bytes_be();
    let mut out = vec![0; len.saturating_sub(raw.len())];
    out.extend_from_slice(&raw[raw.len().saturating_sub(len)..]);
    out
}

/// Applies `op` bytewise after aligning both operands on their last byte.
fn bytes_bitwise(a: &[u8], b: &[u8], widen: bool, op: impl Fn(u8, u8) -> u8) -> Vec<u8> {
    let len = if widen { a.len().max(b.len()) } else { a.len().min(b.len()) };
    let at = |v: &[u8], i: usize| {
        let pad = len as isize - v.len() as isize;
        let j = i as isize - pad;
        if j < 0 { 0 } else { v[j as usize] }
    };
    (0..len).map(|i| op(at(a, i), at(b, i))).collect()
}

impl Interpreter<'_> {
    fn pop2(&mut self, instr: &'static str) -> Result<(Value, Value), VMError> {
        let a = self.stack.pop(instr)?;
        let b = self.stack.pop(instr)?;
        Ok((a, b))
    }

    // ==================== Arithmetic ====================

    pub(super) fn op_add(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Nat(a), Value::Nat(b)) => Value::Nat(a + b),
            (Value::Int(a) | Value::Nat(a), Value::Int(b) | Value::Nat(b)) => Value::Int(a + b),
            (Value::Timestamp(t), Value::Int(n)) | (Value::Int(n), Value::Timestamp(t)) => {
                Value::Timestamp(t + n)
            }
            (Value::Mumav(a), Value::Mumav(b)) => {
                Value::Mumav(a.checked_add(b).ok_or(VMError::MumavOverflow)?)
            }
            (Value::Bls12381G1(a), Value::Bls12381G1(b)) => Value::Bls12381G1(bls::g1_add(&a, &b)),
            (Value::Bls12381G2(a), Value::Bls12381G2(b)) => Value::Bls12381G2(bls::g2_add(&a, &b)),
            (Value::Bls12381Fr(a), Value::Bls12381Fr(b)) => Value::Bls12381Fr(a + b),
            (a, _) => return Err(expected(instr, "numeric operands", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Int(a) | Value::Nat(a), Value::Int(b) | Value::Nat(b)) => Value::Int(a - b),
            (Value::Timestamp(t), Value::Int(n)) => Value::Timestamp(t - n),
            (Value::Timestamp(a), Value::Timestamp(b)) => Value::Int(a - b),
            (Value::Mumav(a), Value::Mumav(b)) => {
                Value::Mumav(a.checked_sub(b).filter(|d| *d >= 0).ok_or(VMError::MumavUnderflow)?)
            }
            (a, _) => return Err(expected(instr, "int, nat, timestamp or mumav operands", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    /// `None` instead of a negative amount.
    pub(super) fn op_sub_mumav(&mut self, instr: &'static str) -> Result<(), VMError> {
        let a = self.stack.pop_mumav(instr)?;
        let b = self.stack.pop_mumav(instr)?;
        let diff = a.checked_sub(b).filter(|d| *d >= 0);
        self.stack.push(Value::Option(diff.map(|d| Box::new(Value::Mumav(d)))));
        Ok(())
    }

    pub(super) fn op_mul(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Nat(a), Value::Nat(b)) => Value::Nat(a * b),
            (Value::Int(a) | Value::Nat(a), Value::Int(b) | Value::Nat(b)) => Value::Int(a * b),
            (Value::Mumav(m), Value::Nat(n)) | (Value::Nat(n), Value::Mumav(m)) => {
                let product = mumav_of(&n)?.checked_mul(m).ok_or(VMError::MumavOverflow)?;
                Value::Mumav(product)
            }
            (Value::Bls12381G1(p), Value::Bls12381Fr(s)) => Value::Bls12381G1(bls::g1_mul(&p, &s)),
            (Value::Bls12381G2(p), Value::Bls12381Fr(s)) => Value::Bls12381G2(bls::g2_mul(&p, &s)),
            (Value::Bls12381Fr(a), Value::Bls12381Fr(b)) => Value::Bls12381Fr(a * b),
            (Value::Int(n) | Value::Nat(n), Value::Bls12381Fr(s))
            | (Value::Bls12381Fr(s), Value::Int(n) | Value::Nat(n)) => {
                Value::Bls12381Fr(bls::fr_from_int(&n) * s)
            }
            (a, _) => return Err(expected(instr, "numeric operands", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_ediv(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Nat(a), Value::Nat(b)) => {
                ediv(&a, &b).map(|(q, r)| Value::pair(Value::Nat(q), Value::Nat(r)))
            }
            (Value::Int(a) | Value::Nat(a), Value::Int(b) | Value::Nat(b)) => {
                ediv(&a, &b).map(|(q, r)| Value::pair(Value::Int(q), Value::Nat(r)))
            }
            (Value::Mumav(a), Value::Nat(b)) => match ediv(&BigInt::from(a), &b) {
                Some((q, r)) => Some(Value::pair(
                    Value::Mumav(mumav_of(&q)?),
                    Value::Mumav(mumav_of(&r)?),
                )),
                None => None,
            },
            (Value::Mumav(a), Value::Mumav(b)) => match ediv(&BigInt::from(a), &BigInt::from(b)) {
                Some((q, r)) => Some(Value::pair(Value::Nat(q), Value::Mumav(mumav_of(&r)?))),
                None => None,
            },
            (a, _) => return Err(expected(instr, "numeric operands", &a)),
        };
        self.stack.push(Value::Option(result.map(Box::new)));
        Ok(())
    }

    pub(super) fn op_abs(&mut self, instr: &'static str) -> Result<(), VMError> {
        let n = self.stack.pop_int(instr)?;
        self.stack.push(Value::Nat(n.abs()));
        Ok(())
    }

    pub(super) fn op_is_nat(&mut self, instr: &'static str) -> Result<(), VMError> {
        let n = self.stack.pop_int(instr)?;
        let nat = (!n.is_negative()).then(|| Box::new(Value::Nat(n)));
        self.stack.push(Value::Option(nat));
        Ok(())
    }

    pub(super) fn op_int(&mut self, instr: &'static str) -> Result<(), VMError> {
        let n = match self.stack.pop(instr)? {
            Value::Nat(n) => n,
            Value::Bls12381Fr(s) => bls::fr_to_int(&s),
            Value::Bytes(b) if b.is_empty() => BigInt::zero(),
            Value::Bytes(b) => BigInt::from_signed_bytes_be(&b),
            other => return Err(expected(instr, "nat, bytes or bls12_381_fr", &other)),
        };
        self.stack.push(Value::Int(n));
        Ok(())
    }

    pub(super) fn op_nat(&mut self, instr: &'static str) -> Result<(), VMError> {
        let b = self.stack.pop_bytes(instr)?;
        self.stack.push(Value::Nat(BigInt::from_bytes_be(Sign::Plus, &b)));
        Ok(())
    }

    /// Shortest big-endian encoding; zero encodes as empty bytes.
    pub(super) fn op_bytes(&mut self, instr: &'static str) -> Result<(), VMError> {
        let bytes = match self.stack.pop(instr)? {
            Value::Nat(n) | Value::Int(n) if n.is_zero() => Vec::new(),
            Value::Nat(n) => n.to_bytes_be().1,
            Value::Int(n) => n.to_signed_bytes_be(),
            other => return Err(expected(instr, "int or nat", &other)),
        };
        self.stack.push(Value::Bytes(bytes));
        Ok(())
    }

    pub(super) fn op_neg(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.stack.pop(instr)? {
            Value::Nat(n) | Value::Int(n) => Value::Int(-n),
            Value::Bls12381G1(p) => Value::Bls12381G1(-p),
            Value::Bls12381G2(p) => Value::Bls12381G2(-p),
            Value::Bls12381Fr(s) => Value::Bls12381Fr(-s),
            other => return Err(expected(instr, "int, nat or bls12_381 element", &other)),
        };
        self.stack.push(result);
        Ok(())
    }

    // ==================== Bitwise ====================

    pub(super) fn op_lsl(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Nat(n), Value::Nat(s)) => Value::Nat(n << shift_amount(instr, &s, MAX_INT_SHIFT)?),
            (Value::Bytes(b), Value::Nat(s)) => {
                let s = shift_amount(instr, &s, MAX_BYTES_SHIFT)?;
                let len = b.len() + s.div_ceil(8);
                let shifted = BigInt::from_bytes_be(Sign::Plus, &b) << s;
                Value::Bytes(to_fixed_be(&shifted, len))
            }
            (a, _) => return Err(expected(instr, "nat or bytes", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_lsr(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Nat(n), Value::Nat(s)) => Value::Nat(n >> shift_amount(instr, &s, MAX_INT_SHIFT)?),
            (Value::Bytes(b), Value::Nat(s)) => {
                // Any shift past the length clears everything.
                let s = s.to_usize().unwrap_or(usize::MAX);
                let len = b.len().saturating_sub(s / 8);
                let shifted = if s >= b.len() * 8 {
                    BigInt::zero()
                } else {
                    BigInt::from_bytes_be(Sign::Plus, &b) >> s
                };
                Value::Bytes(to_fixed_be(&shifted, len))
            }
            (a, _) => return Err(expected(instr, "nat or bytes", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_or(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a || b),
            (Value::Nat(a), Value::Nat(b)) => Value::Nat(a | b),
            (Value::Bytes(a), Value::Bytes(b)) => Value::Bytes(bytes_bitwise(&a, &b, true, |x, y| x | y)),
            (a, _) => return Err(expected(instr, "bool, nat or bytes", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    /// `int AND nat` works on the two's complement of the int.
    pub(super) fn op_and(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a && b),
            (Value::Nat(a) | Value::Int(a), Value::Nat(b)) => Value::Nat(a & b),
            (Value::Bytes(a), Value::Bytes(b)) => Value::Bytes(bytes_bitwise(&a, &b, false, |x, y| x & y)),
            (a, _) => return Err(expected(instr, "bool, int, nat or bytes", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_xor(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.pop2(instr)? {
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a ^ b),
            (Value::Nat(a), Value::Nat(b)) => Value::Nat(a ^ b),
            (Value::Bytes(a), Value::Bytes(b)) => Value::Bytes(bytes_bitwise(&a, &b, true, |x, y| x ^ y)),
            (a, _) => return Err(expected(instr, "bool, nat or bytes", &a)),
        };
        self.stack.push(result);
        Ok(())
    }

    pub(super) fn op_not(&mut self, instr: &'static str) -> Result<(), VMError> {
        let result = match self.stack.pop(instr)? {
            Value::Bool(b) => Value::Bool(!b),
            Value::Nat(n) | Value::Int(n) => Value::Int(-n - 1),
            Value::Bytes(b) => Value::Bytes(b.iter().map(|x| !x).collect()),
            other => return Err(expected(instr, "bool, int, nat or bytes", &other)),
        };
        self.stack.push(result);
        Ok(())
    }

    // ==================== Comparison ====================

    pub(super) fn op_compare(&mut self, instr: &'static str) -> Result<(), VMError> {
        let (a, b) = self.pop2(instr)?;
        self.stack.push(Value::int(compare(&a, &b) as i64));
        Ok(())
    }

    /// `EQ`, `NEQ`, `LT`, `GT`, `LE` and `GE` on the sign of an int.
    pub(super) fn op_test(&mut self, instr: &'static str, pred: impl Fn(i32) -> bool) -> Result<(), VMError> {
        let n = self.stack.pop_int(instr)?;
        let sign = match n.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        };
        self.stack.push(Value::Bool(pred(sign)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ediv_is_euclidean() {
        let d = |a: i64, b: i64| ediv(&BigInt::from(a), &BigInt::from(b)).map(|(q, r)| (q.to_i64(), r.to_i64()));
        assert_eq!(d(7, 2), Some((Some(3), Some(1))));
        assert_eq!(d(-7, 2), Some((Some(-4), Some(1))));
        assert_eq!(d(7, -2), Some((Some(-3), Some(1))));
        assert_eq!(d(-7, -2), Some((Some(4), Some(1))));
        assert_eq!(d(1, 0), None);
    }

    #[test]
    fn bytes_bitwise_alignment() {
        assert_eq!(bytes_bitwise(&[0x01, 0x00], &[0x0f], true, |x, y| x | y), vec![0x01, 0x0f]);
        assert_eq!(bytes_bitwise(&[0xff, 0x0f], &[0x03], false, |x, y| x & y), vec![0x03]);
    }

    #[test]
    fn fixed_width_padding() {
        assert_eq!(to_fixed_be(&BigInt::from(12), 2), vec![0x00, 0x0c]);
        assert_eq!(to_fixed_be(&BigInt::zero(), 1), vec![0x00]);
        assert!(to_fixed_be(&BigInt::from(3), 0).is_empty());
    }
}
