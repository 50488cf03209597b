//! BLS12-381 points and scalars.
//!
//! G1 and G2 points use the 96 and 192 byte uncompressed encodings; field
//! elements are 32 bytes little-endian and must be below the group order.
//! Integers converted to `bls12_381_fr` are reduced modulo the order.

use crate::virtual_machine::errors::VMError;
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar, pairing};
use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use std::sync::OnceLock;

pub const G1_LEN: usize = 96;
pub const G2_LEN: usize = 192;
pub const FR_LEN: usize = 32;

/// Order of the G1/G2 subgroups, big-endian.
const ORDER_HEX: &str = "73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001";

fn order() -> &'static BigInt {
    static ORDER: OnceLock<BigInt> = OnceLock::new();
    ORDER.get_or_init(|| {
        BigInt::parse_bytes(ORDER_HEX.as_bytes(), 16).unwrap_or_default()
    })
}

pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Affine, VMError> {
    let raw: &[u8; G1_LEN] = bytes
        .try_into()
        .map_err(|_| VMError::invalid_data(format!("G1 point must be {} bytes", G1_LEN)))?;
    Option::from(G1Affine::from_uncompressed(raw))
        .ok_or_else(|| VMError::invalid_data("invalid G1 point"))
}

pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine, VMError> {
    let raw: &[u8; G2_LEN] = bytes
        .try_into()
        .map_err(|_| VMError::invalid_data(format!("G2 point must be {} bytes", G2_LEN)))?;
    Option::from(G2Affine::from_uncompressed(raw))
        .ok_or_else(|| VMError::invalid_data("invalid G2 point"))
}

pub fn fr_from_bytes(bytes: &[u8]) -> Result<Scalar, VMError> {
    let raw: &[u8; FR_LEN] = bytes
        .try_into()
        .map_err(|_| VMError::invalid_data(format!("Fr element must be {} bytes", FR_LEN)))?;
    Option::from(Scalar::from_bytes(raw))
        .ok_or_else(|| VMError::invalid_data("Fr element not below the group order"))
}

pub fn g1_to_bytes(p: &G1Affine) -> Vec<u8> {
    p.to_uncompressed().to_vec()
}

pub fn g2_to_bytes(p: &G2Affine) -> Vec<u8> {
    p.to_uncompressed().to_vec()
}

pub fn fr_to_bytes(s: &Scalar) -> Vec<u8> {
    s.to_bytes().to_vec()
}

/// Reduces an integer modulo the group order.
pub fn fr_from_int(n: &BigInt) -> Scalar {
    let reduced = n.mod_floor(order());
    let (_, le) = reduced.to_bytes_le();
    let mut raw = [0u8; FR_LEN];
    raw[..le.len().min(FR_LEN)].copy_from_slice(&le[..le.len().min(FR_LEN)]);
    Option::from(Scalar::from_bytes(&raw)).unwrap_or(Scalar::zero())
}

/// Canonical representative in `[0, r)`.
pub fn fr_to_int(s: &Scalar) -> BigInt {
    BigInt::from_bytes_le(Sign::Plus, &s.to_bytes())
}

pub fn g1_add(a: &G1Affine, b: &G1Affine) -> G1Affine {
    G1Affine::from(G1Projective::from(a) + b)
}

pub fn g2_add(a: &G2Affine, b: &G2Affine) -> G2Affine {
    G2Affine::from(G2Projective::from(a) + b)
}

pub fn g1_mul(p: &G1Affine, s: &Scalar) -> G1Affine {
    G1Affine::from(p * s)
}

pub fn g2_mul(p: &G2Affine, s: &Scalar) -> G2Affine {
    G2Affine::from(p * s)
}

/// Whether the product of the pairings of all pairs is the identity.
///
/// Pairings are accumulated in input order; the empty product is the identity.
pub fn pairing_check(pairs: &[(G1Affine, G2Affine)]) -> bool {
    let mut acc = Gt::identity();
    for (g1, g2) in pairs {
        acc += pairing(g1, g2);
    }
    acc == Gt::identity()
}
