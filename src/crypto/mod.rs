//! Cryptographic primitives backing the crypto instructions.
//!
//! - [`hashing`]: the digests scripts can compute
//! - [`signature`]: ed25519, secp256k1 and p256 verification
//! - [`bls`]: BLS12-381 encodings, arithmetic and the pairing check
//!
//! Key hashing lives on [`PublicKey::hash`](crate::types::keys::PublicKey::hash)
//! and base58check on [`crate::types::base58`].

pub mod bls;
pub mod hashing;
pub mod signature;
