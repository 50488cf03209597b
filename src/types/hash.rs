//! 32-byte BLAKE2b-256 hash type used for expression hashes and signing.

use crate::types::base58;
use crate::types::encoding::EncodeSink;
use blake2::Blake2b;
use blake2::digest::Digest;
use blake2::digest::consts::{U20, U32};
use michelson_derive::BinaryCodec;
use std::fmt;

/// BLAKE2b-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Length of the BLAKE2b-160 digests that identify keys and contracts.
pub const SHORT_HASH_LEN: usize = 20;

type Blake2b256 = Blake2b<U32>;
type Blake2b160 = Blake2b<U20>;

/// Fixed-size 32-byte BLAKE2b digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a BLAKE2b-256 builder for incremental hashing.
    pub fn blake2b() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hashes `data` in one call.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = HashBuilder::new();
        h.update(data);
        h.finalize()
    }

    /// `expr...` text of this hash, as used for big map key hashes.
    pub fn to_expr(&self) -> String {
        base58::encode(&base58::EXPR, &self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental BLAKE2b-256 hash builder.
///
/// Implements [`EncodeSink`] so encodable values can be hashed directly
/// without an intermediate byte buffer.
pub struct HashBuilder {
    hasher: Blake2b256,
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Blake2b256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// BLAKE2b-160 of `data`: the digest behind key hashes and contract hashes.
pub fn blake2b_160(data: &[u8]) -> [u8; SHORT_HASH_LEN] {
    Blake2b160::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Encode;

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            Hash::digest(b"").to_string(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn builder_matches_one_shot() {
        let mut h = Hash::blake2b();
        h.update(b"mich");
        h.update(b"elson");
        assert_eq!(h.finalize(), Hash::digest(b"michelson"));
    }

    #[test]
    fn encode_into_builder() {
        let mut h = Hash::blake2b();
        0x0102u16.encode(&mut h);
        assert_eq!(h.finalize(), Hash::digest(&[1, 2]));
    }

    #[test]
    fn expr_hash_of_packed_one() {
        assert_eq!(
            Hash::digest(&[0x05, 0x00, 0x01]).to_expr(),
            "expru2dKqDfZG8hu4wNGkiyunvq2hdSKuVYtcKta7BWP6Q18oNxKjS"
        );
    }

    #[test]
    fn zero_hash() {
        assert!(Hash::zero().as_slice().iter().all(|&b| b == 0));
    }
}
