//! Digests exposed to scripts through `BLAKE2B`, `SHA256`, `SHA512`, `SHA3` and `KECCAK`.

use crate::types::hash::Hash;
use sha2::{Sha256, Sha512};
use sha3::{Digest, Keccak256, Sha3_256};

pub fn blake2b_256(data: &[u8]) -> Vec<u8> {
    Hash::digest(data).0.to_vec()
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

pub fn sha3_256(data: &[u8]) -> Vec<u8> {
    Sha3_256::digest(data).to_vec()
}

pub fn keccak_256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}
