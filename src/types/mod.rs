//! Chain domain types and their canonical encodings.
//!
//! - `encoding`: big-endian `Encode`/`Decode` framework and variable-length integers
//! - `base58`: base58check text forms with the chain's prefixes
//! - `hash`: BLAKE2b digests
//! - `keys`: public keys, key hashes, signatures, chain ids
//! - `address`: implicit, originated and rollup addresses

pub mod address;
pub mod base58;
pub mod encoding;
pub mod hash;
pub mod keys;
