//! Public keys, key hashes, signatures and chain identifiers.
//!
//! Binary layouts follow the chain format: key hashes and public keys carry
//! a one-byte curve tag (0 = ed25519, 1 = secp256k1, 2 = p256), signatures are
//! 64 raw bytes and chain ids are 4 raw bytes.

use crate::types::base58::{self, Base58Error, Prefix};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes};
use crate::types::hash::blake2b_160;
use michelson_derive::BinaryCodec;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Signature scheme of a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Curve {
    Ed25519,
    Secp256k1,
    P256,
}

/// BLAKE2b-160 digest of a public key, tagged with its curve.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub enum KeyHash {
    Ed25519([u8; 20]) = 0,
    Secp256k1([u8; 20]) = 1,
    P256([u8; 20]) = 2,
}

impl KeyHash {
    pub fn curve(&self) -> Curve {
        match self {
            KeyHash::Ed25519(_) => Curve::Ed25519,
            KeyHash::Secp256k1(_) => Curve::Secp256k1,
            KeyHash::P256(_) => Curve::P256,
        }
    }

    pub fn digest(&self) -> &[u8; 20] {
        match self {
            KeyHash::Ed25519(h) | KeyHash::Secp256k1(h) | KeyHash::P256(h) => h,
        }
    }

    fn prefix(&self) -> &'static Prefix {
        match self {
            KeyHash::Ed25519(_) => &base58::MV1,
            KeyHash::Secp256k1(_) => &base58::MV2,
            KeyHash::P256(_) => &base58::MV3,
        }
    }

    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        let (prefix, payload) = base58::decode_any(&[base58::MV1, base58::MV2, base58::MV3], text)?;
        let digest = to_array(&payload);
        Ok(match prefix.tag {
            "mv1" => KeyHash::Ed25519(digest),
            "mv2" => KeyHash::Secp256k1(digest),
            _ => KeyHash::P256(digest),
        })
    }

    pub fn to_base58(&self) -> String {
        base58::encode(self.prefix(), self.digest())
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for KeyHash {
    type Err = Base58Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyHash::from_base58(s)
    }
}

/// Public key of one of the supported curves.
///
/// secp256k1 and p256 keys are stored SEC1-compressed (33 bytes).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub enum PublicKey {
    Ed25519([u8; 32]) = 0,
    Secp256k1([u8; 33]) = 1,
    P256([u8; 33]) = 2,
}

impl PublicKey {
    pub fn curve(&self) -> Curve {
        match self {
            PublicKey::Ed25519(_) => Curve::Ed25519,
            PublicKey::Secp256k1(_) => Curve::Secp256k1,
            PublicKey::P256(_) => Curve::P256,
        }
    }

    /// Raw key bytes without the curve tag.
    pub fn raw(&self) -> &[u8] {
        match self {
            PublicKey::Ed25519(k) => k,
            PublicKey::Secp256k1(k) | PublicKey::P256(k) => k,
        }
    }

    /// BLAKE2b-160 of the raw key, tagged with the key's curve.
    pub fn hash(&self) -> KeyHash {
        let digest = blake2b_160(self.raw());
        match self {
            PublicKey::Ed25519(_) => KeyHash::Ed25519(digest),
            PublicKey::Secp256k1(_) => KeyHash::Secp256k1(digest),
            PublicKey::P256(_) => KeyHash::P256(digest),
        }
    }

    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        let (prefix, payload) =
            base58::decode_any(&[base58::EDPK, base58::SPPK, base58::P2PK], text)?;
        Ok(match prefix.tag {
            "edpk" => PublicKey::Ed25519(to_array(&payload)),
            "sppk" => PublicKey::Secp256k1(to_array(&payload)),
            _ => PublicKey::P256(to_array(&payload)),
        })
    }

    pub fn to_base58(&self) -> String {
        let prefix = match self {
            PublicKey::Ed25519(_) => &base58::EDPK,
            PublicKey::Secp256k1(_) => &base58::SPPK,
            PublicKey::P256(_) => &base58::P2PK,
        };
        base58::encode(prefix, self.raw())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for PublicKey {
    type Err = Base58Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PublicKey::from_base58(s)
    }
}

/// Text flavour a signature was written in.
///
/// The binary form does not record it, so decoded signatures are `Generic`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    Ed25519,
    Secp256k1,
    P256,
    Generic,
}

/// 64-byte signature. Equality and ordering only look at the bytes.
#[derive(Clone, Copy, Debug)]
pub struct Signature {
    pub kind: SignatureKind,
    pub bytes: [u8; 64],
}

impl Signature {
    pub fn generic(bytes: [u8; 64]) -> Self {
        Self {
            kind: SignatureKind::Generic,
            bytes,
        }
    }

    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        let (prefix, payload) = base58::decode_any(
            &[base58::EDSIG, base58::SPSIG, base58::P2SIG, base58::SIG],
            text,
        )?;
        let kind = match prefix.tag {
            "edsig" => SignatureKind::Ed25519,
            "spsig1" => SignatureKind::Secp256k1,
            "p2sig" => SignatureKind::P256,
            _ => SignatureKind::Generic,
        };
        Ok(Self {
            kind,
            bytes: to_array(&payload),
        })
    }

    pub fn to_base58(&self) -> String {
        let prefix = match self.kind {
            SignatureKind::Ed25519 => &base58::EDSIG,
            SignatureKind::Secp256k1 => &base58::SPSIG,
            SignatureKind::P256 => &base58::P2SIG,
            SignatureKind::Generic => &base58::SIG,
        };
        base58::encode(prefix, &self.bytes)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Signature {}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl std::hash::Hash for Signature {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl Encode for Signature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&self.bytes);
    }
}

impl Decode for Signature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Signature::generic(to_array(read_bytes(input, 64)?)))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

/// Four-byte chain identifier (`Net...`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        Ok(ChainId(to_array(&base58::decode(&base58::CHAIN_ID, text)?)))
    }

    pub fn to_base58(&self) -> String {
        base58::encode(&base58::CHAIN_ID, &self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

/// Copies a slice whose length was already checked into a fixed array.
pub(crate) fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}
