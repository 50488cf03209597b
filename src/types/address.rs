//! Account and contract addresses.
//!
//! An [`Address`] is either an implicit account (the hash of a public key),
//! an originated contract (`KT1`) or a rollup. In the binary format the
//! 20-byte contract and rollup hashes are followed by one padding byte so
//! every address is 22 bytes long.

use crate::types::base58::{self, Base58Error};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::types::keys::{KeyHash, to_array};
use michelson_derive::BinaryCodec;
use std::fmt;
use std::str::FromStr;

/// Name of the entrypoint every contract accepts.
pub const DEFAULT_ENTRYPOINT: &str = "default";

/// Maximum length of an entrypoint name.
pub const MAX_ENTRYPOINT_LEN: usize = 31;

/// 20-byte hash identifying an originated contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct ContractHash(pub [u8; 20]);

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub enum Address {
    Implicit(KeyHash) = 0,
    #[binary_codec(padding = 1)]
    Originated(ContractHash) = 1,
    #[binary_codec(padding = 1)]
    TxRollup([u8; 20]) = 2,
    #[binary_codec(padding = 1)]
    SmartRollup([u8; 20]) = 3,
}

impl Address {
    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        if text.starts_with("mv") {
            return Ok(Address::Implicit(KeyHash::from_base58(text)?));
        }
        let (prefix, payload) =
            base58::decode_any(&[base58::KT1, base58::TXR1, base58::SR1], text)?;
        let hash = to_array(&payload);
        Ok(match prefix.tag {
            "KT1" => Address::Originated(ContractHash(hash)),
            "txr1" => Address::TxRollup(hash),
            _ => Address::SmartRollup(hash),
        })
    }

    pub fn to_base58(&self) -> String {
        match self {
            Address::Implicit(kh) => kh.to_base58(),
            Address::Originated(ContractHash(h)) => base58::encode(&base58::KT1, h),
            Address::TxRollup(h) => base58::encode(&base58::TXR1, h),
            Address::SmartRollup(h) => base58::encode(&base58::SR1, h),
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, Address::Implicit(_))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for Address {
    type Err = Base58Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_base58(s)
    }
}

/// An address together with an optional entrypoint (`KT1...%name`).
///
/// `None` and `Some("default")` denote the same destination; the binary
/// form omits the default entrypoint and appends any other name as raw
/// bytes after the 22-byte address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Destination {
    pub address: Address,
    pub entrypoint: Option<String>,
}

impl Destination {
    pub fn new(address: Address, entrypoint: Option<String>) -> Self {
        let entrypoint = entrypoint.filter(|e| e != DEFAULT_ENTRYPOINT && !e.is_empty());
        Self {
            address,
            entrypoint,
        }
    }

    /// Parses `address` or `address%entrypoint`.
    pub fn parse(text: &str) -> Result<Self, Base58Error> {
        match text.split_once('%') {
            Some((addr, entrypoint)) => Ok(Self::new(
                Address::from_base58(addr)?,
                Some(entrypoint.to_string()),
            )),
            None => Ok(Self::new(Address::from_base58(text)?, None)),
        }
    }

    pub fn entrypoint_or_default(&self) -> &str {
        self.entrypoint.as_deref().unwrap_or(DEFAULT_ENTRYPOINT)
    }
}

impl From<Address> for Destination {
    fn from(address: Address) -> Self {
        Self {
            address,
            entrypoint: None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(entrypoint) = &self.entrypoint {
            write!(f, "%{}", entrypoint)?;
        }
        Ok(())
    }
}

impl Encode for Destination {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.address.encode(out);
        if let Some(entrypoint) = &self.entrypoint {
            out.write(entrypoint.as_bytes());
        }
    }
}

impl Decode for Destination {
    /// Consumes the rest of the input as the entrypoint name.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let address = Address::decode(input)?;
        let rest = std::mem::take(input);
        if rest.len() > MAX_ENTRYPOINT_LEN {
            return Err(DecodeError::InvalidValue);
        }
        let entrypoint = if rest.is_empty() {
            None
        } else {
            Some(String::from_utf8(rest.to_vec()).map_err(|_| DecodeError::InvalidValue)?)
        };
        if entrypoint.as_deref() == Some(DEFAULT_ENTRYPOINT) {
            return Err(DecodeError::NonCanonical("explicit default entrypoint"));
        }
        Ok(Self {
            address,
            entrypoint,
        })
    }
}

/// Layer-2 rollup address (`mv4...`), the hash of a BLS key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BinaryCodec)]
pub struct L2Address(pub [u8; 20]);

impl L2Address {
    pub fn from_base58(text: &str) -> Result<Self, Base58Error> {
        Ok(L2Address(to_array(&base58::decode(&base58::MV4, text)?)))
    }

    pub fn to_base58(&self) -> String {
        base58::encode(&base58::MV4, &self.0)
    }
}

impl fmt::Display for L2Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::hex;

    #[test]
    fn originated_address_has_padding() {
        let addr = Address::from_base58("KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY").unwrap();
        let bytes = addr.to_bytes();
        let mut expected = vec![1u8];
        expected.extend(hex("460129df55206fbe21eaefc8979a1f2066df10ac"));
        expected.push(0);
        assert_eq!(bytes, expected);
        assert_eq!(Address::from_bytes(&bytes).unwrap(), addr);
    }

    #[test]
    fn implicit_address_layout() {
        let addr = Address::from_base58("mv1ShDp4Q4aFEcFwyhPkr7YZ8nd6cNbxntvN").unwrap();
        let bytes = addr.to_bytes();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..2], &[0, 0]);
        assert_eq!(addr.to_base58(), "mv1ShDp4Q4aFEcFwyhPkr7YZ8nd6cNbxntvN");
    }

    #[test]
    fn nonzero_padding_rejected() {
        let mut bytes = vec![1u8];
        bytes.extend([0u8; 20]);
        bytes.push(1);
        assert_eq!(Address::from_bytes(&bytes), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn destination_with_entrypoint() {
        let dest = Destination::parse("KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY%transfer").unwrap();
        assert_eq!(dest.entrypoint.as_deref(), Some("transfer"));
        let bytes = dest.to_bytes();
        assert_eq!(&bytes[22..], b"transfer");
        assert_eq!(Destination::from_bytes(&bytes).unwrap(), dest);
        assert_eq!(dest.to_string(), "KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY%transfer");
    }

    #[test]
    fn default_entrypoint_is_dropped() {
        let dest = Destination::parse("KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY%default").unwrap();
        assert_eq!(dest.entrypoint, None);
        assert_eq!(dest.to_bytes().len(), 22);
    }

    #[test]
    fn rollup_addresses_round_trip() {
        let txr = Address::TxRollup([3u8; 20]);
        assert!(txr.to_base58().starts_with("txr1"));
        assert_eq!(Address::from_base58(&txr.to_base58()).unwrap(), txr);
        let sr = Address::SmartRollup([4u8; 20]);
        assert!(sr.to_base58().starts_with("sr1"));
        assert_eq!(Address::from_bytes(&sr.to_bytes()).unwrap(), sr);
    }
}
