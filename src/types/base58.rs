//! Base58check encodings with the chain's versioned prefixes.
//!
//! Every textual hash, key, address and signature is
//! `base58(prefix ++ payload ++ checksum)` where the checksum is the first
//! four bytes of a double SHA-256. The prefix bytes are chosen so the text
//! starts with a readable tag (`mv1`, `KT1`, `edpk`, `expr`, ...).

use michelson_derive::Error;

/// A versioned base58check prefix together with its payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prefix {
    /// Readable tag the encoded text starts with.
    pub tag: &'static str,
    /// Raw version bytes prepended to the payload.
    pub bytes: &'static [u8],
    /// Expected payload length in bytes.
    pub payload_len: usize,
}

macro_rules! prefixes {
    ($($name:ident = $tag:literal, [$($b:literal),+], $len:literal;)*) => {
        $(
            pub const $name: Prefix = Prefix {
                tag: $tag,
                bytes: &[$($b),+],
                payload_len: $len,
            };
        )*
    };
}

prefixes! {
    MV1 = "mv1", [5, 186, 196], 20;
    MV2 = "mv2", [5, 186, 199], 20;
    MV3 = "mv3", [5, 186, 201], 20;
    MV4 = "mv4", [5, 186, 204], 20;
    KT1 = "KT1", [2, 90, 121], 20;
    TXR1 = "txr1", [1, 128, 120, 31], 20;
    SR1 = "sr1", [6, 124, 117], 20;
    EDPK = "edpk", [13, 15, 37, 217], 32;
    SPPK = "sppk", [3, 254, 226, 86], 33;
    P2PK = "p2pk", [3, 178, 139, 127], 33;
    EDSIG = "edsig", [9, 245, 205, 134, 18], 64;
    SPSIG = "spsig1", [13, 115, 101, 19, 63], 64;
    P2SIG = "p2sig", [54, 240, 44, 52], 64;
    SIG = "sig", [4, 130, 43], 64;
    CHAIN_ID = "Net", [87, 82, 0], 4;
    EXPR = "expr", [13, 44, 64, 27], 32;
}

/// Errors produced while decoding base58check text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Base58Error {
    #[error("invalid base58check string: {0}")]
    InvalidEncoding(String),
    #[error("expected a `{expected}` prefixed value")]
    WrongPrefix { expected: &'static str },
    #[error("`{tag}` payload must be {expected} bytes, got {actual}")]
    WrongLength {
        tag: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Encodes `payload` with `prefix` as base58check.
pub fn encode(prefix: &Prefix, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(prefix.bytes.len() + payload.len());
    data.extend_from_slice(prefix.bytes);
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

/// Decodes base58check `text`, checking the prefix and payload length.
pub fn decode(prefix: &Prefix, text: &str) -> Result<Vec<u8>, Base58Error> {
    if !text.starts_with(prefix.tag) {
        return Err(Base58Error::WrongPrefix {
            expected: prefix.tag,
        });
    }
    let data = bs58::decode(text)
        .with_check(None)
        .into_vec()
        .map_err(|e| Base58Error::InvalidEncoding(e.to_string()))?;
    let Some(payload) = data.strip_prefix(prefix.bytes) else {
        return Err(Base58Error::WrongPrefix {
            expected: prefix.tag,
        });
    };
    if payload.len() != prefix.payload_len {
        return Err(Base58Error::WrongLength {
            tag: prefix.tag,
            expected: prefix.payload_len,
            actual: payload.len(),
        });
    }
    Ok(payload.to_vec())
}

/// Decodes `text` against the first prefix whose tag it starts with.
///
/// Candidates are tried in order, so longer tags sharing a head with a
/// shorter one (`spsig1` vs `sig`) must come first.
pub fn decode_any(
    candidates: &[Prefix],
    text: &str,
) -> Result<(Prefix, Vec<u8>), Base58Error> {
    for prefix in candidates {
        if text.starts_with(prefix.tag) {
            return decode(prefix, text).map(|payload| (*prefix, payload));
        }
    }
    Err(Base58Error::InvalidEncoding(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn implicit_account_of_zero_hash() {
        assert_eq!(encode(&MV1, &[0u8; 20]), "mv181VziBavwKZ5dqT5NJNj8BekysbEwEfHN");
        assert_eq!(encode(&KT1, &[0u8; 20]), "KT18amZmM5W7qDWVt2pH6uj7sCEd3kbzLrHT");
    }

    #[test]
    fn decode_known_addresses() {
        assert_eq!(
            decode(&MV1, "mv1ShDp4Q4aFEcFwyhPkr7YZ8nd6cNbxntvN").unwrap(),
            hex("ccf564a5a0bdb15c3dbdf84d68dacac3e1f968a3")
        );
        assert_eq!(
            decode(&KT1, "KT1ExvG3EjTrvDcAU7EqLNb77agPa5u6KvnY").unwrap(),
            hex("460129df55206fbe21eaefc8979a1f2066df10ac")
        );
    }

    #[test]
    fn chain_id_text() {
        assert_eq!(encode(&CHAIN_ID, &hex("7a06a770")), "NetXdQprcVkpaWU");
        assert_eq!(decode(&CHAIN_ID, "NetXdQprcVkpaWU").unwrap(), hex("7a06a770"));
    }

    #[test]
    fn wrong_prefix_rejected() {
        let kt1 = encode(&KT1, &[1u8; 20]);
        assert_eq!(
            decode(&MV1, &kt1),
            Err(Base58Error::WrongPrefix { expected: "mv1" })
        );
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let mut text = encode(&MV1, &[11u8; 20]);
        let last = text.pop().unwrap();
        text.push(if last == 'a' { 'b' } else { 'a' });
        assert!(matches!(decode(&MV1, &text), Err(Base58Error::InvalidEncoding(_))));
    }

    #[test]
    fn decode_any_picks_matching_prefix() {
        let text = encode(&MV3, &[7u8; 20]);
        let (prefix, payload) = decode_any(&[MV1, MV2, MV3], &text).unwrap();
        assert_eq!(prefix, MV3);
        assert_eq!(payload, vec![7u8; 20]);
    }
}
