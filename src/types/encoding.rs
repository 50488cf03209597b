//! Binary encoding and decoding traits for the chain's canonical format.
//!
//! Everything Micheline, PACK and the domain types serialize to goes through
//! [`Encode`] and [`Decode`].
//!
//! # Binary Format
//!
//! - Fixed-width integers: big-endian
//! - `bool`: single byte (`0x00` = false, `0xff` = true)
//! - `Option<T>`: presence byte (`0x00` / `0xff`) followed by the value
//! - Arrays `[T; N]`: elements back to back, no length prefix
//! - dynamic fields ([`write_dynamic`]): 4-byte big-endian byte length, then the raw bytes
//! - [`Zarith`]: sign-and-continuation-bit variable-length integers

use michelson_derive::Error;
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

/// Sink for writing encoded bytes.
///
/// Implemented by byte buffers, size counters and hashers so values can be
/// encoded straight into their destination.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

/// Counter for computing the encoded size without allocating.
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self { len: 0 }
    }

    /// Returns the total number of bytes counted.
    pub fn len(&self) -> usize {
        self.len
    }
}

impl Default for SizeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Types that can be serialized to the canonical binary format.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Returns the encoded size in bytes.
    fn encoded_len(&self) -> usize {
        let mut counter = SizeCounter::new();
        self.encode(&mut counter);
        counter.len()
    }

    /// Serializes to a new buffer with exact capacity.
    ///
    /// Performs two passes: first to count bytes, then to encode.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input ended before expected data was read.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// Data does not represent a valid value for the target type.
    #[error("invalid value")]
    InvalidValue,
    /// Length prefix exceeds the remaining input.
    #[error("length prefix {declared} exceeds the {remaining} remaining bytes")]
    LengthOverflow { declared: usize, remaining: usize },
    /// Variant tag byte is not part of the format.
    #[error("unknown tag 0x{0:02x}")]
    UnknownTag(u8),
    /// Primitive code has no entry in the primitive table.
    #[error("unknown primitive code {0}")]
    UnknownPrimitiveCode(u8),
    /// Encoding is valid but not the canonical one.
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),
    /// Tree nested deeper than the accepted limit.
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    /// Bytes remain after the value was fully decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

/// Types that can be deserialized from the canonical binary format.
pub trait Decode: Sized {
    /// Reads and decodes a value, advancing the input slice past it.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;

    /// Decodes a value from a byte slice, requiring all bytes to be consumed.
    fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut input = data;
        let value = Self::decode(&mut input)?;

        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }

        Ok(value)
    }
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof);
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

/// Consumes `n` padding bytes, all of which must be zero.
pub fn read_padding(input: &mut &[u8], n: usize) -> Result<(), DecodeError> {
    if read_bytes(input, n)?.iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidValue);
    }
    Ok(())
}

/// Reads a 4-byte length prefix and returns the framed slice.
pub fn read_dynamic<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let declared = u32::decode(input)? as usize;
    if declared > input.len() {
        return Err(DecodeError::LengthOverflow {
            declared,
            remaining: input.len(),
        });
    }
    read_bytes(input, declared)
}

/// Writes `bytes` behind a 4-byte big-endian length prefix.
pub fn write_dynamic<S: EncodeSink>(out: &mut S, bytes: &[u8]) {
    (bytes.len() as u32).encode(out);
    out.write(bytes);
}

impl Encode for u8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[*self]);
    }
}

impl Decode for u8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(read_bytes(input, 1)?[0])
    }
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_be_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(read_bytes(input, std::mem::size_of::<$t>())?);
                    Ok(<$t>::from_be_bytes(buf))
                }
            }
        )*
    };
}

impl_int!(u16, u32, u64, i16, i32, i64);

impl Encode for bool {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(&[if *self { 0xff } else { 0x00 }]);
    }
}

impl Decode for bool {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u8::decode(input)? {
            0x00 => Ok(false),
            0xff => Ok(true),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            None => false.encode(out),
            Some(v) => {
                true.encode(out);
                v.encode(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        if bool::decode(input)? {
            Ok(Some(T::decode(input)?))
        } else {
            Ok(None)
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        for item in self {
            item.encode(out);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let mut vec = Vec::with_capacity(N);
        for _ in 0..N {
            vec.push(T::decode(input)?);
        }
        vec.try_into().map_err(|_| DecodeError::InvalidValue)
    }
}

/// Arbitrary-precision integer in the sign-and-continuation-bit encoding.
///
/// The first byte carries the continuation bit (0x80), the sign bit (0x40)
/// and the six lowest bits of the magnitude; every following byte carries a
/// continuation bit and seven more bits, least significant group first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zarith(pub BigInt);

impl Encode for Zarith {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let negative = self.0.sign() == Sign::Minus;
        let mut magnitude = self.0.magnitude().clone();

        let low = (magnitude.iter_u32_digits().next().unwrap_or(0) & 0x3f) as u8;
        magnitude >>= 6u32;
        let mut byte = low | if negative { 0x40 } else { 0x00 };
        if !magnitude.is_zero() {
            byte |= 0x80;
        }
        out.write(&[byte]);

        while !magnitude.is_zero() {
            let mut byte = (magnitude.iter_u32_digits().next().unwrap_or(0) & 0x7f) as u8;
            magnitude >>= 7u32;
            if !magnitude.is_zero() {
                byte |= 0x80;
            }
            out.write(&[byte]);
        }
    }
}

impl Decode for Zarith {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let first = u8::decode(input)?;
        let negative = first & 0x40 != 0;
        let mut magnitude = BigInt::from(first & 0x3f);
        let mut shift = 6u32;
        let mut more = first & 0x80 != 0;

        while more {
            let byte = u8::decode(input)?;
            more = byte & 0x80 != 0;
            if byte == 0 && !more {
                return Err(DecodeError::NonCanonical("trailing zero group in integer"));
            }
            magnitude += BigInt::from(byte & 0x7f) << shift;
            shift += 7;
        }

        if negative && magnitude.is_zero() {
            return Err(DecodeError::NonCanonical("negative zero"));
        }

        Ok(Zarith(if negative { -magnitude } else { magnitude }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zarith_hex(n: i64) -> String {
        Zarith(BigInt::from(n))
            .to_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    #[test]
    fn size_counter_accumulates() {
        let mut counter = SizeCounter::new();
        counter.write(&[1, 2, 3]);
        counter.write(&[4, 5]);
        assert_eq!(counter.len(), 5);
    }

    #[test]
    fn to_bytes_preallocates_exact_capacity() {
        let bytes = [0xdead_beefu32, 7].to_bytes();
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 7]);
        assert_eq!(bytes.capacity(), bytes.len());
    }

    #[test]
    fn u32_big_endian() {
        let bytes = 0x12345678u32.to_bytes();
        assert_eq!(bytes, vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(u32::from_bytes(&bytes).unwrap(), 0x12345678);
    }

    #[test]
    fn bool_uses_ff_for_true() {
        assert_eq!(true.to_bytes(), vec![0xff]);
        assert_eq!(false.to_bytes(), vec![0x00]);
        assert_eq!(bool::from_bytes(&[0x01]), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn option_presence_byte() {
        assert_eq!(Some(7u8).to_bytes(), vec![0xff, 7]);
        assert_eq!(None::<u8>.to_bytes(), vec![0x00]);
        assert_eq!(Option::<u8>::from_bytes(&[0xff, 9]).unwrap(), Some(9));
    }

    #[test]
    fn zarith_known_vectors() {
        assert_eq!(zarith_hex(0), "00");
        assert_eq!(zarith_hex(1), "01");
        assert_eq!(zarith_hex(-1), "41");
        assert_eq!(zarith_hex(63), "3f");
        assert_eq!(zarith_hex(64), "8001");
        assert_eq!(zarith_hex(-64), "c001");
        assert_eq!(zarith_hex(1000), "a80f");
    }

    #[test]
    fn zarith_decodes_large_values() {
        let big = BigInt::parse_bytes(b"123456789012345678901234567890", 10).unwrap();
        let bytes = Zarith(big.clone()).to_bytes();
        assert_eq!(Zarith::from_bytes(&bytes).unwrap().0, big);
        assert_eq!(Zarith::from_bytes(&Zarith(-big.clone()).to_bytes()).unwrap().0, -big);
    }

    #[test]
    fn zarith_rejects_trailing_zero_group() {
        assert_eq!(
            Zarith::from_bytes(&[0x81, 0x00]),
            Err(DecodeError::NonCanonical("trailing zero group in integer"))
        );
    }

    #[test]
    fn zarith_truncated() {
        assert_eq!(Zarith::from_bytes(&[0x80]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn dynamic_length_exceeding_input() {
        assert_eq!(
            read_dynamic(&mut &[0u8, 0, 0, 9, 1][..]),
            Err(DecodeError::LengthOverflow {
                declared: 9,
                remaining: 1
            })
        );
    }

    #[test]
    fn padding_must_be_zero() {
        let mut input: &[u8] = &[0, 1];
        assert!(read_padding(&mut input, 1).is_ok());
        assert_eq!(read_padding(&mut input, 1), Err(DecodeError::InvalidValue));
    }

    #[test]
    fn trailing_bytes_rejected() {
        assert_eq!(u8::from_bytes(&[1, 2]), Err(DecodeError::TrailingBytes(1)));
    }
}
