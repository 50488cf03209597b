//! Canonical binary encoding of Micheline trees.
//!
//! # Tags
//!
//! | tag  | node                                              |
//! |------|---------------------------------------------------|
//! | 0x00 | integer                                           |
//! | 0x01 | string                                            |
//! | 0x02 | sequence                                          |
//! | 0x03 | primitive, no arguments, no annotations           |
//! | 0x04 | primitive, no arguments, annotations              |
//! | 0x05 | primitive, one argument, no annotations           |
//! | 0x06 | primitive, one argument, annotations              |
//! | 0x07 | primitive, two arguments, no annotations          |
//! | 0x08 | primitive, two arguments, annotations             |
//! | 0x09 | primitive, any other arity, annotations always    |
//! | 0x0A | bytes                                             |
//!
//! Strings, bytes, sequences, the argument list of `0x09` and annotations
//! carry a 4-byte big-endian length prefix. Annotations are joined with a
//! single space.

use crate::micheline::MAX_NESTING;
use crate::micheline::node::Node;
use crate::types::encoding::{
    Decode, DecodeError, Encode, EncodeSink, Zarith, read_dynamic, write_dynamic,
};
use crate::types::hash::Hash;
use crate::utils;
use crate::virtual_machine::isa::Prim;

const TAG_INT: u8 = 0x00;
const TAG_STRING: u8 = 0x01;
const TAG_SEQ: u8 = 0x02;
const TAG_PRIM: u8 = 0x03;
const TAG_PRIM_GENERIC: u8 = 0x09;
const TAG_BYTES: u8 = 0x0A;

/// Leading byte of packed data.
pub const PACK_PREFIX: u8 = 0x05;

fn join_annots(annots: &[String]) -> String {
    annots.join(" ")
}

impl Encode for Node {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        utils::stack::grow(|| encode_node(self, out))
    }
}

fn encode_node<S: EncodeSink>(node: &Node, out: &mut S) {
    match node {
        Node::Int(i) => {
            TAG_INT.encode(out);
            Zarith(i.clone()).encode(out);
        }
        Node::String(s) => {
            TAG_STRING.encode(out);
            write_dynamic(out, s.as_bytes());
        }
        Node::Bytes(b) => {
            TAG_BYTES.encode(out);
            write_dynamic(out, b);
        }
        Node::Seq(items) => {
            TAG_SEQ.encode(out);
            let mut body = Vec::new();
            for item in items {
                item.encode(&mut body);
            }
            write_dynamic(out, &body);
        }
        Node::Prim { prim, args, annots } => {
            let has_annots = !annots.is_empty();
            if args.len() <= 2 {
                let tag = TAG_PRIM + 2 * args.len() as u8 + u8::from(has_annots);
                tag.encode(out);
                prim.code().encode(out);
                for arg in args {
                    arg.encode(out);
                }
                if has_annots {
                    write_dynamic(out, join_annots(annots).as_bytes());
                }
            } else {
                TAG_PRIM_GENERIC.encode(out);
                prim.code().encode(out);
                let mut body = Vec::new();
                for arg in args {
                    arg.encode(&mut body);
                }
                write_dynamic(out, &body);
                write_dynamic(out, join_annots(annots).as_bytes());
            }
        }
    }
}

fn decode_annots(input: &mut &[u8]) -> Result<Vec<String>, DecodeError> {
    let raw = read_dynamic(input)?;
    let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidValue)?;
    Ok(text.split(' ').filter(|a| !a.is_empty()).map(str::to_string).collect())
}

fn decode_list(mut body: &[u8], depth: usize) -> Result<Vec<Node>, DecodeError> {
    let mut items = Vec::new();
    while !body.is_empty() {
        items.push(decode_node(&mut body, depth)?);
    }
    Ok(items)
}

/// `depth` counts the node's sequence and primitive ancestors, the measure
/// of [`Node::depth`].
fn decode_node(input: &mut &[u8], depth: usize) -> Result<Node, DecodeError> {
    if depth > MAX_NESTING {
        return Err(DecodeError::NestingTooDeep(MAX_NESTING));
    }
    utils::stack::grow(|| decode_tagged(input, depth))
}

fn decode_tagged(input: &mut &[u8], depth: usize) -> Result<Node, DecodeError> {
    let tag = u8::decode(input)?;
    match tag {
        TAG_INT => Ok(Node::Int(Zarith::decode(input)?.0)),
        TAG_STRING => {
            let raw = read_dynamic(input)?;
            let s = String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidValue)?;
            Ok(Node::String(s))
        }
        TAG_BYTES => Ok(Node::Bytes(read_dynamic(input)?.to_vec())),
        TAG_SEQ => Ok(Node::Seq(decode_list(read_dynamic(input)?, depth + 1)?)),
        0x03..=0x08 => {
            let arity = ((tag - TAG_PRIM) / 2) as usize;
            let has_annots = (tag - TAG_PRIM) % 2 == 1;
            let prim = Prim::try_from(u8::decode(input)?)?;
            let mut args = Vec::with_capacity(arity);
            for _ in 0..arity {
                args.push(decode_node(input, depth + 1)?);
            }
            let annots = if has_annots {
                let annots = decode_annots(input)?;
                if annots.is_empty() {
                    return Err(DecodeError::NonCanonical("empty annotation block"));
                }
                annots
            } else {
                Vec::new()
            };
            Ok(Node::Prim { prim, args, annots })
        }
        TAG_PRIM_GENERIC => {
            let prim = Prim::try_from(u8::decode(input)?)?;
            let args = decode_list(read_dynamic(input)?, depth + 1)?;
            let annots = decode_annots(input)?;
            Ok(Node::Prim { prim, args, annots })
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

impl Decode for Node {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        decode_node(input, 0)
    }
}

/// Encodes a node to the canonical binary format.
pub fn encode_binary(node: &Node) -> Vec<u8> {
    node.to_bytes()
}

/// Decodes a single node, rejecting trailing bytes.
pub fn decode_binary(bytes: &[u8]) -> Result<Node, DecodeError> {
    Node::from_bytes(bytes)
}

/// `0x05`-prefixed binary of a data node.
pub fn pack_node(node: &Node) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + node.encoded_len());
    out.push(PACK_PREFIX);
    node.encode(&mut out);
    out
}

/// Decodes packed bytes back into a node.
pub fn unpack_node(bytes: &[u8]) -> Result<Node, DecodeError> {
    match bytes.split_first() {
        Some((&PACK_PREFIX, rest)) => decode_binary(rest),
        Some((&other, _)) => Err(DecodeError::UnknownTag(other)),
        None => Err(DecodeError::UnexpectedEof),
    }
}

/// `expr...` hash of packed data, the key hash used by big maps.
pub fn script_expr_hash(packed: &[u8]) -> String {
    Hash::digest(packed).to_expr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::parser::parse;
    use crate::utils::test_utils::utils::{any_node, hex, to_hex};
    use proptest::prelude::*;

    #[test]
    fn int_encoding() {
        assert_eq!(to_hex(&encode_binary(&Node::int(1))), "0001");
        assert_eq!(to_hex(&encode_binary(&Node::int(-64))), "00c001");
    }

    #[test]
    fn string_encoding() {
        assert_eq!(to_hex(&encode_binary(&Node::string("ab"))), "01000000026162");
    }

    #[test]
    fn pair_uses_two_arg_tag() {
        let node = parse("Pair 1 2").unwrap();
        assert_eq!(to_hex(&encode_binary(&node)), "070700010002");
    }

    #[test]
    fn annotated_prim() {
        let node = parse("(nat %a)").unwrap();
        assert_eq!(to_hex(&encode_binary(&node)), "0462000000022561");
    }

    #[test]
    fn three_args_use_generic_form() {
        let node = parse("Pair 1 2 3").unwrap();
        let bytes = encode_binary(&node);
        assert_eq!(to_hex(&bytes), "09070000000600010002000300000000");
        assert_eq!(decode_binary(&bytes).unwrap(), node);
    }

    #[test]
    fn sequence_round_trip() {
        let node = parse("{ DROP ; PUSH (nat :n) 0x01 ; DIP 2 { SWAP } }").unwrap();
        assert_eq!(decode_binary(&encode_binary(&node)).unwrap(), node);
    }

    #[test]
    fn truncated_input() {
        assert_eq!(
            decode_binary(&hex("0100000005616263")),
            Err(DecodeError::LengthOverflow {
                declared: 5,
                remaining: 3
            })
        );
        assert_eq!(decode_binary(&hex("07")), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn unknown_tag_and_primitive() {
        assert_eq!(decode_binary(&hex("0b")), Err(DecodeError::UnknownTag(0x0b)));
        assert_eq!(decode_binary(&hex("03ff")), Err(DecodeError::UnknownPrimitiveCode(0xff)));
    }

    #[test]
    fn pack_and_expr_hash() {
        let packed = pack_node(&Node::int(1));
        assert_eq!(to_hex(&packed), "050001");
        assert_eq!(
            script_expr_hash(&packed),
            "expru2dKqDfZG8hu4wNGkiyunvq2hdSKuVYtcKta7BWP6Q18oNxKjS"
        );
        assert_eq!(unpack_node(&packed).unwrap(), Node::int(1));
        assert_eq!(unpack_node(&hex("0001")), Err(DecodeError::UnknownTag(0)));
    }

    fn nested_dips(levels: usize) -> String {
        format!("{}UNIT{}", "{ DIP { ".repeat(levels), " } }".repeat(levels))
    }

    #[test]
    fn parser_and_decoder_share_the_depth_limit() {
        // Each `{ DIP {` adds a sequence, a primitive and a sequence.
        let node = parse(&nested_dips(MAX_NESTING / 3)).unwrap();
        assert_eq!(node.depth(), MAX_NESTING / 3 * 3);
        assert_eq!(decode_binary(&encode_binary(&node)).unwrap(), node);

        assert!(parse(&nested_dips(MAX_NESTING / 3 + 1)).is_err());
    }

    #[test]
    fn decoder_reports_deep_nesting() {
        let mut node = Node::prim(Prim::UNIT);
        for _ in 0..=MAX_NESTING {
            node = Node::Seq(vec![node]);
        }
        assert_eq!(
            decode_binary(&encode_binary(&node)),
            Err(DecodeError::NestingTooDeep(MAX_NESTING))
        );
    }

    proptest! {
        #[test]
        fn binary_round_trip(node in any_node()) {
            let bytes = encode_binary(&node);
            prop_assert_eq!(decode_binary(&bytes).unwrap(), node.clone());
            prop_assert_eq!(encode_binary(&decode_binary(&bytes).unwrap()), bytes);
        }
    }
}
