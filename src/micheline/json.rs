//! Micheline JSON: `{"int": "1"}`, `{"string": ".."}`, `{"bytes": "00ff"}`,
//! `{"prim": "Pair", "args": [..], "annots": [..]}` and arrays for sequences.

use crate::micheline::node::Node;
use crate::utils;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Prim;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum JsonNode {
    Int {
        int: String,
    },
    String {
        string: String,
    },
    Bytes {
        bytes: String,
    },
    Prim {
        prim: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<JsonNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        annots: Vec<String>,
    },
    Seq(Vec<JsonNode>),
}

fn to_json_node(node: &Node) -> JsonNode {
    match node {
        Node::Int(i) => JsonNode::Int { int: i.to_string() },
        Node::String(s) => JsonNode::String { string: s.clone() },
        Node::Bytes(b) => JsonNode::Bytes {
            bytes: b.iter().map(|byte| format!("{:02x}", byte)).collect(),
        },
        Node::Prim { prim, args, annots } => JsonNode::Prim {
            prim: prim.name().to_string(),
            args: args.iter().map(nested_to_json).collect(),
            annots: annots.clone(),
        },
        Node::Seq(items) => JsonNode::Seq(items.iter().map(nested_to_json).collect()),
    }
}

fn from_json_node(node: JsonNode) -> Result<Node, VMError> {
    match node {
        JsonNode::Int { int } => int
            .parse::<BigInt>()
            .map(Node::Int)
            .map_err(|_| VMError::invalid_data(format!("invalid JSON integer {:?}", int))),
        JsonNode::String { string } => Ok(Node::String(string)),
        JsonNode::Bytes { bytes } => {
            if bytes.len() % 2 != 0 {
                return Err(VMError::invalid_data("odd number of hex digits in JSON bytes"));
            }
            (0..bytes.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(bytes.get(i..i + 2).unwrap_or("zz"), 16))
                .collect::<Result<Vec<u8>, _>>()
                .map(Node::Bytes)
                .map_err(|_| VMError::invalid_data(format!("invalid JSON bytes {:?}", bytes)))
        }
        JsonNode::Prim { prim, args, annots } => Ok(Node::Prim {
            prim: prim.parse::<Prim>()?,
            args: args.into_iter().map(nested_from_json).collect::<Result<_, _>>()?,
            annots,
        }),
        JsonNode::Seq(items) => Ok(Node::Seq(
            items.into_iter().map(nested_from_json).collect::<Result<_, _>>()?,
        )),
    }
}

fn nested_to_json(node: &Node) -> JsonNode {
    utils::stack::grow(|| to_json_node(node))
}

fn nested_from_json(node: JsonNode) -> Result<Node, VMError> {
    utils::stack::grow(|| from_json_node(node))
}

/// Converts a node to its Micheline JSON value.
pub fn to_json(node: &Node) -> serde_json::Value {
    serde_json::to_value(to_json_node(node)).unwrap_or(serde_json::Value::Null)
}

/// Serializes a node to a compact Micheline JSON string.
pub fn to_json_string(node: &Node) -> String {
    to_json(node).to_string()
}

/// Reads a node from a Micheline JSON value.
pub fn from_json(value: &serde_json::Value) -> Result<Node, VMError> {
    let node = JsonNode::deserialize(value)
        .map_err(|e| VMError::invalid_data(format!("malformed Micheline JSON: {}", e)))?;
    from_json_node(node)
}

/// Parses a Micheline JSON string.
pub fn from_json_str(text: &str) -> Result<Node, VMError> {
    let node: JsonNode = serde_json::from_str(text)
        .map_err(|e| VMError::invalid_data(format!("malformed Micheline JSON: {}", e)))?;
    from_json_node(node)
}
