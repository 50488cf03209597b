//! Micheline: the tree representation of Michelson source, types and data.
//!
//! # Modules
//!
//! - [`node`]: the [`Node`] tree
//! - [`parser`]: concrete syntax to tree, with line/column diagnostics
//! - [`macros`]: standard macro expansion used by the parser
//! - [`text`]: tree to concrete syntax
//! - [`binary`]: canonical binary codec, PACK framing and expression hashes
//! - [`json`]: Micheline JSON

pub mod binary;
pub mod json;
pub mod macros;
pub mod node;
pub mod parser;
pub mod text;

pub use crate::virtual_machine::isa::Prim;
pub use binary::{decode_binary, encode_binary, pack_node, script_expr_hash, unpack_node};
pub use json::{from_json, to_json};
pub use node::Node;
pub use parser::parse;
pub use text::{from_text, to_text};

/// Deepest nesting accepted by the parser and the binary decoder.
pub const MAX_NESTING: usize = 1000;
