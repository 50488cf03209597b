//! Readable printing of Micheline trees.

use crate::micheline::node::Node;
use crate::micheline::parser;
use crate::utils;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Prim;
use std::fmt::{self, Write};

fn write_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_node(out: &mut String, node: &Node, wrap: bool) {
    match node {
        Node::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Node::String(s) => write_string_literal(out, s),
        Node::Bytes(b) => {
            out.push_str("0x");
            for byte in b {
                let _ = write!(out, "{:02x}", byte);
            }
        }
        Node::Seq(items) => {
            if items.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{ ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(" ; ");
                }
                utils::stack::grow(|| write_node(out, item, false));
            }
            out.push_str(" }");
        }
        Node::Prim { prim, args, annots } => {
            let bare = args.is_empty() && annots.is_empty();
            let parens = wrap && !bare;
            if parens {
                out.push('(');
            }
            out.push_str(prim.name());
            for annot in annots {
                out.push(' ');
                out.push_str(annot);
            }
            for arg in args {
                out.push(' ');
                utils::stack::grow(|| write_node(out, arg, true));
            }
            if parens {
                out.push(')');
            }
        }
    }
}

fn is_script(node: &Node) -> bool {
    match node {
        Node::Seq(items) => {
            !items.is_empty()
                && items.iter().all(|item| {
                    matches!(
                        item.prim_of(),
                        Some(Prim::parameter | Prim::storage | Prim::code | Prim::view)
                    )
                })
        }
        _ => false,
    }
}

/// Prints a node in the concrete syntax.
///
/// Scripts (sequences of sections) print one section per line, each
/// terminated by `;`.
pub fn to_text(node: &Node) -> String {
    let mut out = String::new();
    if is_script(node) {
        if let Node::Seq(sections) = node {
            for section in sections {
                write_node(&mut out, section, false);
                out.push_str(";\n");
            }
        }
        return out;
    }
    write_node(&mut out, node, false);
    out
}

/// Parses concrete syntax; the inverse of [`to_text`].
pub fn from_text(text: &str) -> Result<Node, VMError> {
    parser::parse(text)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_text(self))
    }
}
