//! The Micheline tree.

use crate::virtual_machine::isa::Prim;
use num_bigint::BigInt;

/// A Micheline node: the untyped tree every script, type and value is written in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Int(BigInt),
    String(String),
    Bytes(Vec<u8>),
    /// Primitive application. Annotations keep their source order.
    Prim {
        prim: Prim,
        args: Vec<Node>,
        annots: Vec<String>,
    },
    Seq(Vec<Node>),
}

impl Node {
    /// Primitive without arguments or annotations.
    pub fn prim(prim: Prim) -> Node {
        Node::Prim {
            prim,
            args: Vec::new(),
            annots: Vec::new(),
        }
    }

    pub fn prim_args(prim: Prim, args: Vec<Node>) -> Node {
        Node::Prim {
            prim,
            args,
            annots: Vec::new(),
        }
    }

    pub fn int(value: impl Into<BigInt>) -> Node {
        Node::Int(value.into())
    }

    pub fn string(value: impl Into<String>) -> Node {
        Node::String(value.into())
    }

    /// Returns a copy carrying `annots` instead of its own annotations.
    ///
    /// Non-primitive nodes cannot carry annotations and are returned as is.
    pub fn with_annots(self, annots: Vec<String>) -> Node {
        match self {
            Node::Prim { prim, args, .. } => Node::Prim { prim, args, annots },
            other => other,
        }
    }

    pub fn annots(&self) -> &[String] {
        match self {
            Node::Prim { annots, .. } => annots,
            _ => &[],
        }
    }

    /// First `%field` annotation, without its sigil.
    pub fn field_annot(&self) -> Option<&str> {
        self.annot_with('%')
    }

    /// First `:type` annotation, without its sigil.
    pub fn type_annot(&self) -> Option<&str> {
        self.annot_with(':')
    }

    /// First `@var` annotation, without its sigil.
    pub fn var_annot(&self) -> Option<&str> {
        self.annot_with('@')
    }

    fn annot_with(&self, sigil: char) -> Option<&str> {
        self.annots().iter().find_map(|a| a.strip_prefix(sigil))
    }

    /// Primitive of a `Prim` node.
    pub fn prim_of(&self) -> Option<Prim> {
        match self {
            Node::Prim { prim, .. } => Some(*prim),
            _ => None,
        }
    }

    /// Number of nodes in the tree, used for size-dependent costs.
    pub fn size(&self) -> usize {
        match self {
            Node::Prim { args, .. } => 1 + args.iter().map(Node::size).sum::<usize>(),
            Node::Seq(items) => 1 + items.iter().map(Node::size).sum::<usize>(),
            _ => 1,
        }
    }

    /// Nesting depth: the largest number of sequence or primitive ancestors
    /// of any node in the tree. Leaves and childless nodes have depth 0.
    ///
    /// This is the measure both the parser and the binary decoder bound by
    /// [`MAX_NESTING`](crate::micheline::MAX_NESTING). Walks the tree with an
    /// explicit stack.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0usize)];
        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);
            let children: &[Node] = match node {
                Node::Prim { args, .. } => args,
                Node::Seq(items) => items,
                _ => &[],
            };
            pending.extend(children.iter().map(|child| (child, level + 1)));
        }
        deepest
    }

    /// Returns the `(args, annots)` of a primitive node matching `prim`.
    pub fn as_prim(&self, prim: Prim) -> Option<(&[Node], &[String])> {
        match self {
            Node::Prim {
                prim: p,
                args,
                annots,
            } if *p == prim => Some((args, annots)),
            _ => None,
        }
    }
}
