//! Expansion of the standard Michelson macros.
//!
//! The parser hands every application whose name is not in the primitive
//! table to [`expand`]. Supported families:
//!
//! | macro | expansion |
//! |-------|-----------|
//! | `CMP{op}` | `{ COMPARE ; op }` |
//! | `IF{op} bt bf` | `{ op ; IF bt bf }` |
//! | `IFCMP{op} bt bf` | `{ COMPARE ; op ; IF bt bf }` |
//! | `FAIL` | `{ UNIT ; FAILWITH }` |
//! | `ASSERT`, `ASSERT_{op}`, `ASSERT_CMP{op}` | the test, then `IF {} { FAIL }` |
//! | `ASSERT_NONE`, `ASSERT_SOME`, `ASSERT_LEFT`, `ASSERT_RIGHT` | `IF_NONE` / `IF_LEFT` with a failing branch |
//! | `IF_SOME bt bf`, `IF_RIGHT bt bf` | `IF_NONE bf bt`, `IF_LEFT bf bt` |
//! | `DI..IP code`, `DU..UP` | `DIP n code`, `DUP n` |
//! | `C[AD]+R` | `CAR` / `CDR` chain |
//! | `SET_C[AD]+R`, `MAP_C[AD]+R code` | rebuild the pair along the path |
//! | `P[AIP]+R`, `UNP[AIP]+R` | build or split a pair tree |
//!
//! `{op}` is one of `EQ`, `NEQ`, `LT`, `GT`, `LE`, `GE`. Annotations on a
//! macro land on the last instruction of its expansion.

use crate::micheline::node::Node;
use crate::utils;
use crate::virtual_machine::isa::Prim;

fn instr(prim: Prim) -> Node {
    Node::prim(prim)
}

fn branch(prim: Prim, bt: Node, bf: Node) -> Node {
    Node::prim_args(prim, vec![bt, bf])
}

fn dip(n: usize, body: Vec<Node>) -> Node {
    if n == 1 {
        Node::prim_args(Prim::DIP, vec![Node::Seq(body)])
    } else {
        Node::prim_args(Prim::DIP, vec![Node::int(n as u64), Node::Seq(body)])
    }
}

fn fail() -> Node {
    Node::Seq(vec![instr(Prim::UNIT), instr(Prim::FAILWITH)])
}

/// `IF {} { FAIL }` style assertion on `test`.
fn assert_with(test: Prim) -> Node {
    branch(test, Node::Seq(vec![]), Node::Seq(vec![fail()]))
}

fn comparison(suffix: &str) -> Option<Prim> {
    Some(match suffix {
        "EQ" => Prim::EQ,
        "NEQ" => Prim::NEQ,
        "LT" => Prim::LT,
        "GT" => Prim::GT,
        "LE" => Prim::LE,
        "GE" => Prim::GE,
        _ => return None,
    })
}

fn annotate(mut items: Vec<Node>, annots: Vec<String>) -> Node {
    if !annots.is_empty() {
        if let Some(last) = items.pop() {
            items.push(last.with_annots(annots));
        }
    }
    Node::Seq(items)
}

fn take<const N: usize>(name: &str, args: Vec<Node>) -> Result<[Node; N], String> {
    let count = args.len();
    args.try_into()
        .map_err(|_| format!("{} expects {} argument(s), got {}", name, N, count))
}

/// Expands macro `name` applied to `args`.
///
/// Returns `None` when `name` is not a macro, and an error message when it
/// is one but is applied to the wrong number of arguments.
pub fn expand(name: &str, args: Vec<Node>, annots: Vec<String>) -> Option<Result<Node, String>> {
    let expanded = if let Some(op) = name.strip_prefix("CMP").and_then(comparison) {
        take::<0>(name, args).map(|_| annotate(vec![instr(Prim::COMPARE), instr(op)], annots))
    } else if let Some(op) = name.strip_prefix("IFCMP").and_then(comparison) {
        take::<2>(name, args).map(|[bt, bf]| {
            Node::Seq(vec![instr(Prim::COMPARE), instr(op), branch(Prim::IF, bt, bf)])
        })
    } else if let Some(op) = name.strip_prefix("IF").and_then(comparison) {
        take::<2>(name, args).map(|[bt, bf]| Node::Seq(vec![instr(op), branch(Prim::IF, bt, bf)]))
    } else if let Some(op) = name.strip_prefix("ASSERT_CMP").and_then(comparison) {
        take::<0>(name, args)
            .map(|_| Node::Seq(vec![instr(Prim::COMPARE), instr(op), assert_with(Prim::IF)]))
    } else if let Some(op) = name.strip_prefix("ASSERT_").and_then(comparison) {
        take::<0>(name, args).map(|_| Node::Seq(vec![instr(op), assert_with(Prim::IF)]))
    } else {
        match name {
            "FAIL" => take::<0>(name, args).map(|_| fail()),
            "ASSERT" => take::<0>(name, args).map(|_| Node::Seq(vec![assert_with(Prim::IF)])),
            "ASSERT_NONE" => take::<0>(name, args).map(|_| Node::Seq(vec![assert_with(Prim::IF_NONE)])),
            "ASSERT_LEFT" => take::<0>(name, args).map(|_| Node::Seq(vec![assert_with(Prim::IF_LEFT)])),
            "ASSERT_SOME" => take::<0>(name, args).map(|_| {
                Node::Seq(vec![branch(Prim::IF_NONE, Node::Seq(vec![fail()]), Node::Seq(vec![]))])
            }),
            "ASSERT_RIGHT" => take::<0>(name, args).map(|_| {
                Node::Seq(vec![branch(Prim::IF_LEFT, Node::Seq(vec![fail()]), Node::Seq(vec![]))])
            }),
            "IF_SOME" => take::<2>(name, args).map(|[bt, bf]| Node::Seq(vec![branch(Prim::IF_NONE, bf, bt)])),
            "IF_RIGHT" => take::<2>(name, args).map(|[bt, bf]| Node::Seq(vec![branch(Prim::IF_LEFT, bf, bt)])),
            _ => return expand_structural(name, args, annots),
        }
    };
    Some(expanded)
}

fn repeated(body: &str, letter: char) -> Option<usize> {
    (!body.is_empty() && body.chars().all(|c| c == letter)).then_some(body.len())
}

fn path(body: &str) -> Option<&[u8]> {
    (!body.is_empty() && body.bytes().all(|b| b == b'A' || b == b'D')).then_some(body.as_bytes())
}

fn between<'a>(name: &'a str, prefix: &str, suffix: char) -> Option<&'a str> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)
}

/// Macros whose name encodes a count, a pair path or a pair tree.
fn expand_structural(name: &str, args: Vec<Node>, annots: Vec<String>) -> Option<Result<Node, String>> {
    if let Some(n) = between(name, "D", 'P').and_then(|body| repeated(body, 'I')) {
        return Some(take::<1>(name, args).map(|[code]| {
            Node::prim_args(Prim::DIP, vec![Node::int(n as u64), code]).with_annots(annots)
        }));
    }
    if let Some(n) = between(name, "D", 'P').and_then(|body| repeated(body, 'U')) {
        return Some(
            take::<0>(name, args)
                .map(|_| Node::prim_args(Prim::DUP, vec![Node::int(n as u64)]).with_annots(annots)),
        );
    }
    if let Some(steps) = between(name, "C", 'R').and_then(path) {
        return Some(take::<0>(name, args).map(|_| {
            let items = steps
                .iter()
                .map(|step| instr(if *step == b'A' { Prim::CAR } else { Prim::CDR }))
                .collect();
            annotate(items, annots)
        }));
    }
    if let Some(steps) = between(name, "SET_C", 'R').and_then(path) {
        return Some(take::<0>(name, args).map(|_| annotate(set_path(steps), annots)));
    }
    if let Some(steps) = between(name, "MAP_C", 'R').and_then(path) {
        return Some(take::<1>(name, args).map(|[code]| annotate(map_path(steps, code), annots)));
    }
    if let Some(shape) = name.strip_prefix("UN").and_then(PairShape::parse) {
        return Some(take::<0>(name, args).map(|_| annotate(shape.unpair_code(), annots)));
    }
    if let Some(shape) = PairShape::parse(name) {
        return Some(take::<0>(name, args).map(|_| annotate(shape.pair_code(), annots)));
    }
    None
}

/// Replaces the component at `steps` of the pair on top with the value below it.
fn set_path(steps: &[u8]) -> Vec<Node> {
    let (head, rest) = (steps[0], &steps[1..]);
    match (head, rest.is_empty()) {
        (b'A', true) => vec![instr(Prim::CDR), instr(Prim::SWAP), instr(Prim::PAIR)],
        (_, true) => vec![instr(Prim::CAR), instr(Prim::PAIR)],
        (b'A', false) => {
            let mut body = vec![instr(Prim::CAR)];
            body.extend(set_path(rest));
            vec![instr(Prim::DUP), dip(1, body), instr(Prim::CDR), instr(Prim::SWAP), instr(Prim::PAIR)]
        }
        (_, false) => {
            let mut body = vec![instr(Prim::CDR)];
            body.extend(set_path(rest));
            vec![instr(Prim::DUP), dip(1, body), instr(Prim::CAR), instr(Prim::PAIR)]
        }
    }
}

/// Applies `code` to the component at `steps` of the pair on top.
fn map_path(steps: &[u8], code: Node) -> Vec<Node> {
    let (head, rest) = (steps[0], &steps[1..]);
    match (head, rest.is_empty()) {
        (b'A', true) => vec![
            instr(Prim::DUP),
            instr(Prim::CDR),
            dip(1, vec![instr(Prim::CAR), code]),
            instr(Prim::SWAP),
            instr(Prim::PAIR),
        ],
        (_, true) => vec![
            instr(Prim::DUP),
            instr(Prim::CDR),
            code,
            instr(Prim::SWAP),
            instr(Prim::CAR),
            instr(Prim::PAIR),
        ],
        (b'A', false) => {
            let mut body = vec![instr(Prim::CAR)];
            body.extend(map_path(rest, code));
            vec![instr(Prim::DUP), dip(1, body), instr(Prim::CDR), instr(Prim::SWAP), instr(Prim::PAIR)]
        }
        (_, false) => {
            let mut body = vec![instr(Prim::CDR)];
            body.extend(map_path(rest, code));
            vec![instr(Prim::DUP), dip(1, body), instr(Prim::CAR), instr(Prim::PAIR)]
        }
    }
}

/// Tree spelled by a `P[AIP]+R` name: `P left right`, where a left leaf is
/// `A`, a right leaf is `I`, and `R` closes the outermost pair.
enum PairShape {
    Leaf,
    Pair(Box<PairShape>, Box<PairShape>),
}

impl PairShape {
    fn parse(name: &str) -> Option<PairShape> {
        let body = name.strip_suffix('R')?.as_bytes();
        let mut pos = 0;
        let shape = Self::node(body, &mut pos, b'A')?;
        (pos == body.len() && matches!(shape, PairShape::Pair(..))).then_some(shape)
    }

    fn node(body: &[u8], pos: &mut usize, leaf: u8) -> Option<PairShape> {
        let byte = *body.get(*pos)?;
        *pos += 1;
        if byte == leaf {
            return Some(PairShape::Leaf);
        }
        if byte != b'P' {
            return None;
        }
        utils::stack::grow(|| {
            let left = Self::node(body, pos, b'A')?;
            let right = Self::node(body, pos, b'I')?;
            Some(PairShape::Pair(Box::new(left), Box::new(right)))
        })
    }

    fn leaves(&self) -> usize {
        match self {
            PairShape::Leaf => 1,
            PairShape::Pair(left, right) => left.leaves() + right.leaves(),
        }
    }

    /// Folds the leaves on top of the stack into this tree.
    fn pair_code(&self) -> Vec<Node> {
        let PairShape::Pair(left, right) = self else {
            return Vec::new();
        };
        let mut code = left.pair_code();
        if let PairShape::Pair(..) = **right {
            code.push(dip(1, right.pair_code()));
        }
        code.push(instr(Prim::PAIR));
        code
    }

    /// Splits a value of this tree shape into its leaves.
    fn unpair_code(&self) -> Vec<Node> {
        let PairShape::Pair(left, right) = self else {
            return Vec::new();
        };
        let mut code = vec![instr(Prim::UNPAIR)];
        code.extend(left.unpair_code());
        if let PairShape::Pair(..) = **right {
            code.push(dip(left.leaves(), right.unpair_code()));
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::parse;
    use crate::virtual_machine::errors::VMError;

    fn same(macro_text: &str, expansion: &str) {
        assert_eq!(parse(macro_text).unwrap(), parse(expansion).unwrap(), "{}", macro_text);
    }

    #[test]
    fn comparisons() {
        same("CMPEQ", "{ COMPARE ; EQ }");
        same("CMPGE @ok", "{ COMPARE ; GE @ok }");
        same("IFLT { UNIT } {}", "{ LT ; IF { UNIT } {} }");
        same("IFCMPNEQ {} { DROP }", "{ COMPARE ; NEQ ; IF {} { DROP } }");
    }

    #[test]
    fn assertions() {
        same("FAIL", "{ UNIT ; FAILWITH }");
        same("ASSERT", "{ IF {} { { UNIT ; FAILWITH } } }");
        same("ASSERT_CMPLE", "{ COMPARE ; LE ; IF {} { { UNIT ; FAILWITH } } }");
        same("ASSERT_SOME", "{ IF_NONE { { UNIT ; FAILWITH } } {} }");
        same("ASSERT_LEFT", "{ IF_LEFT {} { { UNIT ; FAILWITH } } }");
        same("IF_SOME { DROP } { UNIT }", "{ IF_NONE { UNIT } { DROP } }");
    }

    #[test]
    fn counted_forms() {
        same("DIIP { DROP }", "DIP 2 { DROP }");
        same("DUUUP", "DUP 3");
    }

    #[test]
    fn pair_paths() {
        same("CDAR", "{ CDR ; CAR }");
        same("SET_CAR", "{ CDR ; SWAP ; PAIR }");
        same("SET_CDAR", "{ DUP ; DIP { CDR ; CDR ; SWAP ; PAIR } ; CAR ; PAIR }");
        same("MAP_CDR { NEG }", "{ DUP ; CDR ; { NEG } ; SWAP ; CAR ; PAIR }");
    }

    #[test]
    fn pair_trees() {
        same("PAPAIR", "{ DIP { PAIR } ; PAIR }");
        same("PPAIIR", "{ PAIR ; PAIR }");
        same("PAPPAIIR", "{ DIP { PAIR ; PAIR } ; PAIR }");
        same("UNPAPAIR", "{ UNPAIR ; DIP { UNPAIR } }");
        same("UNPPAIPAIR", "{ UNPAIR ; UNPAIR ; DIP 2 { UNPAIR } }");
    }

    #[test]
    fn misuse() {
        assert!(matches!(parse("IFCMPEQ {}"), Err(VMError::SyntaxError { .. })));
        assert!(matches!(parse("CMPEQ 1"), Err(VMError::SyntaxError { .. })));
        assert_eq!(parse("CMPXX"), Err(VMError::UnknownPrimitive("CMPXX".to_string())));
        assert_eq!(parse("PAPR"), Err(VMError::UnknownPrimitive("PAPR".to_string())));
    }
}
