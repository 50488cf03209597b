//! Static checking of instruction sequences.
//!
//! [`typecheck`] walks Micheline code against an input stack type and
//! produces the typed [`Block`] the interpreter runs, together with the
//! output stack type. `None` as output means the code always fails.
//!
//! Branching instructions require both arms to produce the same stack; an
//! arm that always fails takes the type of the other one. Instructions
//! written after a failing instruction are rejected.
//!
//! Stack types are stored top-last, like the runtime stack.

mod arith;
mod domain;

use crate::core::data::parse_data;
use crate::core::ty::{Type, TypeInterner, TypeKind, structurally_equal};
use crate::micheline::{MAX_NESTING, Node, Prim};
use crate::virtual_machine::errors::VMError;
use crate::utils;
use crate::virtual_machine::instr::{Block, ConcatForm, Instr};
use num_traits::ToPrimitive;
use std::sync::Arc;

pub type StackType = Vec<Arc<Type>>;

type Step = (Instr, Option<StackType>);

/// Checks `code` (a sequence) against `input` outside of any contract.
///
/// `SELF` is rejected since there is no parameter type to refer to.
pub fn typecheck(
    code: &Node,
    input: StackType,
    interner: &mut TypeInterner,
) -> Result<(Block, Option<StackType>), VMError> {
    Checker::new(interner, None, MAX_NESTING).check_block(code, input)
}

/// Checks the body of a lambda from `arg` to `ret`.
///
/// A recursive body sees the lambda itself under its argument.
pub fn check_lambda(
    code: &Node,
    arg: &Arc<Type>,
    ret: &Arc<Type>,
    recursive: bool,
    interner: &mut TypeInterner,
) -> Result<Block, VMError> {
    let mut input = Vec::with_capacity(2);
    if recursive {
        input.push(Type::lambda(arg.clone(), ret.clone()));
    }
    input.push(arg.clone());
    let (block, output) = Checker::new(interner, None, MAX_NESTING).check_block(code, input)?;
    match output {
        None => Ok(block),
        Some(stack) if stack.len() == 1 && stack[0] == *ret => Ok(block),
        Some(stack) => Err(VMError::TypeMismatch(format!(
            "lambda body must return [{}], got {}",
            ret,
            show(&stack)
        ))),
    }
}

pub(crate) fn show(stack: &StackType) -> String {
    let items: Vec<String> = stack.iter().rev().map(|t| t.to_string()).collect();
    format!("[{}]", items.join(" : "))
}

pub(crate) fn require(stack: &StackType, n: usize, prim: Prim) -> Result<(), VMError> {
    if stack.len() < n {
        return Err(VMError::StackUnderflow {
            instruction: prim.name(),
            required: n,
            available: stack.len(),
        });
    }
    Ok(())
}

pub(crate) fn pop(stack: &mut StackType, prim: Prim) -> Result<Arc<Type>, VMError> {
    require(stack, 1, prim)?;
    stack.pop().ok_or(VMError::StackUnderflow {
        instruction: prim.name(),
        required: 1,
        available: 0,
    })
}

pub(crate) fn ill_typed(prim: Prim, operands: &[&Arc<Type>]) -> VMError {
    let operands: Vec<String> = operands.iter().map(|t| t.to_string()).collect();
    VMError::TypeMismatch(format!("{} cannot be applied to {}", prim, operands.join(", ")))
}

fn arity(prim: Prim, args: &[Node], n: usize) -> Result<(), VMError> {
    if args.len() != n {
        return Err(VMError::TypeMismatch(format!(
            "{} expects {} argument(s), got {}",
            prim,
            n,
            args.len()
        )));
    }
    Ok(())
}

fn int_arg(prim: Prim, node: &Node) -> Result<usize, VMError> {
    match node {
        Node::Int(n) => n
            .to_usize()
            .filter(|n| *n <= 1023)
            .ok_or_else(|| VMError::TypeMismatch(format!("invalid {} argument {}", prim, n))),
        other => Err(VMError::TypeMismatch(format!(
            "{} expects an integer argument, got {}",
            prim, other
        ))),
    }
}

/// Optional numeric argument: `DUP` or `DUP n`.
fn count_arg(prim: Prim, args: &[Node], default: usize) -> Result<usize, VMError> {
    match args {
        [] => Ok(default),
        [n] => int_arg(prim, n),
        _ => Err(VMError::TypeMismatch(format!("{} expects at most one argument", prim))),
    }
}

/// Both arms of a branch must agree unless one always fails.
fn merge(prim: Prim, a: Option<StackType>, b: Option<StackType>) -> Result<Option<StackType>, VMError> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let mismatch = || {
                VMError::TypeMismatch(format!(
                    "{} branches disagree: {} vs {}",
                    prim,
                    show(&a),
                    show(&b)
                ))
            };
            if a.len() != b.len() {
                return Err(mismatch());
            }
            for (x, y) in a.iter().zip(&b) {
                structurally_equal(x, y).map_err(|_| mismatch())?;
            }
            Ok(Some(a))
        }
        (Some(s), None) | (None, Some(s)) => Ok(Some(s)),
        (None, None) => Ok(None),
    }
}

fn get_n(ty: &Arc<Type>, n: usize) -> Option<Arc<Type>> {
    if n == 0 {
        return Some(ty.clone());
    }
    match &ty.kind {
        TypeKind::Pair(a, _) if n == 1 => Some(a.clone()),
        TypeKind::Pair(_, b) => get_n(b, n - 2),
        _ => None,
    }
}

fn update_n(ty: &Arc<Type>, n: usize, value: Arc<Type>) -> Option<Arc<Type>> {
    if n == 0 {
        return Some(value);
    }
    match &ty.kind {
        TypeKind::Pair(_, b) if n == 1 => Some(Type::pair(value, b.clone())),
        TypeKind::Pair(a, b) => Some(Type::pair(a.clone(), update_n(b, n - 2, value)?)),
        _ => None,
    }
}

/// Type checker state for one script or lambda.
pub(crate) struct Checker<'a> {
    pub(crate) interner: &'a mut TypeInterner,
    /// Parameter type of the enclosing contract; `None` inside lambdas.
    self_type: Option<Arc<Type>>,
    max_depth: usize,
    depth: usize,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(interner: &'a mut TypeInterner, self_type: Option<Arc<Type>>, max_depth: usize) -> Self {
        Self {
            interner,
            self_type,
            max_depth,
            depth: 0,
        }
    }

    pub(crate) fn resolve(&mut self, node: &Node) -> Result<Arc<Type>, VMError> {
        self.interner.resolve(node)
    }

    pub(crate) fn check_block(&mut self, node: &Node, stack: StackType) -> Result<(Block, Option<StackType>), VMError> {
        let Node::Seq(items) = node else {
            return Err(VMError::TypeMismatch(format!(
                "expected an instruction sequence, got {}",
                node
            )));
        };
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(VMError::MaxDepthExceeded(self.max_depth));
        }
        let result = utils::stack::grow(|| self.check_items(items, stack));
        self.depth -= 1;
        result
    }

    fn check_items(&mut self, items: &[Node], stack: StackType) -> Result<(Block, Option<StackType>), VMError> {
        let mut instrs = Vec::with_capacity(items.len());
        let mut current = Some(stack);
        for item in items {
            let Some(stack) = current.take() else {
                return Err(VMError::TypeMismatch(format!(
                    "{} is unreachable after a failing instruction",
                    item
                )));
            };
            let (instr, next) = self.check_instr(item, stack)?;
            instrs.push(instr);
            current = next;
        }
        Ok((Block::new(instrs), current))
    }

    fn check_instr(&mut self, node: &Node, mut stack: StackType) -> Result<Step, VMError> {
        let (prim, args, annots) = match node {
            Node::Seq(_) => {
                let (block, output) = self.check_block(node, stack)?;
                return Ok((Instr::Seq(block), output));
            }
            Node::Prim { prim, args, annots } => (*prim, args.as_slice(), annots.as_slice()),
            other => {
                return Err(VMError::TypeMismatch(format!(
                    "expected an instruction, got {}",
                    other
                )));
            }
        };
        let s = &mut stack;
        let instr = match prim {
            // ==================== Stack ====================
            Prim::DROP => {
                let n = count_arg(prim, args, 1)?;
                require(s, n, prim)?;
                s.truncate(s.len() - n);
                Instr::Drop(n)
            }
            Prim::DUP => {
                let n = count_arg(prim, args, 1)?;
                if n == 0 {
                    return Err(VMError::type_mismatch("DUP 0 is not allowed"));
                }
                require(s, n, prim)?;
                let ty = s[s.len() - n].clone();
                if !ty.is_dupable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be duplicated", ty)));
                }
                s.push(ty);
                Instr::Dup(n)
            }
            Prim::SWAP => {
                arity(prim, args, 0)?;
                require(s, 2, prim)?;
                let len = s.len();
                s.swap(len - 1, len - 2);
                Instr::Swap
            }
            Prim::DIG => {
                arity(prim, args, 1)?;
                let n = int_arg(prim, &args[0])?;
                require(s, n + 1, prim)?;
                let ty = s.remove(s.len() - 1 - n);
                s.push(ty);
                Instr::Dig(n)
            }
            Prim::DUG => {
                arity(prim, args, 1)?;
                let n = int_arg(prim, &args[0])?;
                require(s, n + 1, prim)?;
                let ty = pop(s, prim)?;
                s.insert(s.len() - n, ty);
                Instr::Dug(n)
            }
            Prim::PUSH => {
                arity(prim, args, 2)?;
                let ty = self.resolve(&args[0])?;
                if !ty.is_pushable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be pushed", ty)));
                }
                let value = parse_data(&args[1], &ty, self.interner)?;
                s.push(ty);
                Instr::Push(value)
            }
            Prim::UNIT => {
                arity(prim, args, 0)?;
                s.push(Type::unit());
                Instr::Unit
            }
            Prim::NEVER => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                if top.kind != TypeKind::Never {
                    return Err(ill_typed(prim, &[&top]));
                }
                return Ok((Instr::Never, None));
            }
            Prim::LAMBDA | Prim::LAMBDA_REC => {
                arity(prim, args, 3)?;
                let arg = self.resolve(&args[0])?;
                let ret = self.resolve(&args[1])?;
                let recursive = prim == Prim::LAMBDA_REC;
                let data = if recursive {
                    Node::prim_args(Prim::Lambda_rec, vec![args[2].clone()])
                } else {
                    args[2].clone()
                };
                let lambda_type = Type::lambda(arg, ret);
                let value = parse_data(&data, &lambda_type, self.interner)?;
                s.push(lambda_type);
                Instr::Lambda(value)
            }
            Prim::DIP => {
                let (n, body) = match args {
                    [body] => (1, body),
                    [n, body] => (int_arg(prim, n)?, body),
                    _ => return Err(VMError::type_mismatch("DIP expects a body")),
                };
                require(s, n, prim)?;
                let top = s.split_off(s.len() - n);
                let rest = std::mem::take(s);
                let (block, output) = self.check_block(body, rest)?;
                let output = output.map(|mut out| {
                    out.extend(top);
                    out
                });
                return Ok((Instr::Dip(n, block), output));
            }
            Prim::CAST => {
                arity(prim, args, 1)?;
                let ty = self.resolve(&args[0])?;
                let top = pop(s, prim)?;
                structurally_equal(&top, &ty)?;
                s.push(ty);
                Instr::Cast
            }
            Prim::RENAME => {
                require(s, 1, prim)?;
                Instr::Rename
            }

            // ==================== Control ====================
            Prim::FAILWITH => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                if !top.is_packable() && !matches!(top.kind, TypeKind::Contract(_)) {
                    return Err(VMError::TypeMismatch(format!("cannot fail with {}", top)));
                }
                return Ok((Instr::Failwith(top), None));
            }
            Prim::IF => {
                arity(prim, args, 2)?;
                let top = pop(s, prim)?;
                if top.kind != TypeKind::Bool {
                    return Err(ill_typed(prim, &[&top]));
                }
                let (bt, ot) = self.check_block(&args[0], s.clone())?;
                let (bf, of) = self.check_block(&args[1], stack)?;
                return Ok((Instr::If(bt, bf), merge(prim, ot, of)?));
            }
            Prim::IF_NONE => {
                arity(prim, args, 2)?;
                let top = pop(s, prim)?;
                let TypeKind::Option(inner) = &top.kind else {
                    return Err(ill_typed(prim, &[&top]));
                };
                let (bn, on) = self.check_block(&args[0], s.clone())?;
                s.push(inner.clone());
                let (bs, os) = self.check_block(&args[1], stack)?;
                return Ok((Instr::IfNone(bn, bs), merge(prim, on, os)?));
            }
            Prim::IF_LEFT => {
                arity(prim, args, 2)?;
                let top = pop(s, prim)?;
                let TypeKind::Or(l, r) = &top.kind else {
                    return Err(ill_typed(prim, &[&top]));
                };
                let mut left = s.clone();
                left.push(l.clone());
                let (bl, ol) = self.check_block(&args[0], left)?;
                s.push(r.clone());
                let (br, or) = self.check_block(&args[1], stack)?;
                return Ok((Instr::IfLeft(bl, br), merge(prim, ol, or)?));
            }
            Prim::IF_CONS => {
                arity(prim, args, 2)?;
                let top = pop(s, prim)?;
                let TypeKind::List(elt) = &top.kind else {
                    return Err(ill_typed(prim, &[&top]));
                };
                let mut cons = s.clone();
                cons.push(top.clone());
                cons.push(elt.clone());
                let (bc, oc) = self.check_block(&args[0], cons)?;
                let (bn, on) = self.check_block(&args[1], stack)?;
                return Ok((Instr::IfCons(bc, bn), merge(prim, oc, on)?));
            }
            Prim::LOOP => {
                arity(prim, args, 1)?;
                let top = pop(s, prim)?;
                if top.kind != TypeKind::Bool {
                    return Err(ill_typed(prim, &[&top]));
                }
                let (body, output) = self.check_block(&args[0], s.clone())?;
                if let Some(output) = output {
                    let mut expected = s.clone();
                    expected.push(Type::bool());
                    merge(prim, Some(output), Some(expected))?;
                }
                Instr::Loop(body)
            }
            Prim::LOOP_LEFT => {
                arity(prim, args, 1)?;
                let top = pop(s, prim)?;
                let TypeKind::Or(l, r) = &top.kind else {
                    return Err(ill_typed(prim, &[&top]));
                };
                let mut input = s.clone();
                input.push(l.clone());
                let (body, output) = self.check_block(&args[0], input)?;
                if let Some(output) = output {
                    let mut expected = s.clone();
                    expected.push(top.clone());
                    merge(prim, Some(output), Some(expected))?;
                }
                s.push(r.clone());
                Instr::LoopLeft(body)
            }
            Prim::ITER => {
                arity(prim, args, 1)?;
                let top = pop(s, prim)?;
                let elt = match &top.kind {
                    TypeKind::List(t) | TypeKind::Set(t) => t.clone(),
                    TypeKind::Map(k, v) => Type::pair(k.clone(), v.clone()),
                    _ => return Err(ill_typed(prim, &[&top])),
                };
                let mut input = s.clone();
                input.push(elt);
                let (body, output) = self.check_block(&args[0], input)?;
                if let Some(output) = output {
                    merge(prim, Some(output), Some(s.clone()))?;
                }
                Instr::Iter(body)
            }
            Prim::MAP => {
                arity(prim, args, 1)?;
                let top = pop(s, prim)?;
                let elt = match &top.kind {
                    TypeKind::List(t) => t.clone(),
                    TypeKind::Map(k, v) => Type::pair(k.clone(), v.clone()),
                    _ => return Err(ill_typed(prim, &[&top])),
                };
                let mut input = s.clone();
                input.push(elt);
                let (body, output) = self.check_block(&args[0], input)?;
                let Some(mut output) = output else {
                    return Err(VMError::type_mismatch("MAP body always fails"));
                };
                let mapped = pop(&mut output, prim)?;
                merge(prim, Some(output), Some(s.clone()))?;
                s.push(match &top.kind {
                    TypeKind::Map(k, _) => Type::map(k.clone(), mapped),
                    _ => Type::list(mapped),
                });
                Instr::Map(body)
            }
            Prim::EXEC => {
                arity(prim, args, 0)?;
                let arg = pop(s, prim)?;
                let lambda = pop(s, prim)?;
                let TypeKind::Lambda(a, r) = &lambda.kind else {
                    return Err(ill_typed(prim, &[&arg, &lambda]));
                };
                structurally_equal(&arg, a)?;
                s.push(r.clone());
                Instr::Exec
            }
            Prim::APPLY => {
                arity(prim, args, 0)?;
                let captured = pop(s, prim)?;
                let lambda = pop(s, prim)?;
                let TypeKind::Lambda(a, r) = &lambda.kind else {
                    return Err(ill_typed(prim, &[&captured, &lambda]));
                };
                let TypeKind::Pair(first, rest) = &a.kind else {
                    return Err(ill_typed(prim, &[&captured, &lambda]));
                };
                structurally_equal(&captured, first)?;
                if !captured.is_packable() {
                    return Err(VMError::TypeMismatch(format!("cannot capture {}", captured)));
                }
                s.push(Type::lambda(rest.clone(), r.clone()));
                Instr::Apply(captured)
            }

            // ==================== Structures ====================
            Prim::PAIR => {
                let n = count_arg(prim, args, 2)?;
                if n < 2 {
                    return Err(VMError::type_mismatch("PAIR needs at least 2 components"));
                }
                require(s, n, prim)?;
                let comb = s
                    .split_off(s.len() - n)
                    .into_iter()
                    .reduce(|acc, item| Type::pair(item, acc));
                s.extend(comb);
                Instr::Pair(n)
            }
            _ => return self.check_rest(prim, args, annots, stack),
        };
        Ok((instr, Some(stack)))
    }
}

impl Checker<'_> {
    /// Structures, program slots, then the arithmetic and domain families.
    fn check_rest(
        &mut self,
        prim: Prim,
        args: &[Node],
        annots: &[String],
        mut stack: StackType,
    ) -> Result<Step, VMError> {
        let s = &mut stack;
        let instr = match prim {
            Prim::UNPAIR => {
                let n = count_arg(prim, args, 2)?;
                if n < 2 {
                    return Err(VMError::type_mismatch("UNPAIR needs at least 2 components"));
                }
                let top = pop(s, prim)?;
                let mut parts = Vec::with_capacity(n);
                let mut cur = top.clone();
                for _ in 1..n {
                    let TypeKind::Pair(a, b) = &cur.kind else {
                        return Err(ill_typed(prim, &[&top]));
                    };
                    parts.push(a.clone());
                    let next = b.clone();
                    cur = next;
                }
                parts.push(cur);
                s.extend(parts.into_iter().rev());
                Instr::Unpair(n)
            }
            Prim::CAR | Prim::CDR => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                let TypeKind::Pair(a, b) = &top.kind else {
                    return Err(ill_typed(prim, &[&top]));
                };
                if prim == Prim::CAR {
                    s.push(a.clone());
                    Instr::Car
                } else {
                    s.push(b.clone());
                    Instr::Cdr
                }
            }
            Prim::GET if args.len() == 1 => {
                let n = int_arg(prim, &args[0])?;
                let top = pop(s, prim)?;
                s.push(get_n(&top, n).ok_or_else(|| ill_typed(prim, &[&top]))?);
                Instr::GetN(n)
            }
            Prim::UPDATE if args.len() == 1 => {
                let n = int_arg(prim, &args[0])?;
                let value = pop(s, prim)?;
                let top = pop(s, prim)?;
                s.push(update_n(&top, n, value.clone()).ok_or_else(|| ill_typed(prim, &[&value, &top]))?);
                Instr::UpdateN(n)
            }
            Prim::SOME => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                s.push(Type::option(top));
                Instr::Some
            }
            Prim::NONE => {
                arity(prim, args, 1)?;
                let ty = self.resolve(&args[0])?;
                s.push(Type::option(ty));
                Instr::None
            }
            Prim::LEFT | Prim::RIGHT => {
                arity(prim, args, 1)?;
                let other = self.resolve(&args[0])?;
                let top = pop(s, prim)?;
                if prim == Prim::LEFT {
                    s.push(Type::or(top, other));
                    Instr::Left
                } else {
                    s.push(Type::or(other, top));
                    Instr::Right
                }
            }
            Prim::NIL => {
                arity(prim, args, 1)?;
                let ty = self.resolve(&args[0])?;
                s.push(Type::list(ty));
                Instr::Nil
            }
            Prim::CONS => {
                arity(prim, args, 0)?;
                let elt = pop(s, prim)?;
                let list = pop(s, prim)?;
                match &list.kind {
                    TypeKind::List(t) if **t == *elt => {}
                    _ => return Err(ill_typed(prim, &[&elt, &list])),
                }
                s.push(list);
                Instr::Cons
            }
            Prim::SIZE => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                match &top.kind {
                    TypeKind::String
                    | TypeKind::Bytes
                    | TypeKind::List(_)
                    | TypeKind::Set(_)
                    | TypeKind::Map(..) => {}
                    _ => return Err(ill_typed(prim, &[&top])),
                }
                s.push(Type::nat());
                Instr::Size
            }
            Prim::EMPTY_SET => {
                arity(prim, args, 1)?;
                let elt = self.resolve(&args[0])?;
                if !elt.is_comparable() {
                    return Err(VMError::TypeMismatch(format!("{} is not comparable", elt)));
                }
                s.push(Type::set(elt));
                Instr::EmptySet
            }
            Prim::EMPTY_MAP | Prim::EMPTY_BIG_MAP => {
                arity(prim, args, 2)?;
                let node = Node::prim_args(
                    if prim == Prim::EMPTY_MAP { Prim::map } else { Prim::big_map },
                    args.to_vec(),
                );
                let ty = self.resolve(&node)?;
                let instr = match &ty.kind {
                    TypeKind::BigMap(k, v) => Instr::EmptyBigMap(k.clone(), v.clone()),
                    _ => Instr::EmptyMap,
                };
                s.push(ty);
                instr
            }
            Prim::MEM => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let coll = pop(s, prim)?;
                match &coll.kind {
                    TypeKind::Set(k) | TypeKind::Map(k, _) | TypeKind::BigMap(k, _) if **k == *key => {}
                    _ => return Err(ill_typed(prim, &[&key, &coll])),
                }
                s.push(Type::bool());
                Instr::Mem
            }
            Prim::GET => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let coll = pop(s, prim)?;
                match &coll.kind {
                    TypeKind::Map(k, v) | TypeKind::BigMap(k, v) if **k == *key => s.push(Type::option(v.clone())),
                    _ => return Err(ill_typed(prim, &[&key, &coll])),
                }
                Instr::Get
            }
            Prim::UPDATE => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let value = pop(s, prim)?;
                let coll = pop(s, prim)?;
                let ok = match &coll.kind {
                    TypeKind::Set(k) => **k == *key && value.kind == TypeKind::Bool,
                    TypeKind::Map(k, v) | TypeKind::BigMap(k, v) => {
                        **k == *key && matches!(&value.kind, TypeKind::Option(t) if t == v)
                    }
                    _ => false,
                };
                if !ok {
                    return Err(ill_typed(prim, &[&key, &value, &coll]));
                }
                s.push(coll);
                Instr::Update
            }
            Prim::GET_AND_UPDATE => {
                arity(prim, args, 0)?;
                let key = pop(s, prim)?;
                let value = pop(s, prim)?;
                let coll = pop(s, prim)?;
                let ok = match &coll.kind {
                    TypeKind::Map(k, v) | TypeKind::BigMap(k, v) => {
                        **k == *key && matches!(&value.kind, TypeKind::Option(t) if t == v)
                    }
                    _ => false,
                };
                if !ok {
                    return Err(ill_typed(prim, &[&key, &value, &coll]));
                }
                s.push(coll);
                s.push(value);
                Instr::GetAndUpdate
            }
            Prim::CONCAT => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                if matches!(top.kind, TypeKind::String | TypeKind::Bytes) {
                    let second = pop(s, prim)?;
                    if second != top {
                        return Err(ill_typed(prim, &[&top, &second]));
                    }
                    s.push(top);
                    Instr::Concat(ConcatForm::Pair)
                } else {
                    let elt = match &top.kind {
                        TypeKind::List(elt) if matches!(elt.kind, TypeKind::String | TypeKind::Bytes) => elt.clone(),
                        _ => return Err(ill_typed(prim, &[&top])),
                    };
                    let bytes = elt.kind == TypeKind::Bytes;
                    s.push(elt);
                    Instr::Concat(ConcatForm::List { bytes })
                }
            }
            Prim::SLICE => {
                arity(prim, args, 0)?;
                let offset = pop(s, prim)?;
                let length = pop(s, prim)?;
                let target = pop(s, prim)?;
                if offset.kind != TypeKind::Nat
                    || length.kind != TypeKind::Nat
                    || !matches!(target.kind, TypeKind::String | TypeKind::Bytes)
                {
                    return Err(ill_typed(prim, &[&offset, &length, &target]));
                }
                s.push(Type::option(target));
                Instr::Slice
            }
            Prim::PACK => {
                arity(prim, args, 0)?;
                let top = pop(s, prim)?;
                if !top.is_packable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be packed", top)));
                }
                s.push(Type::bytes());
                Instr::Pack(top)
            }
            Prim::UNPACK => {
                arity(prim, args, 1)?;
                let ty = self.resolve(&args[0])?;
                if !ty.is_packable() {
                    return Err(VMError::TypeMismatch(format!("{} cannot be unpacked", ty)));
                }
                let top = pop(s, prim)?;
                if top.kind != TypeKind::Bytes {
                    return Err(ill_typed(prim, &[&top]));
                }
                s.push(Type::option(ty.clone()));
                Instr::Unpack(ty)
            }
            Prim::parameter | Prim::storage | Prim::code => {
                arity(prim, args, 1)?;
                let node = args[0].clone();
                match prim {
                    Prim::parameter => Instr::SetParameter(node),
                    Prim::storage => Instr::SetStorage(node),
                    _ => Instr::SetCode(node),
                }
            }
            Prim::CREATE_ACCOUNT | Prim::STEPS_TO_QUOTA | Prim::TICKET_DEPRECATED => {
                return Err(VMError::Unsupported(format!("{} is deprecated", prim)));
            }
            _ if arith::handles(prim) => return arith::check(prim, args, stack),
            _ if prim.is_instr() => return self.check_domain(prim, args, annots, stack),
            _ => return Err(VMError::UnknownPrimitive(format!("{} is not an instruction", prim))),
        };
        Ok((instr, Some(stack)))
    }
}
