//! Typed instruction tree produced by the checker and run by the interpreter.
//!
//! Instructions only carry the type information the interpreter cannot
//! recover from operand values: types needed to unparse values (`PACK`,
//! `FAILWITH`, `TRANSFER_TOKENS`...), to build typed containers
//! (`EMPTY_BIG_MAP`, `TICKET`) or to check foreign data (`UNPACK`, `CONTRACT`).
//!
//! Every instruction declares a static [`StackDelta`]: how deep into the
//! stack it reaches and how many items it leaves in their place.

use crate::core::ty::Type;
use crate::core::value::Value;
use crate::micheline::Node;
use crate::virtual_machine::isa::Prim;
use std::sync::Arc;

/// Items consumed from the top of the stack and items produced in their place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackDelta {
    pub consumed: usize,
    pub produced: usize,
}

impl StackDelta {
    pub const fn new(consumed: usize, produced: usize) -> Self {
        Self { consumed, produced }
    }

    /// Effect of running `self` then `next`.
    pub fn then(self, next: StackDelta) -> StackDelta {
        StackDelta {
            consumed: self.consumed + next.consumed.saturating_sub(self.produced),
            produced: next.produced + self.produced.saturating_sub(next.consumed),
        }
    }

    /// Widens the delta so it reaches at least `depth` items.
    fn reaching(self, depth: usize) -> StackDelta {
        let extra = depth.saturating_sub(self.consumed);
        StackDelta::new(self.consumed + extra, self.produced + extra)
    }

    /// Common delta of two branches with the same net effect.
    fn join(a: Option<StackDelta>, b: Option<StackDelta>) -> Option<StackDelta> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.reaching(b.consumed).max_with(b.reaching(a.consumed))),
            (Some(d), None) | (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }

    fn max_with(self, other: StackDelta) -> StackDelta {
        if other.consumed > self.consumed { other } else { self }
    }

    /// Signed change in stack length.
    pub fn net(&self) -> isize {
        self.produced as isize - self.consumed as isize
    }
}

/// An instruction sequence with its precomputed delta.
///
/// `delta` is `None` when the sequence always fails.
#[derive(Clone, Debug)]
pub struct Block {
    pub instrs: Arc<Vec<Instr>>,
    pub delta: Option<StackDelta>,
}

impl Block {
    pub fn new(instrs: Vec<Instr>) -> Self {
        let mut delta = Some(StackDelta::new(0, 0));
        for instr in &instrs {
            delta = match (delta, instr.delta()) {
                (Some(acc), Some(d)) => Some(acc.then(d)),
                _ => None,
            };
        }
        Self {
            instrs: Arc::new(instrs),
            delta,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn fails(&self) -> bool {
        self.delta.is_none()
    }
}

/// Operand form of `CONCAT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcatForm {
    /// Two strings or two bytes.
    Pair,
    /// A list of strings, or of bytes when `bytes` is set.
    List { bytes: bool },
}

#[derive(Clone, Debug)]
pub enum Instr {
    /// Nested `{ ... }` sequence.
    Seq(Block),

    // stack
    Drop(usize),
    Dup(usize),
    Swap,
    Dig(usize),
    Dug(usize),
    Push(Value),
    Unit,
    Never,
    /// Holds the closure value, `recursive` set for `LAMBDA_REC`.
    Lambda(Value),
    Dip(usize, Block),
    Cast,
    Rename,

    // control
    Failwith(Arc<Type>),
    If(Block, Block),
    IfNone(Block, Block),
    IfLeft(Block, Block),
    IfCons(Block, Block),
    Loop(Block),
    LoopLeft(Block),
    Iter(Block),
    Map(Block),
    Exec,
    /// Type of the captured argument.
    Apply(Arc<Type>),

    // structures
    Pair(usize),
    Unpair(usize),
    Car,
    Cdr,
    GetN(usize),
    UpdateN(usize),
    Some,
    None,
    Left,
    Right,
    Nil,
    Cons,
    Size,
    EmptySet,
    EmptyMap,
    EmptyBigMap(Arc<Type>, Arc<Type>),
    Mem,
    Get,
    Update,
    GetAndUpdate,
    Concat(ConcatForm),
    Slice,
    Pack(Arc<Type>),
    Unpack(Arc<Type>),

    // arithmetic and logic
    Add,
    Sub,
    SubMumav,
    Mul,
    Ediv,
    Abs,
    IsNat,
    Int,
    Nat,
    Bytes,
    Neg,
    Lsl,
    Lsr,
    Or,
    And,
    Xor,
    Not,
    Compare,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,

    // domain
    SelfContract(Option<String>),
    SelfAddress,
    Contract(Arc<Type>, Option<String>),
    TransferTokens(Arc<Type>),
    SetDelegate,
    CreateContract {
        storage_type: Arc<Type>,
        script: Node,
    },
    ImplicitAccount,
    VotingPower,
    TotalVotingPower,
    Now,
    Level,
    Amount,
    Balance,
    Sender,
    Source,
    ChainId,
    Address,
    MinBlockTime,
    /// View name and declared return type.
    View(String, Arc<Type>),
    Emit(Option<String>, Arc<Type>),

    // crypto
    Blake2b,
    Sha256,
    Sha512,
    Sha3,
    Keccak,
    CheckSignature,
    HashKey,
    PairingCheck,

    // tickets
    Ticket(Arc<Type>),
    ReadTicket,
    SplitTicket,
    JoinTickets,

    // sapling and chests
    SaplingEmptyState(u16),
    SaplingVerifyUpdate,
    OpenChest,

    // program slots
    SetParameter(Node),
    SetStorage(Node),
    SetCode(Node),
}

const fn d(consumed: usize, produced: usize) -> Option<StackDelta> {
    Some(StackDelta::new(consumed, produced))
}

impl Instr {
    /// Static stack effect; `None` for instructions that never return.
    pub fn delta(&self) -> Option<StackDelta> {
        match self {
            Instr::Seq(b) => b.delta,
            Instr::Drop(n) => d(*n, 0),
            Instr::Dup(n) => d(*n, n + 1),
            Instr::Swap => d(2, 2),
            Instr::Dig(n) | Instr::Dug(n) => d(n + 1, n + 1),
            Instr::Push(_)
            | Instr::Unit
            | Instr::Lambda(_)
            | Instr::Nil
            | Instr::None
            | Instr::EmptySet
            | Instr::EmptyMap
            | Instr::EmptyBigMap(..)
            | Instr::SelfContract(_)
            | Instr::SelfAddress
            | Instr::TotalVotingPower
            | Instr::Now
            | Instr::Level
            | Instr::Amount
            | Instr::Balance
            | Instr::Sender
            | Instr::Source
            | Instr::ChainId
            | Instr::MinBlockTime
            | Instr::SaplingEmptyState(_) => d(0, 1),
            Instr::Never | Instr::Failwith(_) => None,
            Instr::Cast
            | Instr::Rename
            | Instr::SetParameter(_)
            | Instr::SetStorage(_)
            | Instr::SetCode(_) => d(0, 0),
            Instr::Dip(n, b) => b.delta.map(|x| StackDelta::new(n + x.consumed, n + x.produced)),
            Instr::If(t, f) => StackDelta::join(
                t.delta.map(|x| StackDelta::new(1, 0).then(x)),
                f.delta.map(|x| StackDelta::new(1, 0).then(x)),
            ),
            Instr::IfNone(none, some) => StackDelta::join(
                none.delta.map(|x| StackDelta::new(1, 0).then(x)),
                some.delta.map(|x| StackDelta::new(1, 1).then(x)),
            ),
            Instr::IfLeft(l, r) => StackDelta::join(
                l.delta.map(|x| StackDelta::new(1, 1).then(x)),
                r.delta.map(|x| StackDelta::new(1, 1).then(x)),
            ),
            Instr::IfCons(cons, nil) => StackDelta::join(
                cons.delta.map(|x| StackDelta::new(1, 2).then(x)),
                nil.delta.map(|x| StackDelta::new(1, 0).then(x)),
            ),
            Instr::Loop(b) => match b.delta {
                Some(x) => d(1 + x.consumed, x.consumed),
                None => d(1, 0),
            },
            Instr::LoopLeft(b) | Instr::Map(b) => {
                let depth = b.delta.map_or(1, |x| x.consumed.max(1));
                d(depth, depth)
            }
            Instr::Iter(b) => {
                let depth = b.delta.map_or(1, |x| x.consumed.max(1));
                d(depth, depth - 1)
            }
            Instr::Exec | Instr::Apply(_) => d(2, 1),
            Instr::Pair(n) => d(*n, 1),
            Instr::Unpair(n) => d(1, *n),
            Instr::Car
            | Instr::Cdr
            | Instr::GetN(_)
            | Instr::Some
            | Instr::Left
            | Instr::Right
            | Instr::Size
            | Instr::Concat(ConcatForm::List { .. })
            | Instr::Pack(_)
            | Instr::Unpack(_)
            | Instr::Abs
            | Instr::IsNat
            | Instr::Int
            | Instr::Nat
            | Instr::Bytes
            | Instr::Neg
            | Instr::Not
            | Instr::Eq
            | Instr::Neq
            | Instr::Lt
            | Instr::Gt
            | Instr::Le
            | Instr::Ge
            | Instr::Contract(..)
            | Instr::SetDelegate
            | Instr::ImplicitAccount
            | Instr::VotingPower
            | Instr::Address
            | Instr::Emit(..)
            | Instr::Blake2b
            | Instr::Sha256
            | Instr::Sha512
            | Instr::Sha3
            | Instr::Keccak
            | Instr::HashKey
            | Instr::PairingCheck
            | Instr::JoinTickets => d(1, 1),
            Instr::UpdateN(_)
            | Instr::Cons
            | Instr::Mem
            | Instr::Get
            | Instr::Concat(ConcatForm::Pair)
            | Instr::Add
            | Instr::Sub
            | Instr::SubMumav
            | Instr::Mul
            | Instr::Ediv
            | Instr::Lsl
            | Instr::Lsr
            | Instr::Or
            | Instr::And
            | Instr::Xor
            | Instr::Compare
            | Instr::View(..)
            | Instr::Ticket(_)
            | Instr::SplitTicket
            | Instr::SaplingVerifyUpdate => d(2, 1),
            Instr::Update | Instr::Slice | Instr::TransferTokens(_) | Instr::CheckSignature | Instr::OpenChest => {
                d(3, 1)
            }
            Instr::GetAndUpdate | Instr::CreateContract { .. } => d(3, 2),
            Instr::ReadTicket => d(1, 2),
        }
    }

    /// Delta used for the pre-execution depth check and the post-execution length check.
    pub fn stack_delta(&self) -> StackDelta {
        self.delta().unwrap_or_else(|| match self {
            Instr::Dip(n, _) => StackDelta::new(*n, 0),
            Instr::Seq(_) => StackDelta::new(0, 0),
            _ => StackDelta::new(1, 0),
        })
    }

    /// Primitive this instruction was written with.
    pub fn prim(&self) -> Prim {
        match self {
            Instr::Seq(_) => Prim::code,
            Instr::Drop(_) => Prim::DROP,
            Instr::Dup(_) => Prim::DUP,
            Instr::Swap => Prim::SWAP,
            Instr::Dig(_) => Prim::DIG,
            Instr::Dug(_) => Prim::DUG,
            Instr::Push(_) => Prim::PUSH,
            Instr::Unit => Prim::UNIT,
            Instr::Never => Prim::NEVER,
            Instr::Lambda(Value::Lambda(l)) if l.recursive => Prim::LAMBDA_REC,
            Instr::Lambda(_) => Prim::LAMBDA,
            Instr::Dip(..) => Prim::DIP,
            Instr::Cast => Prim::CAST,
            Instr::Rename => Prim::RENAME,
            Instr::Failwith(_) => Prim::FAILWITH,
            Instr::If(..) => Prim::IF,
            Instr::IfNone(..) => Prim::IF_NONE,
            Instr::IfLeft(..) => Prim::IF_LEFT,
            Instr::IfCons(..) => Prim::IF_CONS,
            Instr::Loop(_) => Prim::LOOP,
            Instr::LoopLeft(_) => Prim::LOOP_LEFT,
            Instr::Iter(_) => Prim::ITER,
            Instr::Map(_) => Prim::MAP,
            Instr::Exec => Prim::EXEC,
            Instr::Apply(_) => Prim::APPLY,
            Instr::Pair(_) => Prim::PAIR,
            Instr::Unpair(_) => Prim::UNPAIR,
            Instr::Car => Prim::CAR,
            Instr::Cdr => Prim::CDR,
            Instr::GetN(_) | Instr::Get => Prim::GET,
            Instr::UpdateN(_) | Instr::Update => Prim::UPDATE,
            Instr::Some => Prim::SOME,
            Instr::None => Prim::NONE,
            Instr::Left => Prim::LEFT,
            Instr::Right => Prim::RIGHT,
            Instr::Nil => Prim::NIL,
            Instr::Cons => Prim::CONS,
            Instr::Size => Prim::SIZE,
            Instr::EmptySet => Prim::EMPTY_SET,
            Instr::EmptyMap => Prim::EMPTY_MAP,
            Instr::EmptyBigMap(..) => Prim::EMPTY_BIG_MAP,
            Instr::Mem => Prim::MEM,
            Instr::GetAndUpdate => Prim::GET_AND_UPDATE,
            Instr::Concat(_) => Prim::CONCAT,
            Instr::Slice => Prim::SLICE,
            Instr::Pack(_) => Prim::PACK,
            Instr::Unpack(_) => Prim::UNPACK,
            Instr::Add => Prim::ADD,
            Instr::Sub => Prim::SUB,
            Instr::SubMumav => Prim::SUB_MUMAV,
            Instr::Mul => Prim::MUL,
            Instr::Ediv => Prim::EDIV,
            Instr::Abs => Prim::ABS,
            Instr::IsNat => Prim::ISNAT,
            Instr::Int => Prim::INT,
            Instr::Nat => Prim::NAT,
            Instr::Bytes => Prim::BYTES,
            Instr::Neg => Prim::NEG,
            Instr::Lsl => Prim::LSL,
            Instr::Lsr => Prim::LSR,
            Instr::Or => Prim::OR,
            Instr::And => Prim::AND,
            Instr::Xor => Prim::XOR,
            Instr::Not => Prim::NOT,
            Instr::Compare => Prim::COMPARE,
            Instr::Eq => Prim::EQ,
            Instr::Neq => Prim::NEQ,
            Instr::Lt => Prim::LT,
            Instr::Gt => Prim::GT,
            Instr::Le => Prim::LE,
            Instr::Ge => Prim::GE,
            Instr::SelfContract(_) => Prim::SELF,
            Instr::SelfAddress => Prim::SELF_ADDRESS,
            Instr::Contract(..) => Prim::CONTRACT,
            Instr::TransferTokens(_) => Prim::TRANSFER_TOKENS,
            Instr::SetDelegate => Prim::SET_DELEGATE,
            Instr::CreateContract { .. } => Prim::CREATE_CONTRACT,
            Instr::ImplicitAccount => Prim::IMPLICIT_ACCOUNT,
            Instr::VotingPower => Prim::VOTING_POWER,
            Instr::TotalVotingPower => Prim::TOTAL_VOTING_POWER,
            Instr::Now => Prim::NOW,
            Instr::Level => Prim::LEVEL,
            Instr::Amount => Prim::AMOUNT,
            Instr::Balance => Prim::BALANCE,
            Instr::Sender => Prim::SENDER,
            Instr::Source => Prim::SOURCE,
            Instr::ChainId => Prim::CHAIN_ID,
            Instr::Address => Prim::ADDRESS,
            Instr::MinBlockTime => Prim::MIN_BLOCK_TIME,
            Instr::View(..) => Prim::VIEW,
            Instr::Emit(..) => Prim::EMIT,
            Instr::Blake2b => Prim::BLAKE2B,
            Instr::Sha256 => Prim::SHA256,
            Instr::Sha512 => Prim::SHA512,
            Instr::Sha3 => Prim::SHA3,
            Instr::Keccak => Prim::KECCAK,
            Instr::CheckSignature => Prim::CHECK_SIGNATURE,
            Instr::HashKey => Prim::HASH_KEY,
            Instr::PairingCheck => Prim::PAIRING_CHECK,
            Instr::Ticket(_) => Prim::TICKET,
            Instr::ReadTicket => Prim::READ_TICKET,
            Instr::SplitTicket => Prim::SPLIT_TICKET,
            Instr::JoinTickets => Prim::JOIN_TICKETS,
            Instr::SaplingEmptyState(_) => Prim::SAPLING_EMPTY_STATE,
            Instr::SaplingVerifyUpdate => Prim::SAPLING_VERIFY_UPDATE,
            Instr::OpenChest => Prim::OPEN_CHEST,
            Instr::SetParameter(_) => Prim::parameter,
            Instr::SetStorage(_) => Prim::storage,
            Instr::SetCode(_) => Prim::code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition() {
        let push = StackDelta::new(0, 1);
        let add = StackDelta::new(2, 1);
        assert_eq!(push.then(add), StackDelta::new(1, 1));
        assert_eq!(add.then(push), StackDelta::new(2, 2));
        assert_eq!(Block::new(vec![Instr::Drop(1), Instr::Unit, Instr::Swap]).delta, Some(StackDelta::new(2, 2)));
    }

    #[test]
    fn failing_blocks() {
        let fails = Block::new(vec![Instr::Unit, Instr::Failwith(Type::unit())]);
        assert!(fails.fails());
        let branch = Instr::If(fails, Block::new(vec![Instr::Drop(1)]));
        assert_eq!(branch.delta(), Some(StackDelta::new(2, 0)));
    }

    #[test]
    fn branches_are_widened_to_the_deepest_arm() {
        let a = Block::new(vec![Instr::Drop(1), Instr::Unit]);
        let b = Block::empty();
        let instr = Instr::If(a, b);
        let delta = instr.delta().unwrap();
        assert_eq!(delta, StackDelta::new(2, 1));
        assert_eq!(delta.net(), -1);
    }

    #[test]
    fn loops() {
        let body = Block::new(vec![Instr::Push(Value::Bool(false))]);
        assert_eq!(Instr::Loop(body).delta(), Some(StackDelta::new(1, 0)));
        let iter_body = Block::new(vec![Instr::Drop(1)]);
        assert_eq!(Instr::Iter(iter_body).delta(), Some(StackDelta::new(1, 0)));
        assert_eq!(Instr::Dip(2, Block::new(vec![Instr::Drop(1)])).delta(), Some(StackDelta::new(3, 2)));
    }
}
