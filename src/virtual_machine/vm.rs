//! Stack machine running typed instruction trees.
//!
//! The interpreter walks the [`Block`]s produced by the checker. Before each
//! step it checks the live stack against the instruction's declared
//! [`StackDelta`](crate::virtual_machine::instr::StackDelta) and charges gas
//! through the configured [`CostModel`]; operand shapes are checked as values
//! are popped.
//!
//! Handlers are split by family:
//! - this module: stack manipulation and control flow
//! - [`collections`]: pairs, options, unions and containers
//! - [`arith`]: arithmetic, bitwise and comparison instructions
//! - [`domain`]: chain facts, operations, views, tickets, sapling and chests
//! - [`crypto`]: digests, signatures and pairings

mod arith;
mod collections;
pub mod context;
mod crypto;
mod domain;
pub mod gas;
mod stack;
#[cfg(test)]
mod tests;
pub mod trace;

use crate::config::InterpreterConfig;
use crate::core::ty::{Type, TypeInterner, TypeKind};
use crate::core::unparse::{Mode, unparse};
use crate::core::value::{Lambda, Value};
use crate::micheline::{Node, Prim};
use crate::virtual_machine::errors::VMError;
use crate::utils;
use crate::virtual_machine::instr::{Block, Instr};
use context::ExecContext;
use gas::{CostModel, DefaultCostModel, GasCategory, GasMeter, GasProfile};
use stack::Stack;
use std::sync::Arc;
use trace::{TraceEntry, TraceSink};

static DEFAULT_COST_MODEL: DefaultCostModel = DefaultCostModel;

macro_rules! exec_vm {
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $pat:pat => $handler:ident ( $( $arg:expr ),* ) ),* $(,)? }
    ) => {{
        let name = $instr.prim().name();
        match $instr {
            $( $pat => $vm.$handler(name $(, $arg )*), )*
        }
    }};
}

/// Interpreter for one run.
///
/// Owns the operand stack, the gas meter and the type interner; borrows the
/// chain context, lazy storage, cost model and trace sink for `'a`.
pub struct Interpreter<'a> {
    stack: Stack,
    pub(crate) ctx: ExecContext<'a>,
    gas: GasMeter,
    cost: &'a dyn CostModel,
    trace: Option<&'a mut dyn TraceSink>,
    pub(crate) interner: TypeInterner,
    max_depth: usize,
    depth: usize,
}

fn render(values: &[Value]) -> Vec<String> {
    values.iter().rev().map(Value::to_string).collect()
}

impl<'a> Interpreter<'a> {
    pub fn new(ctx: ExecContext<'a>, config: &InterpreterConfig) -> Self {
        Self {
            stack: Stack::default(),
            ctx,
            gas: GasMeter::new(config.gas_limit),
            cost: &DEFAULT_COST_MODEL,
            trace: None,
            interner: TypeInterner::new(),
            max_depth: config.max_depth,
            depth: 0,
        }
    }

    pub fn with_cost_model(mut self, cost: &'a dyn CostModel) -> Self {
        self.cost = cost;
        self
    }

    /// Records every executed instruction into `sink`.
    pub fn with_trace(mut self, sink: &'a mut dyn TraceSink) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Runs `code` on `input` (top-last) and returns the resulting stack.
    pub fn run(&mut self, code: &Block, input: Vec<Value>) -> Result<Vec<Value>, VMError> {
        self.stack = Stack::new(input);
        self.exec_block(code)?;
        Ok(std::mem::take(&mut self.stack).into_vec())
    }

    pub fn gas_used(&self) -> u64 {
        self.gas.used()
    }

    pub fn into_gas_profile(self) -> GasProfile {
        self.gas.into_profile()
    }

    /// Context after the run: slots replaced by program-slot instructions.
    pub fn context(&self) -> &ExecContext<'a> {
        &self.ctx
    }

    pub(crate) fn charge(&mut self, category: GasCategory, amount: u64) -> Result<(), VMError> {
        self.gas.charge(category, amount)
    }

    pub(crate) fn exec_block(&mut self, block: &Block) -> Result<(), VMError> {
        if self.depth >= self.max_depth {
            return Err(VMError::MaxDepthExceeded(self.max_depth));
        }
        self.depth += 1;
        let result = utils::stack::grow(|| block.instrs.iter().try_for_each(|instr| self.execute(instr)));
        self.depth -= 1;
        result
    }

    /// Executes a single instruction against the live stack.
    pub fn execute(&mut self, instr: &Instr) -> Result<(), VMError> {
        let prim = instr.prim();
        let delta = instr.stack_delta();
        self.stack.require(prim.name(), delta.consumed)?;

        let cost = self.cost;
        let size = cost.operands(instr, self.stack.top(delta.consumed.min(3)));
        self.gas.charge(GasCategory::Instruction, cost.base(instr))?;
        self.gas.charge(GasCategory::of(instr), size)?;

        let consumed = self
            .trace
            .is_some()
            .then(|| render(self.stack.top(delta.consumed)));
        let before = self.stack.len();

        self.exec(instr)?;

        if let Some(d) = instr.delta() {
            debug_assert_eq!(
                self.stack.len() as isize,
                before as isize + d.net(),
                "{} broke its stack delta",
                prim
            );
        }
        if let (Some(consumed), Some(sink)) = (consumed, self.trace.as_deref_mut()) {
            sink.record(TraceEntry {
                prim,
                consumed,
                produced: render(self.stack.top(delta.produced)),
            });
        }
        Ok(())
    }

    fn exec(&mut self, instr: &Instr) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            instr = instr,
            {
                // Stack
                Instr::Seq(block) => op_seq(block),
                Instr::Drop(n) => op_drop(*n),
                Instr::Dup(n) => op_dup(*n),
                Instr::Swap => op_swap(),
                Instr::Dig(n) => op_dig(*n),
                Instr::Dug(n) => op_dug(*n),
                Instr::Push(value) | Instr::Lambda(value) => op_push(value),
                Instr::Unit => op_unit(),
                Instr::Never => op_never(),
                Instr::Dip(n, block) => op_dip(*n, block),
                Instr::Cast | Instr::Rename => op_nop(),
                // Control
                Instr::Failwith(ty) => op_failwith(ty),
                Instr::If(t, f) => op_if(t, f),
                Instr::IfNone(none, some) => op_if_none(none, some),
                Instr::IfLeft(left, right) => op_if_left(left, right),
                Instr::IfCons(cons, nil) => op_if_cons(cons, nil),
                Instr::Loop(body) => op_loop(body),
                Instr::LoopLeft(body) => op_loop_left(body),
                Instr::Iter(body) => op_iter(body),
                Instr::Map(body) => op_map(body),
                Instr::Exec => op_exec(),
                Instr::Apply(ty) => op_apply(ty),
                // Structures
                Instr::Pair(n) => op_pair(*n),
                Instr::Unpair(n) => op_unpair(*n),
                Instr::Car => op_car(),
                Instr::Cdr => op_cdr(),
                Instr::GetN(n) => op_get_n(*n),
                Instr::UpdateN(n) => op_update_n(*n),
                Instr::Some => op_some(),
                Instr::None => op_none(),
                Instr::Left => op_left(),
                Instr::Right => op_right(),
                Instr::Nil => op_nil(),
                Instr::Cons => op_cons(),
                Instr::Size => op_size(),
                Instr::EmptySet => op_empty_set(),
                Instr::EmptyMap => op_empty_map(),
                Instr::EmptyBigMap(k, v) => op_empty_big_map(k, v),
                Instr::Mem => op_mem(),
                Instr::Get => op_get(),
                Instr::Update => op_update(),
                Instr::GetAndUpdate => op_get_and_update(),
                Instr::Concat(form) => op_concat(*form),
                Instr::Slice => op_slice(),
                Instr::Pack(ty) => op_pack(ty),
                Instr::Unpack(ty) => op_unpack(ty),
                // Arithmetic and logic
                Instr::Add => op_add(),
                Instr::Sub => op_sub(),
                Instr::SubMumav => op_sub_mumav(),
                Instr::Mul => op_mul(),
                Instr::Ediv => op_ediv(),
                Instr::Abs => op_abs(),
                Instr::IsNat => op_is_nat(),
                Instr::Int => op_int(),
                Instr::Nat => op_nat(),
                Instr::Bytes => op_bytes(),
                Instr::Neg => op_neg(),
                Instr::Lsl => op_lsl(),
                Instr::Lsr => op_lsr(),
                Instr::Or => op_or(),
                Instr::And => op_and(),
                Instr::Xor => op_xor(),
                Instr::Not => op_not(),
                Instr::Compare => op_compare(),
                Instr::Eq => op_test(|c| c == 0),
                Instr::Neq => op_test(|c| c != 0),
                Instr::Lt => op_test(|c| c < 0),
                Instr::Gt => op_test(|c| c > 0),
                Instr::Le => op_test(|c| c <= 0),
                Instr::Ge => op_test(|c| c >= 0),
                // Domain
                Instr::SelfContract(entrypoint) => op_self(entrypoint.as_deref()),
                Instr::SelfAddress => op_self_address(),
                Instr::Contract(ty, entrypoint) => op_contract(ty, entrypoint.as_deref()),
                Instr::TransferTokens(ty) => op_transfer_tokens(ty),
                Instr::SetDelegate => op_set_delegate(),
                Instr::CreateContract { storage_type, script } => op_create_contract(storage_type, script),
                Instr::ImplicitAccount => op_implicit_account(),
                Instr::VotingPower => op_voting_power(),
                Instr::TotalVotingPower => op_total_voting_power(),
                Instr::Now => op_now(),
                Instr::Level => op_level(),
                Instr::Amount => op_amount(),
                Instr::Balance => op_balance(),
                Instr::Sender => op_sender(),
                Instr::Source => op_source(),
                Instr::ChainId => op_chain_id(),
                Instr::Address => op_address(),
                Instr::MinBlockTime => op_min_block_time(),
                Instr::View(view, ret) => op_view(view, ret),
                Instr::Emit(tag, ty) => op_emit(tag, ty),
                // Crypto
                Instr::Blake2b => op_digest(crate::crypto::hashing::blake2b_256),
                Instr::Sha256 => op_digest(crate::crypto::hashing::sha256),
                Instr::Sha512 => op_digest(crate::crypto::hashing::sha512),
                Instr::Sha3 => op_digest(crate::crypto::hashing::sha3_256),
                Instr::Keccak => op_digest(crate::crypto::hashing::keccak_256),
                Instr::CheckSignature => op_check_signature(),
                Instr::HashKey => op_hash_key(),
                Instr::PairingCheck => op_pairing_check(),
                // Tickets
                Instr::Ticket(ty) => op_ticket(ty),
                Instr::ReadTicket => op_read_ticket(),
                Instr::SplitTicket => op_split_ticket(),
                Instr::JoinTickets => op_join_tickets(),
                // Sapling and chests
                Instr::SaplingEmptyState(memo_size) => op_sapling_empty_state(*memo_size),
                Instr::SaplingVerifyUpdate | Instr::OpenChest => op_unsupported(),
                // Program slots
                Instr::SetParameter(node) => op_set_parameter(node),
                Instr::SetStorage(node) => op_set_storage(node),
                Instr::SetCode(node) => op_set_code(node),
            }
        }
    }

    /// Runs `body` on a fresh stack holding `input` and returns its single result.
    pub(crate) fn run_nested(
        &mut self,
        instr: &'static str,
        body: &Block,
        input: Vec<Value>,
    ) -> Result<Value, VMError> {
        let outer = std::mem::replace(&mut self.stack, Stack::new(input));
        let result = self.exec_block(body);
        let mut inner = std::mem::replace(&mut self.stack, outer);
        result?;
        let value = inner.pop(instr)?;
        if inner.len() != 0 {
            return Err(VMError::TypeMismatch(format!(
                "{} left {} extra items on its stack",
                instr,
                inner.len()
            )));
        }
        Ok(value)
    }

    pub(crate) fn call_lambda(&mut self, instr: &'static str, lambda: Arc<Lambda>, arg: Value) -> Result<Value, VMError> {
        let mut input = Vec::with_capacity(2);
        if lambda.recursive {
            input.push(Value::Lambda(lambda.clone()));
        }
        input.push(arg);
        self.run_nested(instr, &lambda.body, input)
    }

    // ==================== Stack ====================

    fn op_seq(&mut self, _instr: &'static str, block: &Block) -> Result<(), VMError> {
        self.exec_block(block)
    }

    fn op_drop(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.stack.drop_n(instr, n)
    }

    fn op_dup(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.stack.dup(instr, n)
    }

    fn op_swap(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.stack.swap(instr)
    }

    fn op_dig(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.stack.dig(instr, n)
    }

    fn op_dug(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.stack.dug(instr, n)
    }

    fn op_push(&mut self, _instr: &'static str, value: &Value) -> Result<(), VMError> {
        self.stack.push(value.clone());
        Ok(())
    }

    fn op_unit(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.stack.push(Value::Unit);
        Ok(())
    }

    fn op_never(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        Err(stack::expected(instr, "never", &value))
    }

    fn op_dip(&mut self, instr: &'static str, n: usize, block: &Block) -> Result<(), VMError> {
        let top = self.stack.split_off(instr, n)?;
        self.exec_block(block)?;
        self.stack.extend(top);
        Ok(())
    }

    fn op_nop(&mut self, _instr: &'static str) -> Result<(), VMError> {
        Ok(())
    }

    // ==================== Control ====================

    fn op_failwith(&mut self, instr: &'static str, ty: &Arc<Type>) -> Result<(), VMError> {
        let value = self.stack.pop(instr)?;
        Err(VMError::ScriptFailed(unparse(&value, ty, Mode::Readable)?))
    }

    fn op_if(&mut self, instr: &'static str, t: &Block, f: &Block) -> Result<(), VMError> {
        if self.stack.pop_bool(instr)? {
            self.exec_block(t)
        } else {
            self.exec_block(f)
        }
    }

    fn op_if_none(&mut self, instr: &'static str, none: &Block, some: &Block) -> Result<(), VMError> {
        match self.stack.pop_option(instr)? {
            None => self.exec_block(none),
            Some(value) => {
                self.stack.push(value);
                self.exec_block(some)
            }
        }
    }

    fn op_if_left(&mut self, instr: &'static str, left: &Block, right: &Block) -> Result<(), VMError> {
        match self.stack.pop(instr)? {
            Value::Left(value) => {
                self.stack.push(*value);
                self.exec_block(left)
            }
            Value::Right(value) => {
                self.stack.push(*value);
                self.exec_block(right)
            }
            other => Err(stack::expected(instr, "or", &other)),
        }
    }

    fn op_if_cons(&mut self, instr: &'static str, cons: &Block, nil: &Block) -> Result<(), VMError> {
        let mut items = self.stack.pop_list(instr)?;
        if items.is_empty() {
            return self.exec_block(nil);
        }
        let head = items.remove(0);
        self.stack.push(Value::List(items));
        self.stack.push(head);
        self.exec_block(cons)
    }

    fn op_loop(&mut self, instr: &'static str, body: &Block) -> Result<(), VMError> {
        while self.stack.pop_bool(instr)? {
            self.exec_block(body)?;
        }
        Ok(())
    }

    fn op_loop_left(&mut self, instr: &'static str, body: &Block) -> Result<(), VMError> {
        loop {
            match self.stack.pop(instr)? {
                Value::Left(value) => {
                    self.stack.push(*value);
                    self.exec_block(body)?;
                }
                Value::Right(value) => {
                    self.stack.push(*value);
                    return Ok(());
                }
                other => return Err(stack::expected(instr, "or", &other)),
            }
        }
    }

    fn op_iter(&mut self, instr: &'static str, body: &Block) -> Result<(), VMError> {
        let items: Vec<Value> = match self.stack.pop(instr)? {
            Value::List(items) => items,
            Value::Set(items) => items.into_iter().collect(),
            Value::Map(entries) => entries.into_iter().map(|(k, v)| Value::pair(k, v)).collect(),
            other => return Err(stack::expected(instr, "list, set or map", &other)),
        };
        for item in items {
            self.stack.push(item);
            self.exec_block(body)?;
        }
        Ok(())
    }

    fn op_map(&mut self, instr: &'static str, body: &Block) -> Result<(), VMError> {
        let mapped = match self.stack.pop(instr)? {
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.stack.push(item);
                    self.exec_block(body)?;
                    out.push(self.stack.pop(instr)?);
                }
                Value::List(out)
            }
            Value::Map(entries) => {
                let mut out = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    self.stack.push(Value::pair(key.clone(), value));
                    self.exec_block(body)?;
                    out.insert(key, self.stack.pop(instr)?);
                }
                Value::Map(out)
            }
            other => return Err(stack::expected(instr, "list or map", &other)),
        };
        self.stack.push(mapped);
        Ok(())
    }

    fn op_exec(&mut self, instr: &'static str) -> Result<(), VMError> {
        let arg = self.stack.pop(instr)?;
        let lambda = match self.stack.pop(instr)? {
            Value::Lambda(lambda) => lambda,
            other => return Err(stack::expected(instr, "lambda", &other)),
        };
        let result = self.call_lambda(instr, lambda, arg)?;
        self.stack.push(result);
        Ok(())
    }

    /// Partial application: the captured value is pushed and paired with the
    /// remaining argument before the original body runs.
    fn op_apply(&mut self, instr: &'static str, captured_type: &Arc<Type>) -> Result<(), VMError> {
        let captured = self.stack.pop(instr)?;
        let lambda = match self.stack.pop(instr)? {
            Value::Lambda(lambda) => lambda,
            other => return Err(stack::expected(instr, "lambda", &other)),
        };
        let TypeKind::Pair(_, rest) = &lambda.arg.kind else {
            return Err(VMError::TypeMismatch(format!("{} cannot capture into {}", instr, lambda.arg)));
        };
        let push = Node::prim_args(
            Prim::PUSH,
            vec![captured_type.to_node(), unparse(&captured, captured_type, Mode::Optimized)?],
        );
        let (code, body) = if lambda.recursive {
            let rec = Node::prim_args(
                Prim::LAMBDA_REC,
                vec![lambda.arg.to_node(), lambda.ret.to_node(), lambda.code.clone()],
            );
            (
                vec![push, Node::prim(Prim::PAIR), rec, Node::prim(Prim::SWAP), Node::prim(Prim::EXEC)],
                vec![
                    Instr::Push(captured),
                    Instr::Pair(2),
                    Instr::Lambda(Value::Lambda(lambda.clone())),
                    Instr::Swap,
                    Instr::Exec,
                ],
            )
        } else {
            (
                vec![push, Node::prim(Prim::PAIR), lambda.code.clone()],
                vec![Instr::Push(captured), Instr::Pair(2), Instr::Seq(lambda.body.clone())],
            )
        };
        self.stack.push(Value::Lambda(Arc::new(Lambda {
            arg: rest.clone(),
            ret: lambda.ret.clone(),
            code: Node::Seq(code),
            body: Block::new(body),
            recursive: false,
        })));
        Ok(())
    }

    // ==================== Program slots ====================

    fn op_set_parameter(&mut self, _instr: &'static str, node: &Node) -> Result<(), VMError> {
        self.ctx.slots.parameter = Some(node.clone());
        Ok(())
    }

    fn op_set_storage(&mut self, _instr: &'static str, node: &Node) -> Result<(), VMError> {
        self.ctx.slots.storage = Some(node.clone());
        Ok(())
    }

    fn op_set_code(&mut self, _instr: &'static str, node: &Node) -> Result<(), VMError> {
        self.ctx.slots.code = Some(node.clone());
        Ok(())
    }
}
