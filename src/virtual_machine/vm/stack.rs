use crate::core::value::{Ticket, Value};
use crate::types::address::Destination;
use crate::virtual_machine::errors::VMError;
use num_bigint::BigInt;

/// Operand stack, stored top-last.
///
/// Typed pops check the shape of the value they remove and fail with
/// [`VMError::TypeMismatch`] when it differs from what the instruction expects.
#[derive(Clone, Debug, Default)]
pub(crate) struct Stack {
    items: Vec<Value>,
}

fn mismatch(instr: &'static str, expected: &str, actual: &Value) -> VMError {
    VMError::TypeMismatch(format!(
        "{} expected {}, found {}",
        instr,
        expected,
        actual.kind_name()
    ))
}

macro_rules! typed_pop {
    ($name:ident, $expected:literal, $ty:ty, $pat:pat => $out:expr) => {
        pub(crate) fn $name(&mut self, instr: &'static str) -> Result<$ty, VMError> {
            match self.pop(instr)? {
                $pat => Ok($out),
                other => Err(mismatch(instr, $expected, &other)),
            }
        }
    };
}

impl Stack {
    pub(crate) fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn into_vec(self) -> Vec<Value> {
        self.items
    }

    /// Fails with `StackUnderflow` unless at least `n` items are live.
    pub(crate) fn require(&self, instr: &'static str, n: usize) -> Result<(), VMError> {
        if self.items.len() < n {
            return Err(VMError::StackUnderflow {
                instruction: instr,
                required: n,
                available: self.items.len(),
            });
        }
        Ok(())
    }

    /// The `n` topmost items, deepest first.
    pub(crate) fn top(&self, n: usize) -> &[Value] {
        &self.items[self.items.len().saturating_sub(n)..]
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    pub(crate) fn pop(&mut self, instr: &'static str) -> Result<Value, VMError> {
        self.require(instr, 1)?;
        self.items.pop().ok_or(VMError::StackUnderflow {
            instruction: instr,
            required: 1,
            available: 0,
        })
    }

    /// Removes the `n` topmost items, deepest first.
    pub(crate) fn split_off(&mut self, instr: &'static str, n: usize) -> Result<Vec<Value>, VMError> {
        self.require(instr, n)?;
        Ok(self.items.split_off(self.items.len() - n))
    }

    pub(crate) fn extend(&mut self, values: Vec<Value>) {
        self.items.extend(values);
    }

    pub(crate) fn drop_n(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.require(instr, n)?;
        self.items.truncate(self.items.len() - n);
        Ok(())
    }

    /// Copies the `n`-th item (1 being the top) onto the top.
    pub(crate) fn dup(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.require(instr, n.max(1))?;
        let value = self.items[self.items.len() - n.max(1)].clone();
        self.items.push(value);
        Ok(())
    }

    pub(crate) fn swap(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.require(instr, 2)?;
        let len = self.items.len();
        self.items.swap(len - 1, len - 2);
        Ok(())
    }

    /// Moves the item at depth `n` (0 being the top) to the top.
    pub(crate) fn dig(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.require(instr, n + 1)?;
        let value = self.items.remove(self.items.len() - 1 - n);
        self.items.push(value);
        Ok(())
    }

    /// Moves the top item down to depth `n`.
    pub(crate) fn dug(&mut self, instr: &'static str, n: usize) -> Result<(), VMError> {
        self.require(instr, n + 1)?;
        let value = self.pop(instr)?;
        let at = self.items.len() - n;
        self.items.insert(at, value);
        Ok(())
    }

    typed_pop!(pop_bool, "bool", bool, Value::Bool(b) => b);
    typed_pop!(pop_int, "int", BigInt, Value::Int(n) => n);
    typed_pop!(pop_nat, "nat", BigInt, Value::Nat(n) => n);
    typed_pop!(pop_bytes, "bytes", Vec<u8>, Value::Bytes(b) => b);
    typed_pop!(pop_mumav, "mumav", i64, Value::Mumav(m) => m);
    typed_pop!(pop_list, "list", Vec<Value>, Value::List(items) => items);
    typed_pop!(pop_address, "address", Destination, Value::Address(d) => d);
    typed_pop!(pop_ticket, "ticket", Ticket, Value::Ticket(t) => *t);
    typed_pop!(pop_pair, "pair", (Value, Value), Value::Pair(a, b) => (*a, *b));
    typed_pop!(pop_option, "option", Option<Value>, Value::Option(v) => v.map(|v| *v));
}

/// Shape error raised when a value does not fit the instruction.
pub(crate) fn expected(instr: &'static str, what: &str, actual: &Value) -> VMError {
    mismatch(instr, what, actual)
}
