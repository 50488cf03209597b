use crate::core::value::Value;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::instr::Instr;

/// Number of gas categories tracked by [`GasProfile`].
const GAS_CATEGORY_COUNT: usize = 6;

/// Categories of gas consumption for profiling and debugging.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum GasCategory {
    /// Fixed cost of dispatching an instruction.
    Instruction = 0,
    /// Cost proportional to the size of the operands.
    OperandSize = 1,
    /// Reading big map entries from lazy storage.
    StorageRead = 2,
    /// Digests, signature checks and curve arithmetic.
    Crypto = 3,
    /// `PACK`, `UNPACK` and unparsing of operation payloads.
    Serialization = 4,
    /// Contract lookups, views and emitted operations.
    Interop = 5,
}

impl GasCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            GasCategory::Instruction => "Instruction",
            GasCategory::OperandSize => "Operand Size",
            GasCategory::StorageRead => "Storage Read",
            GasCategory::Crypto => "Crypto",
            GasCategory::Serialization => "Serialization",
            GasCategory::Interop => "Interop",
        }
    }

    /// All categories in discriminant order.
    const ALL: [GasCategory; GAS_CATEGORY_COUNT] = [
        GasCategory::Instruction,
        GasCategory::OperandSize,
        GasCategory::StorageRead,
        GasCategory::Crypto,
        GasCategory::Serialization,
        GasCategory::Interop,
    ];

    /// Category the operand-size term of `instr` is booked under.
    pub fn of(instr: &Instr) -> GasCategory {
        match instr {
            Instr::Blake2b
            | Instr::Sha256
            | Instr::Sha512
            | Instr::Sha3
            | Instr::Keccak
            | Instr::CheckSignature
            | Instr::HashKey
            | Instr::PairingCheck => GasCategory::Crypto,
            Instr::Pack(_) | Instr::Unpack(_) | Instr::TransferTokens(_) | Instr::Emit(..) => {
                GasCategory::Serialization
            }
            Instr::Contract(..) | Instr::View(..) | Instr::CreateContract { .. } => GasCategory::Interop,
            _ => GasCategory::OperandSize,
        }
    }
}

/// Gas consumption profile for debugging and optimization.
///
/// Backed by a flat array indexed by [`GasCategory`] discriminant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasProfile {
    counts: [u64; GAS_CATEGORY_COUNT],
}

impl Default for GasProfile {
    fn default() -> Self {
        Self {
            counts: [0; GAS_CATEGORY_COUNT],
        }
    }
}

impl GasProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds gas to the specified category.
    #[inline(always)]
    pub fn add(&mut self, category: GasCategory, amount: u64) {
        let slot = &mut self.counts[category as usize];
        *slot = slot.saturating_add(amount);
    }

    /// Returns the total gas across all categories.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |acc, &v| acc.saturating_add(v))
    }

    pub fn get(&self, category: GasCategory) -> u64 {
        self.counts[category as usize]
    }

    /// Returns an iterator over all categories and their gas costs.
    pub fn iter(&self) -> impl Iterator<Item = (GasCategory, u64)> {
        GasCategory::ALL.into_iter().zip(self.counts)
    }
}

/// Pricing policy for interpreter steps.
///
/// `operands` holds at most the three topmost items the instruction
/// consumes, deepest first.
pub trait CostModel: Send + Sync {
    /// Fixed cost of dispatching `instr`.
    fn base(&self, instr: &Instr) -> u64;

    /// Data-dependent cost of `instr` on `operands`.
    fn operands(&self, instr: &Instr, operands: &[Value]) -> u64;

    /// Cost of loading a stored entry of `size` bytes.
    fn storage_read(&self, size: usize) -> u64 {
        10 + size as u64 / 4
    }
}

/// Per-primitive base costs plus a linear term in the operand sizes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn base(&self, instr: &Instr) -> u64 {
        instr.prim().base_gas()
    }

    fn operands(&self, instr: &Instr, operands: &[Value]) -> u64 {
        match instr {
            Instr::Seq(_)
            | Instr::Dip(..)
            | Instr::If(..)
            | Instr::IfNone(..)
            | Instr::IfLeft(..)
            | Instr::IfCons(..)
            | Instr::Loop(_)
            | Instr::LoopLeft(_)
            | Instr::Exec
            | Instr::Drop(_)
            | Instr::Swap
            | Instr::Dig(_)
            | Instr::Dug(_) => 0,
            _ => {
                let size: usize = operands.iter().map(Value::size).sum();
                match GasCategory::of(instr) {
                    GasCategory::Crypto => size as u64,
                    GasCategory::Serialization => size as u64 / 2,
                    _ => size as u64 / 8,
                }
            }
        }
    }
}

/// Running gas account for one interpretation.
#[derive(Clone, Debug)]
pub struct GasMeter {
    limit: u64,
    used: u64,
    profile: GasProfile,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: 0,
            profile: GasProfile::new(),
        }
    }

    /// Books `amount` under `category`, failing once the limit is passed.
    pub fn charge(&mut self, category: GasCategory, amount: u64) -> Result<(), VMError> {
        self.used = self.used.saturating_add(amount);
        self.profile.add(category, amount);
        if self.used > self.limit {
            return Err(VMError::OutOfGas {
                used: self.used,
                limit: self.limit,
            });
        }
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn into_profile(self) -> GasProfile {
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_totals_every_category() {
        let mut profile = GasProfile::new();
        profile.add(GasCategory::Instruction, 10);
        profile.add(GasCategory::Crypto, 5);
        profile.add(GasCategory::Crypto, 5);
        assert_eq!(profile.total(), 20);
        assert_eq!(profile.get(GasCategory::Crypto), 10);
        assert_eq!(profile.iter().count(), GAS_CATEGORY_COUNT);
    }

    #[test]
    fn meter_stops_past_the_limit() {
        let mut meter = GasMeter::new(100);
        meter.charge(GasCategory::Instruction, 100).unwrap();
        assert_eq!(meter.remaining(), 0);
        assert_eq!(
            meter.charge(GasCategory::Instruction, 1),
            Err(VMError::OutOfGas { used: 101, limit: 100 })
        );
    }

    #[test]
    fn digests_pay_per_byte() {
        let model = DefaultCostModel;
        let small = model.operands(&Instr::Blake2b, &[Value::Bytes(vec![0; 8])]);
        let large = model.operands(&Instr::Blake2b, &[Value::Bytes(vec![0; 800])]);
        assert_eq!(large, small * 100);
        assert_eq!(model.operands(&Instr::Swap, &[Value::Unit, Value::Unit]), 0);
    }
}
