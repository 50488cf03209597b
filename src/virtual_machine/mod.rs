//! Michelson type checker and stack machine.
//!
//! Source goes through [`typecheck`] into typed instruction trees
//! ([`instr::Block`]), which [`vm::Interpreter`] executes against a stack of
//! [`Value`](crate::core::value::Value)s. [`program::Program`] ties the two
//! together for whole contracts: sections, entrypoints, views and the run
//! result with its operations and lazy-storage diff.
//!
//! # Modules
//!
//! - [`isa`]: primitive table and binary codes
//! - [`instr`]: typed instructions and their stack deltas
//! - [`typecheck`]: the checker
//! - [`entrypoints`]: entrypoint collection and resolution
//! - [`program`]: contract scripts and runs
//! - [`vm`]: the interpreter, gas metering and traces
//! - [`errors`]: the [`VMError`](errors::VMError) enum

pub mod entrypoints;
pub mod errors;
pub mod instr;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod typecheck;
pub mod vm;
