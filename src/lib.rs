//! Michelson toolchain library.
//!
//! Parses, type-checks and runs Michelson scripts off-chain: the Micheline
//! codec (text, binary, JSON), the type system and value model, the stack
//! machine with its gas meter, and the lazy-storage diff engine that turns
//! a run's big-map changes into an ordered diff.

pub mod config;
pub mod core;
pub mod crypto;
pub mod micheline;
pub mod storage;
pub mod types;
pub mod utils;
pub mod virtual_machine;
