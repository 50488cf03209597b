use crate::micheline::Node;
use crate::types::base58::Base58Error;
use crate::types::encoding::DecodeError;
use michelson_derive::Error;

/// Errors raised while parsing, type-checking or executing Michelson.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VMError {
    /// Malformed source text.
    #[error("syntax error at line {line}, column {column}: {message}")]
    SyntaxError {
        line: usize,
        column: usize,
        message: String,
    },
    /// Malformed binary input.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Primitive name that is not part of the language, or not valid in this position.
    #[error("unknown primitive: {0}")]
    UnknownPrimitive(String),
    /// Ill-typed instruction, data or type expression.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Live stack shallower than the instruction requires.
    #[error("stack underflow: {instruction} needs {required} items, found {available}")]
    StackUnderflow {
        instruction: &'static str,
        required: usize,
        available: usize,
    },
    /// `mumav` result above the 63-bit bound.
    #[error("mumav overflow")]
    MumavOverflow,
    /// `mumav` result below zero.
    #[error("mumav underflow")]
    MumavUnderflow,
    /// Shift amount above 256 bits.
    #[error("general overflow: {0}")]
    GeneralOverflow(String),
    /// `FAILWITH` was executed.
    #[error("script failed with {0}")]
    ScriptFailed(Node),
    /// Lazy storage identifier unknown to the storage accessor.
    #[error("cannot resolve {kind} {id}")]
    StorageResolution { kind: &'static str, id: i64 },
    /// Well-formed but invalid data (bad base58, unsorted set, out of range...).
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// Gas limit exhausted.
    #[error("out of gas: {used} used, limit {limit}")]
    OutOfGas { used: u64, limit: u64 },
    /// Instruction or type recognised but not executable here.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Entrypoint missing from the parameter type.
    #[error("unknown entrypoint: {0}")]
    UnknownEntrypoint(String),
    /// Nesting deeper than the configured limit.
    #[error("maximum nesting depth {0} exceeded")]
    MaxDepthExceeded(usize),
}

impl VMError {
    /// Value passed to `FAILWITH`, if this error is a script failure.
    pub fn culprit(&self) -> Option<&Node> {
        match self {
            VMError::ScriptFailed(node) => Some(node),
            _ => None,
        }
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        VMError::TypeMismatch(message.into())
    }

    pub(crate) fn invalid_data(message: impl Into<String>) -> Self {
        VMError::InvalidData(message.into())
    }
}

impl From<Base58Error> for VMError {
    fn from(err: Base58Error) -> Self {
        VMError::InvalidData(err.to_string())
    }
}
