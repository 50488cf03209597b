//! Primitive table of the Michelson language.
//!
//! The [`for_each_prim!`](crate::for_each_prim) macro holds the canonical
//! list of primitives with their binary codes and invokes a callback macro
//! for code generation, so the table is written exactly once.
//!
//! This module generates:
//! - The [`Prim`] enum with its binary code mapping
//! - `TryFrom<u8>` for decoding primitive codes
//! - Name lookup backed by a table built once on first use
//!
//! Variant names are the primitive names as written in source, so
//! instructions (`PAIR`), data constructors (`Pair`) and types (`pair`)
//! stay distinct.

use crate::types::encoding::DecodeError;
use crate::virtual_machine::errors::VMError;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Syntactic role of a primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimKind {
    /// Script sections and other structural keywords.
    Keyword,
    /// Data constructors (`Pair`, `Some`, `Elt`, ...).
    Data,
    /// Type constructors (`nat`, `pair`, `big_map`, ...).
    Type,
    /// Instructions (`ADD`, `DIP`, ...).
    Instr,
}

/// Invokes a callback macro with the complete primitive list.
///
/// Each entry is `NAME = code, Kind, base_gas`.
#[macro_export]
macro_rules! for_each_prim {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Script sections
            // =========================
            parameter = 0, Keyword, 0,
            storage = 1, Keyword, 0,
            code = 2, Keyword, 0,
            // =========================
            // Data constructors
            // =========================
            False = 3, Data, 0,
            Elt = 4, Data, 0,
            Left = 5, Data, 0,
            None = 6, Data, 0,
            Pair = 7, Data, 0,
            Right = 8, Data, 0,
            Some = 9, Data, 0,
            True = 10, Data, 0,
            Unit = 11, Data, 0,
            // =========================
            // Instructions, first generation
            // =========================
            PACK = 12, Instr, 60,
            UNPACK = 13, Instr, 80,
            BLAKE2B = 14, Instr, 430,
            SHA256 = 15, Instr, 600,
            SHA512 = 16, Instr, 680,
            ABS = 17, Instr, 20,
            ADD = 18, Instr, 35,
            AMOUNT = 19, Instr, 10,
            AND = 20, Instr, 20,
            BALANCE = 21, Instr, 10,
            CAR = 22, Instr, 10,
            CDR = 23, Instr, 10,
            CHECK_SIGNATURE = 24, Instr, 1400,
            COMPARE = 25, Instr, 35,
            CONCAT = 26, Instr, 30,
            CONS = 27, Instr, 15,
            CREATE_ACCOUNT = 28, Instr, 0,
            CREATE_CONTRACT = 29, Instr, 60,
            IMPLICIT_ACCOUNT = 30, Instr, 10,
            DIP = 31, Instr, 10,
            DROP = 32, Instr, 10,
            DUP = 33, Instr, 10,
            EDIV = 34, Instr, 80,
            EMPTY_MAP = 35, Instr, 30,
            EMPTY_SET = 36, Instr, 30,
            EQ = 37, Instr, 10,
            EXEC = 38, Instr, 15,
            FAILWITH = 39, Instr, 10,
            GE = 40, Instr, 10,
            GET = 41, Instr, 45,
            GT = 42, Instr, 10,
            HASH_KEY = 43, Instr, 600,
            IF = 44, Instr, 10,
            IF_CONS = 45, Instr, 10,
            IF_LEFT = 46, Instr, 10,
            IF_NONE = 47, Instr, 10,
            INT = 48, Instr, 10,
            LAMBDA = 49, Instr, 10,
            LE = 50, Instr, 10,
            LEFT = 51, Instr, 10,
            LOOP = 52, Instr, 10,
            LSL = 53, Instr, 20,
            LSR = 54, Instr, 20,
            LT = 55, Instr, 10,
            MAP = 56, Instr, 20,
            MEM = 57, Instr, 45,
            MUL = 58, Instr, 50,
            NEG = 59, Instr, 20,
            NEQ = 60, Instr, 10,
            NIL = 61, Instr, 10,
            NONE = 62, Instr, 10,
            NOT = 63, Instr, 10,
            NOW = 64, Instr, 10,
            OR = 65, Instr, 20,
            PAIR = 66, Instr, 10,
            PUSH = 67, Instr, 10,
            RIGHT = 68, Instr, 10,
            SIZE = 69, Instr, 15,
            SOME = 70, Instr, 10,
            SOURCE = 71, Instr, 10,
            SENDER = 72, Instr, 10,
            SELF = 73, Instr, 10,
            STEPS_TO_QUOTA = 74, Instr, 0,
            SUB = 75, Instr, 35,
            SWAP = 76, Instr, 10,
            TRANSFER_TOKENS = 77, Instr, 60,
            SET_DELEGATE = 78, Instr, 60,
            UNIT = 79, Instr, 10,
            UPDATE = 80, Instr, 60,
            XOR = 81, Instr, 20,
            ITER = 82, Instr, 15,
            LOOP_LEFT = 83, Instr, 10,
            ADDRESS = 84, Instr, 10,
            CONTRACT = 85, Instr, 70,
            ISNAT = 86, Instr, 10,
            CAST = 87, Instr, 0,
            RENAME = 88, Instr, 0,
            // =========================
            // Types, first generation
            // =========================
            bool = 89, Type, 0,
            contract = 90, Type, 0,
            int = 91, Type, 0,
            key = 92, Type, 0,
            key_hash = 93, Type, 0,
            lambda = 94, Type, 0,
            list = 95, Type, 0,
            map = 96, Type, 0,
            big_map = 97, Type, 0,
            nat = 98, Type, 0,
            option = 99, Type, 0,
            or = 100, Type, 0,
            pair = 101, Type, 0,
            set = 102, Type, 0,
            signature = 103, Type, 0,
            string = 104, Type, 0,
            bytes = 105, Type, 0,
            mumav = 106, Type, 0,
            timestamp = 107, Type, 0,
            unit = 108, Type, 0,
            operation = 109, Type, 0,
            address = 110, Type, 0,
            // =========================
            // Later additions, in protocol order
            // =========================
            SLICE = 111, Instr, 25,
            DIG = 112, Instr, 15,
            DUG = 113, Instr, 15,
            EMPTY_BIG_MAP = 114, Instr, 30,
            APPLY = 115, Instr, 30,
            chain_id = 116, Type, 0,
            CHAIN_ID = 117, Instr, 10,
            LEVEL = 118, Instr, 10,
            SELF_ADDRESS = 119, Instr, 10,
            never = 120, Type, 0,
            NEVER = 121, Instr, 0,
            UNPAIR = 122, Instr, 10,
            VOTING_POWER = 123, Instr, 300,
            TOTAL_VOTING_POWER = 124, Instr, 300,
            KECCAK = 125, Instr, 1400,
            SHA3 = 126, Instr, 1400,
            PAIRING_CHECK = 127, Instr, 45000,
            bls12_381_g1 = 128, Type, 0,
            bls12_381_g2 = 129, Type, 0,
            bls12_381_fr = 130, Type, 0,
            sapling_state = 131, Type, 0,
            sapling_transaction_deprecated = 132, Type, 0,
            SAPLING_EMPTY_STATE = 133, Instr, 300,
            SAPLING_VERIFY_UPDATE = 134, Instr, 300,
            ticket = 135, Type, 0,
            TICKET_DEPRECATED = 136, Instr, 0,
            READ_TICKET = 137, Instr, 10,
            SPLIT_TICKET = 138, Instr, 40,
            JOIN_TICKETS = 139, Instr, 40,
            GET_AND_UPDATE = 140, Instr, 70,
            chest = 141, Type, 0,
            chest_key = 142, Type, 0,
            OPEN_CHEST = 143, Instr, 1000,
            VIEW = 144, Instr, 1500,
            view = 145, Keyword, 0,
            constant = 146, Keyword, 0,
            SUB_MUMAV = 147, Instr, 20,
            tx_rollup_l2_address = 148, Type, 0,
            MIN_BLOCK_TIME = 149, Instr, 20,
            sapling_transaction = 150, Type, 0,
            EMIT = 151, Instr, 30,
            Lambda_rec = 152, Data, 0,
            LAMBDA_REC = 153, Instr, 10,
            TICKET = 154, Instr, 15,
            BYTES = 155, Instr, 20,
            NAT = 156, Instr, 20,
            Ticket = 157, Data, 0,
        }
    };
}

macro_rules! define_prims {
    (
        $( $name:ident = $code:expr, $kind:ident, $gas:expr ),* $(,)?
    ) => {
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub enum Prim {
            $( $name = $code, )*
        }

        impl TryFrom<u8> for Prim {
            type Error = DecodeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Prim::$name), )*
                    _ => Err(DecodeError::UnknownPrimitiveCode(value)),
                }
            }
        }

        impl Prim {
            /// Every primitive, in code order.
            pub const ALL: &'static [Prim] = &[ $( Prim::$name, )* ];

            /// Returns the source spelling of this primitive.
            pub const fn name(&self) -> &'static str {
                match self {
                    $( Prim::$name => stringify!($name), )*
                }
            }

            pub const fn kind(&self) -> PrimKind {
                match self {
                    $( Prim::$name => PrimKind::$kind, )*
                }
            }

            /// Returns the base gas cost charged before operand-size terms.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Prim::$name => $gas, )*
                }
            }
        }
    };
}

for_each_prim!(define_prims);

impl Prim {
    /// Binary code of this primitive.
    pub const fn code(&self) -> u8 {
        *self as u8
    }

    /// Looks a primitive up by its source spelling.
    pub fn from_name(name: &str) -> Option<Prim> {
        static TABLE: OnceLock<HashMap<&'static str, Prim>> = OnceLock::new();
        TABLE
            .get_or_init(|| Prim::ALL.iter().map(|p| (p.name(), *p)).collect())
            .get(name)
            .copied()
    }

    pub fn is_instr(&self) -> bool {
        self.kind() == PrimKind::Instr
    }

    pub fn is_type(&self) -> bool {
        self.kind() == PrimKind::Type
    }
}

impl FromStr for Prim {
    type Err = VMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Prim::from_name(s).ok_or_else(|| VMError::UnknownPrimitive(s.to_string()))
    }
}

impl fmt::Display for Prim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prim_try_from_invalid() {
        assert_eq!(Prim::try_from(158), Err(DecodeError::UnknownPrimitiveCode(158)));
        assert_eq!(Prim::try_from(0xFF), Err(DecodeError::UnknownPrimitiveCode(0xFF)));
    }

    #[test]
    fn codes_are_dense() {
        for (i, prim) in Prim::ALL.iter().enumerate() {
            assert_eq!(prim.code() as usize, i);
            assert_eq!(Prim::try_from(i as u8), Ok(*prim));
        }
        assert_eq!(Prim::ALL.len(), 158);
    }

    #[test]
    fn name_lookup() {
        assert_eq!(Prim::from_name("PAIR"), Some(Prim::PAIR));
        assert_eq!(Prim::from_name("Pair"), Some(Prim::Pair));
        assert_eq!(Prim::from_name("pair"), Some(Prim::pair));
        assert_eq!(Prim::from_name("mumav"), Some(Prim::mumav));
        assert_eq!(Prim::from_name("mutez"), None);
        assert!(matches!("FOO".parse::<Prim>(), Err(VMError::UnknownPrimitive(name)) if name == "FOO"));
    }

    #[test]
    fn kinds() {
        assert_eq!(Prim::ADD.kind(), PrimKind::Instr);
        assert_eq!(Prim::Elt.kind(), PrimKind::Data);
        assert_eq!(Prim::big_map.kind(), PrimKind::Type);
        assert_eq!(Prim::code.kind(), PrimKind::Keyword);
    }
}
