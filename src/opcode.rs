//! The stable, numeric Toy VM opcode set (§4.1).
//!
//! Derives mirror the pattern used for the register-machine mnemonic
//! enums this workspace used to carry: `ToPrimitive`/`FromPrimitive` for
//! the numeric wire encoding, `EnumFromStr` for recognizing a mnemonic
//! typed at the interactive prompt.

use num_derive::{FromPrimitive, ToPrimitive};
use util::EnumFromStr;
use util_derive::EnumFromStr;

#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive, EnumFromStr)]
pub enum Opcode {
    ABORT = 0,
    EXIT = 1,
    NOP = 2,
    PUSH = 3,
    POP = 4,
    ADD = 5,
    SUB = 6,
    MUL = 7,
    DIV = 8,
    NEG = 9,
    JSR = 10,
    EQ = 11,
    NEQ = 12,
    LT = 13,
    GT = 14,
    LE = 15,
    GE = 16,
    BRT = 17,
    BRF = 18,
    CALL = 19,
    JMP = 20,
    RET = 21,
}

impl Opcode {
    /// Number of u64 words the instruction occupies, opcode included.
    pub fn instr_size(self) -> u64 {
        match self {
            Opcode::PUSH
            | Opcode::POP
            | Opcode::JSR
            | Opcode::BRT
            | Opcode::BRF
            | Opcode::CALL
            | Opcode::JMP => 2,
            _ => 1,
        }
    }

    /// True if this opcode's argument word is a symbol ID (as opposed to
    /// a raw code offset).
    pub fn arg_is_symbol(self) -> bool {
        matches!(self, Opcode::PUSH | Opcode::POP | Opcode::JSR | Opcode::CALL)
    }

    /// Minimum number of elements the relevant stack must hold before
    /// dispatch (§4.3 step 3).
    pub fn stack_need(self) -> usize {
        match self {
            Opcode::ABORT | Opcode::EXIT | Opcode::NOP | Opcode::PUSH | Opcode::JMP | Opcode::CALL => 0,
            Opcode::POP | Opcode::NEG | Opcode::BRT | Opcode::BRF => 1,
            Opcode::ADD
            | Opcode::SUB
            | Opcode::MUL
            | Opcode::DIV
            | Opcode::EQ
            | Opcode::NEQ
            | Opcode::LT
            | Opcode::GT
            | Opcode::LE
            | Opcode::GE => 2,
            Opcode::JSR => 0,
            Opcode::RET => 1,
        }
    }

    /// Which stack `stack_need` refers to: the call stack for JSR/RET's
    /// own bookkeeping, the command stack for everything else.
    pub fn uses_call_stack(self) -> bool {
        matches!(self, Opcode::RET)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
