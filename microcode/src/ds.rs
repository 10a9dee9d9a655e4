use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use strum::{Display, EnumCount, EnumIter};

/// Width of a stored control word in bits
pub(crate) const WORD_BITS: u32 = 20;
/// Number of step-counter bits in a ROM address
pub(crate) const STEP_BITS: u32 = 3;
/// Number of opcode bits in a ROM address
pub(crate) const OPCODE_BITS: u32 = 8;

pub(crate) const STEPS: usize = 1 << STEP_BITS;
pub(crate) const OPCODES: usize = 1 << OPCODE_BITS;

/// Represents a register attached to the data bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub(crate) enum Register {
    A,
    B,
    C,
    #[strum(to_string = "ACC")]
    Accumulator,
    #[strum(to_string = "PRGC")]
    ProgramCounter,
    #[strum(to_string = "MAR")]
    MemoryAddressRegister,
    #[strum(to_string = "INST")]
    InstructionRegister,
    #[strum(to_string = "RAM")]
    Memory,
    #[strum(to_string = "STK")]
    Stack,
    #[strum(to_string = "O1")]
    Operand1,
    #[strum(to_string = "O2")]
    Operand2,
}

/// Represents a named, contiguous or gated range of control-word bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field {
    pub(crate) name: &'static str,
    pub(crate) mask: u32,
}

pub(crate) const OUTPUT_SELECT: Field = Field {
    name: "output select",
    mask: 0x0000F,
};
pub(crate) const INPUT_SELECT: Field = Field {
    name: "input select",
    mask: 0x000F0,
};
pub(crate) const OUTPUT_ENABLE: Field = Field {
    name: "output enable",
    mask: 0x00100,
};
pub(crate) const INPUT_ENABLE: Field = Field {
    name: "input enable",
    mask: 0x00200,
};
pub(crate) const PC_ENABLE: Field = Field {
    name: "pc enable",
    mask: 0x00400,
};
pub(crate) const HALT: Field = Field {
    name: "halt",
    mask: 0x10000,
};
pub(crate) const RESET_STEP: Field = Field {
    name: "reset step",
    mask: 0x20000,
};

/// Every field of the control word, least significant first
pub(crate) const LAYOUT: [Field; 7] = [
    OUTPUT_SELECT,
    INPUT_SELECT,
    OUTPUT_ENABLE,
    INPUT_ENABLE,
    PC_ENABLE,
    HALT,
    RESET_STEP,
];

/// Bits owned by the register driving the bus
pub(crate) const OUTPUT_FIELD: u32 = OUTPUT_SELECT.mask | OUTPUT_ENABLE.mask;
/// Bits owned by the register latching the bus
pub(crate) const INPUT_FIELD: u32 = INPUT_SELECT.mask | INPUT_ENABLE.mask;

/// The control word asserted during one micro-step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct ControlWord(u32);

impl ControlWord {
    pub(crate) const NOP: ControlWord = ControlWord(0);
    pub(crate) const PC_ENABLE: ControlWord = ControlWord(PC_ENABLE.mask);
    pub(crate) const HALT: ControlWord = ControlWord(HALT.mask);
    pub(crate) const RESET_STEP: ControlWord = ControlWord(RESET_STEP.mask);

    pub(crate) const fn from_bits(bits: u32) -> Self {
        ControlWord(bits)
    }

    pub(crate) const fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `flag` is asserted in this word
    pub(crate) fn asserts(self, flag: ControlWord) -> bool {
        flag.0 != 0 && self.0 & flag.0 == flag.0
    }

    pub(crate) fn masked(self, mask: u32) -> u32 {
        self.0 & mask
    }
}

impl BitOr for ControlWord {
    type Output = ControlWord;

    fn bitor(self, rhs: ControlWord) -> ControlWord {
        ControlWord(self.0 | rhs.0)
    }
}

impl BitOrAssign for ControlWord {
    fn bitor_assign(&mut self, rhs: ControlWord) {
        self.0 |= rhs.0;
    }
}

impl fmt::LowerHex for ControlWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
