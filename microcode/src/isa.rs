//! The WH-02 instruction set and the micro-steps each instruction executes
//! after the shared fetch prologue.

use std::fmt;

use crate::ds::{ControlWord, Register};
use crate::encoder::read_write;
use crate::error::BuildError;

use Register::{
    Accumulator as ACC, InstructionRegister as INST, Memory as RAM, MemoryAddressRegister as MAR,
    Operand1 as O1, Operand2 as O2, ProgramCounter as PRGC, Stack as STK, A, B, C,
};

/// Represents one mnemonic of the instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instruction {
    /// `NOP`
    Nop,
    /// `HLT`
    Halt,
    /// `MOV X, Y`: register to register
    Move { from: Register, to: Register },
    /// `MOV X, $`: register to the address held in the instruction's low bits
    Store { from: Register },
    /// `MOV $, Y`: memory to register, address in the next cell
    Load { to: Register },
    /// `MOV $, $`: memory to memory, both addresses in the following cells
    CopyMemory,
    /// `MOV #, Y`: the value in the next cell to a register
    LoadImmediate { to: Register },
    /// `MOV #, $`: the value in the next cell to the address after it
    StoreImmediate,
}

/// Opcode map shared with the assembler
pub(crate) const INSTRUCTION_SET: &[(u8, Instruction)] = &[
    (0x00, Instruction::Nop),
    (0x01, Instruction::Move { from: A, to: B }),
    (0x02, Instruction::Move { from: A, to: C }),
    (0x03, Instruction::Move { from: A, to: O1 }),
    (0x04, Instruction::Move { from: A, to: O2 }),
    (0x05, Instruction::Store { from: A }),
    (0x06, Instruction::Move { from: B, to: A }),
    (0x07, Instruction::Move { from: B, to: C }),
    (0x08, Instruction::Move { from: B, to: O1 }),
    (0x09, Instruction::Move { from: B, to: O2 }),
    (0x0A, Instruction::Store { from: B }),
    (0x0B, Instruction::Move { from: C, to: A }),
    (0x0C, Instruction::Move { from: C, to: B }),
    (0x0D, Instruction::Move { from: C, to: O1 }),
    (0x0E, Instruction::Move { from: C, to: O2 }),
    (0x0F, Instruction::Store { from: C }),
    (0x10, Instruction::Move { from: O1, to: A }),
    (0x11, Instruction::Move { from: O1, to: B }),
    (0x12, Instruction::Move { from: O1, to: C }),
    (0x13, Instruction::Move { from: O1, to: O2 }),
    (0x14, Instruction::Store { from: O1 }),
    (0x15, Instruction::Move { from: O2, to: A }),
    (0x16, Instruction::Move { from: O2, to: B }),
    (0x17, Instruction::Move { from: O2, to: C }),
    (0x18, Instruction::Move { from: O2, to: O1 }),
    (0x19, Instruction::Store { from: O2 }),
    (0x1A, Instruction::Load { to: A }),
    (0x1B, Instruction::Load { to: B }),
    (0x1C, Instruction::Load { to: C }),
    (0x1D, Instruction::Load { to: O1 }),
    (0x1E, Instruction::Load { to: O2 }),
    (0x1F, Instruction::CopyMemory),
    (0x20, Instruction::Halt),
    (0x21, Instruction::LoadImmediate { to: A }),
    (0x22, Instruction::LoadImmediate { to: B }),
    (0x23, Instruction::LoadImmediate { to: C }),
    (0x24, Instruction::LoadImmediate { to: O1 }),
    (0x25, Instruction::LoadImmediate { to: O2 }),
    (0x26, Instruction::StoreImmediate),
    (0x27, Instruction::Move { from: ACC, to: A }),
    (0x28, Instruction::Move { from: ACC, to: B }),
    (0x29, Instruction::Move { from: ACC, to: C }),
    (0x2A, Instruction::Move { from: ACC, to: O1 }),
    (0x2B, Instruction::Move { from: ACC, to: O2 }),
    (0x2C, Instruction::Store { from: ACC }),
];

/// Step 0 of every opcode: address the next instruction
pub(crate) fn fetch_address() -> Result<ControlWord, BuildError> {
    read_write(PRGC, MAR)
}

/// Step 1 of every opcode: read the instruction and advance past it
pub(crate) fn fetch_instruction() -> Result<ControlWord, BuildError> {
    Ok(read_write(RAM, INST)? | ControlWord::PC_ENABLE)
}

/// Latch the address of the next operand cell and step over it
fn next_operand() -> Result<ControlWord, BuildError> {
    Ok(read_write(PRGC, MAR)? | ControlWord::PC_ENABLE)
}

impl Instruction {
    /// Control words for steps 2 onward
    pub(crate) fn micro_steps(&self) -> Result<Vec<ControlWord>, BuildError> {
        let reset = ControlWord::RESET_STEP;
        let steps = match *self {
            Instruction::Nop => vec![reset],
            Instruction::Halt => vec![ControlWord::HALT],
            Instruction::Move { from, to } => vec![read_write(from, to)?, reset],
            Instruction::Store { from } => {
                vec![read_write(INST, MAR)?, read_write(from, RAM)?, reset]
            }
            Instruction::Load { to } => vec![
                next_operand()?,
                read_write(RAM, MAR)?,
                read_write(RAM, to)?,
                reset,
            ],
            Instruction::CopyMemory => vec![
                next_operand()?,
                read_write(RAM, MAR)?,
                read_write(RAM, STK)?,
                next_operand()?,
                read_write(RAM, MAR)?,
                read_write(STK, RAM)? | reset,
            ],
            Instruction::LoadImmediate { to } => vec![
                read_write(PRGC, MAR)?,
                read_write(RAM, to)? | ControlWord::PC_ENABLE,
                reset,
            ],
            Instruction::StoreImmediate => vec![
                read_write(PRGC, MAR)?,
                read_write(RAM, STK)? | ControlWord::PC_ENABLE,
                next_operand()?,
                read_write(RAM, MAR)?,
                read_write(STK, RAM)? | reset,
            ],
        };
        Ok(steps)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "NOP"),
            Instruction::Halt => write!(f, "HLT"),
            Instruction::Move { from, to } => write!(f, "MOV {}, {}", from, to),
            Instruction::Store { from } => write!(f, "MOV {}, $", from),
            Instruction::Load { to } => write!(f, "MOV $, {}", to),
            Instruction::CopyMemory => write!(f, "MOV $, $"),
            Instruction::LoadImmediate { to } => write!(f, "MOV #, {}", to),
            Instruction::StoreImmediate => write!(f, "MOV #, $"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::STEPS;
    use crate::encoder::{input_bits, output_bits};

    fn instruction(opcode: u8) -> Instruction {
        INSTRUCTION_SET
            .iter()
            .find(|(op, _)| *op == opcode)
            .map(|(_, instruction)| *instruction)
            .unwrap()
    }

    #[test]
    fn test_every_sequence_compiles_and_fits() {
        for (opcode, instruction) in INSTRUCTION_SET {
            let steps = instruction
                .micro_steps()
                .unwrap_or_else(|e| panic!("{:#04x}: {}", opcode, e));
            assert!(!steps.is_empty());
            assert!(steps.len() + 2 <= STEPS, "{} is too long", instruction);
        }
    }

    #[test]
    fn test_non_terminal_sequences_end_in_reset() {
        for (_, instruction) in INSTRUCTION_SET {
            let steps = instruction.micro_steps().unwrap();
            let (last, body) = steps.split_last().unwrap();
            if *instruction == Instruction::Halt {
                assert!(steps.iter().all(|w| !w.asserts(ControlWord::RESET_STEP)));
            } else {
                assert!(last.asserts(ControlWord::RESET_STEP), "{}", instruction);
                assert!(body.iter().all(|w| !w.asserts(ControlWord::RESET_STEP)));
            }
        }
    }

    #[test]
    fn test_mnemonics_are_distinct() {
        let mut names: Vec<String> = INSTRUCTION_SET
            .iter()
            .map(|(_, i)| i.to_string())
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_move_a_b() {
        let steps = instruction(0x01).micro_steps().unwrap();
        let expected = output_bits(A).unwrap() | input_bits(B).unwrap();
        assert_eq!(
            steps,
            vec![ControlWord::from_bits(expected), ControlWord::RESET_STEP]
        );
    }

    #[test]
    fn test_store_uses_instruction_address() {
        let steps = instruction(0x05).micro_steps().unwrap();
        assert_eq!(steps[0], read_write(INST, MAR).unwrap());
        assert_eq!(steps[1], read_write(A, RAM).unwrap());
        assert_eq!(steps[2], ControlWord::RESET_STEP);
    }

    #[test]
    fn test_load_steps_over_operand() {
        let steps = instruction(0x1C).micro_steps().unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps[0].asserts(ControlWord::PC_ENABLE));
        assert_eq!(steps[1], read_write(RAM, MAR).unwrap());
        assert_eq!(steps[2], read_write(RAM, C).unwrap());
        assert_eq!(steps[3], ControlWord::RESET_STEP);
    }

    #[test]
    fn test_copy_memory_fills_every_step() {
        let steps = instruction(0x1F).micro_steps().unwrap();
        assert_eq!(steps.len() + 2, STEPS);
        assert_eq!(steps[2], read_write(RAM, STK).unwrap());
        assert_eq!(
            steps[5],
            read_write(STK, RAM).unwrap() | ControlWord::RESET_STEP
        );
    }

    #[test]
    fn test_halt_asserts_only_halt() {
        assert_eq!(
            instruction(0x20).micro_steps().unwrap(),
            vec![ControlWord::HALT]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(instruction(0x01).to_string(), "MOV A, B");
        assert_eq!(instruction(0x2C).to_string(), "MOV ACC, $");
        assert_eq!(instruction(0x1A).to_string(), "MOV $, A");
        assert_eq!(instruction(0x26).to_string(), "MOV #, $");
        assert_eq!(instruction(0x20).to_string(), "HLT");
    }
}
