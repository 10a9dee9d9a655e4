use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ds::{ControlWord, OPCODES, STEPS};
use crate::encoder::check_layout;
use crate::error::BuildError;
use crate::isa::{fetch_address, fetch_instruction, Instruction};

/// Steps shared by every opcode before its own sequence starts
pub(crate) const FETCH_STEPS: usize = 2;

type Table = [[ControlWord; OPCODES]; STEPS];

/// Owns the microprogram table while it is being populated
#[derive(Debug)]
pub(crate) struct MicroprogramBuilder {
    table: Table,
    defined: HashSet<(usize, u8)>,
    instructions: BTreeMap<u8, Instruction>,
}

/// A fully populated and validated microprogram, indexed by (step, opcode)
#[derive(Debug, Clone)]
pub(crate) struct Microprogram {
    table: Table,
    instructions: BTreeMap<u8, Instruction>,
}

/// Builds the microprogram for an instruction set. The control-word layout
/// is validated and reused opcodes are rejected before any cell is written.
pub(crate) fn build_microprogram(
    instruction_set: &[(u8, Instruction)],
) -> Result<Microprogram, BuildError> {
    check_layout()?;
    check_unique_opcodes(instruction_set)?;

    let mut builder = MicroprogramBuilder::new()?;
    for &(opcode, instruction) in instruction_set {
        builder.add(opcode, instruction)?;
    }
    builder.build()
}

fn check_unique_opcodes(instruction_set: &[(u8, Instruction)]) -> Result<(), BuildError> {
    let mut seen: HashMap<u8, Instruction> = HashMap::new();
    for &(opcode, instruction) in instruction_set {
        if let Some(first) = seen.insert(opcode, instruction) {
            return Err(BuildError::DuplicateOpcode {
                opcode,
                first: first.to_string(),
                second: instruction.to_string(),
            });
        }
    }
    Ok(())
}

impl MicroprogramBuilder {
    /// Starts from an all-NOP table with the fetch prologue on every opcode
    pub(crate) fn new() -> Result<Self, BuildError> {
        let mut table = [[ControlWord::NOP; OPCODES]; STEPS];
        table[0] = [fetch_address()?; OPCODES];
        table[1] = [fetch_instruction()?; OPCODES];

        Ok(MicroprogramBuilder {
            table,
            defined: HashSet::new(),
            instructions: BTreeMap::new(),
        })
    }

    /// Assigns `instruction` to `opcode` and writes its micro-steps
    pub(crate) fn add(&mut self, opcode: u8, instruction: Instruction) -> Result<(), BuildError> {
        if let Some(first) = self.instructions.get(&opcode) {
            return Err(BuildError::DuplicateOpcode {
                opcode,
                first: first.to_string(),
                second: instruction.to_string(),
            });
        }

        let steps = instruction.micro_steps()?;
        self.define_sequence(opcode, &instruction.to_string(), &steps)?;
        self.instructions.insert(opcode, instruction);

        log::debug!(
            "Defined {:#04x} '{}' in {} steps",
            opcode,
            instruction,
            FETCH_STEPS + steps.len()
        );
        Ok(())
    }

    /// Gives every unassigned opcode the NOP sequence and validates the table
    pub(crate) fn build(mut self) -> Result<Microprogram, BuildError> {
        let nop = Instruction::Nop.micro_steps()?;
        let mnemonic = Instruction::Nop.to_string();
        let mut unused = 0;
        for opcode in 0..=u8::MAX {
            if !self.instructions.contains_key(&opcode) {
                self.define_sequence(opcode, &mnemonic, &nop)?;
                unused += 1;
            }
        }
        log::debug!("{} unassigned opcodes fall through to NOP", unused);

        let program = Microprogram {
            table: self.table,
            instructions: self.instructions,
        };
        program.check_termination()?;
        Ok(program)
    }

    fn define_sequence(
        &mut self,
        opcode: u8,
        mnemonic: &str,
        steps: &[ControlWord],
    ) -> Result<(), BuildError> {
        check_sequence(opcode, mnemonic, steps)?;
        for (i, &word) in steps.iter().enumerate() {
            self.define(opcode, FETCH_STEPS + i, word)?;
        }
        Ok(())
    }

    /// The only write into the table: one cell, addressed explicitly
    fn define(&mut self, opcode: u8, step: usize, word: ControlWord) -> Result<(), BuildError> {
        if !(FETCH_STEPS..STEPS).contains(&step) {
            return Err(BuildError::StepOutOfRange { opcode, step });
        }
        if !self.defined.insert((step, opcode)) {
            return Err(BuildError::CellAlreadyDefined { opcode, step });
        }
        self.table[step][opcode as usize] = word;
        Ok(())
    }
}

/// A sequence must fit the step counter and end in exactly one reset,
/// unless it does nothing but halt the clock.
fn check_sequence(opcode: u8, mnemonic: &str, steps: &[ControlWord]) -> Result<(), BuildError> {
    let total = FETCH_STEPS + steps.len();
    if total > STEPS {
        return Err(BuildError::SequenceTooLong {
            opcode,
            mnemonic: mnemonic.to_string(),
            steps: total,
            max: STEPS,
        });
    }

    match steps
        .iter()
        .position(|word| word.asserts(ControlWord::RESET_STEP))
    {
        Some(i) if i + 1 < steps.len() => Err(BuildError::UnreachableSteps {
            opcode,
            mnemonic: mnemonic.to_string(),
            step: FETCH_STEPS + i,
        }),
        Some(_) => Ok(()),
        None if is_halt(steps) => Ok(()),
        None => Err(BuildError::IncompleteSequence {
            opcode,
            mnemonic: mnemonic.to_string(),
        }),
    }
}

/// Only a bare halt may skip the reset
fn is_halt(steps: &[ControlWord]) -> bool {
    steps.contains(&ControlWord::HALT)
        && steps
            .iter()
            .all(|&word| word == ControlWord::HALT || word == ControlWord::NOP)
}

impl Microprogram {
    pub(crate) fn word(&self, step: usize, opcode: u8) -> ControlWord {
        self.table[step][opcode as usize]
    }

    pub(crate) fn sequence(&self, opcode: u8) -> [ControlWord; STEPS] {
        std::array::from_fn(|step| self.word(step, opcode))
    }

    pub(crate) fn instruction(&self, opcode: u8) -> Option<Instruction> {
        self.instructions.get(&opcode).copied()
    }

    /// Assigned opcodes in ascending order
    pub(crate) fn instructions(&self) -> impl Iterator<Item = (u8, Instruction)> + '_ {
        self.instructions
            .iter()
            .map(|(&opcode, &instruction)| (opcode, instruction))
    }

    /// Walks every opcode from step 0 and requires a reset or halt
    fn check_termination(&self) -> Result<(), BuildError> {
        for opcode in 0..=u8::MAX {
            let terminates = self.sequence(opcode).iter().any(|word| {
                word.asserts(ControlWord::RESET_STEP) || word.asserts(ControlWord::HALT)
            });
            if !terminates {
                return Err(BuildError::IncompleteSequence {
                    opcode,
                    mnemonic: self
                        .instruction(opcode)
                        .map(|i| i.to_string())
                        .unwrap_or_else(|| Instruction::Nop.to_string()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::Register;
    use crate::encoder::{input_bits, output_bits, read_write};
    use crate::isa::INSTRUCTION_SET;

    fn program() -> Microprogram {
        build_microprogram(INSTRUCTION_SET).expect("instruction set should build")
    }

    #[test]
    fn test_fetch_prologue_on_every_opcode() {
        let program = program();
        let address =
            read_write(Register::ProgramCounter, Register::MemoryAddressRegister).unwrap();
        let fetch = read_write(Register::Memory, Register::InstructionRegister).unwrap()
            | ControlWord::PC_ENABLE;
        for opcode in 0..=u8::MAX {
            assert_eq!(program.word(0, opcode), address);
            assert_eq!(program.word(1, opcode), fetch);
        }
        assert_eq!(address.bits(), 0x376);
        assert_eq!(fetch.bits(), 0x789);
    }

    #[test]
    fn test_move_a_b_end_to_end() {
        let program = program();
        let expected = output_bits(Register::A).unwrap() | input_bits(Register::B).unwrap();
        let sequence = program.sequence(0x01);
        assert_eq!(sequence[0].bits(), 0x376);
        assert_eq!(sequence[1].bits(), 0x789);
        assert_eq!(sequence[2].bits(), expected);
        assert_eq!(sequence[3], ControlWord::RESET_STEP);
        assert!(sequence[4..].iter().all(|&w| w == ControlWord::NOP));
    }

    #[test]
    fn test_halt_end_to_end() {
        let program = program();
        let sequence = program.sequence(0x20);
        assert_eq!(sequence[2], ControlWord::HALT);
        assert!(sequence[3..].iter().all(|&w| w == ControlWord::NOP));
        assert!(sequence.iter().all(|w| !w.asserts(ControlWord::RESET_STEP)));
    }

    #[test]
    fn test_every_opcode_reaches_reset_except_halt() {
        let program = program();
        for opcode in 0..=u8::MAX {
            let sequence = program.sequence(opcode);
            let resets = sequence.iter().any(|w| w.asserts(ControlWord::RESET_STEP));
            if program.instruction(opcode) == Some(Instruction::Halt) {
                assert!(!resets);
            } else {
                assert!(resets, "opcode {:#04x} never resets", opcode);
            }
        }
    }

    #[test]
    fn test_unassigned_opcodes_behave_as_nop() {
        let program = program();
        for opcode in 0x2D..=u8::MAX {
            assert_eq!(program.instruction(opcode), None);
            assert_eq!(program.word(2, opcode), ControlWord::RESET_STEP);
        }
        assert_eq!(program.sequence(0xFF), program.sequence(0x00));
    }

    #[test]
    fn test_instructions_listed_in_opcode_order() {
        let program = program();
        let opcodes: Vec<u8> = program.instructions().map(|(opcode, _)| opcode).collect();
        assert_eq!(opcodes, (0x00..=0x2C).collect::<Vec<u8>>());
    }

    #[test]
    fn test_adding_one_opcode_touches_only_its_cells() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        builder.add(0x1F, Instruction::CopyMemory).unwrap();
        let program = builder.build().unwrap();

        let nop = program.sequence(0x00);
        for opcode in 0..=u8::MAX {
            if opcode != 0x1F {
                assert_eq!(program.sequence(opcode), nop, "opcode {:#04x}", opcode);
            }
        }
        assert_ne!(program.sequence(0x1F), nop);
    }

    #[test]
    fn test_error_duplicate_opcode_in_instruction_set() {
        let set = [
            (
                0x01,
                Instruction::Move {
                    from: Register::A,
                    to: Register::B,
                },
            ),
            (
                0x01,
                Instruction::Move {
                    from: Register::B,
                    to: Register::A,
                },
            ),
        ];
        let err = build_microprogram(&set).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x01 assigned to both 'MOV A, B' and 'MOV B, A'"
        );
    }

    #[test]
    fn test_error_duplicate_opcode_in_builder() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        builder
            .add(0x0A, Instruction::Store { from: Register::B })
            .unwrap();
        let err = builder
            .add(0x0A, Instruction::Store { from: Register::C })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x0a assigned to both 'MOV B, $' and 'MOV C, $'"
        );
    }

    #[test]
    fn test_error_invalid_register_aborts() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let err = builder
            .add(
                0x30,
                Instruction::Load {
                    to: Register::Accumulator,
                },
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Register ACC has no input selector and cannot latch the bus"
        );
    }

    #[test]
    fn test_error_sequence_without_reset() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let word = read_write(Register::A, Register::B).unwrap();
        let err = builder
            .define_sequence(0x40, "MOV A, B", &[word])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x40 ('MOV A, B') never resets the step counter"
        );
    }

    #[test]
    fn test_error_halt_mixed_with_transfers() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let word = read_write(Register::A, Register::B).unwrap();
        let err = builder
            .define_sequence(0x40, "MOV A, B", &[word, ControlWord::HALT])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x40 ('MOV A, B') never resets the step counter"
        );

        let err = builder
            .define_sequence(0x41, "HLT", &[word | ControlWord::HALT])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x41 ('HLT') never resets the step counter"
        );

        builder
            .define_sequence(0x42, "HLT", &[ControlWord::HALT])
            .unwrap();
    }

    #[test]
    fn test_error_reset_before_last_step() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let word = read_write(Register::A, Register::B).unwrap();
        let err = builder
            .define_sequence(0x40, "MOV A, B", &[ControlWord::RESET_STEP, word])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x40 ('MOV A, B') resets at step 2, leaving later steps unreachable"
        );
    }

    #[test]
    fn test_error_sequence_too_long() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let mut steps = vec![ControlWord::NOP; 6];
        steps.push(ControlWord::RESET_STEP);
        let err = builder.define_sequence(0x40, "LONG", &steps).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Opcode 0x40 ('LONG') needs 9 steps but only 8 are addressable"
        );
    }

    #[test]
    fn test_error_cell_defined_twice() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        builder.define(0x40, 3, ControlWord::HALT).unwrap();
        let err = builder.define(0x40, 3, ControlWord::NOP).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Microcode already defined for step 3 of opcode 0x40"
        );
        // the neighbouring opcode is untouched
        builder.define(0x41, 3, ControlWord::HALT).unwrap();
    }

    #[test]
    fn test_error_fetch_steps_are_protected() {
        let mut builder = MicroprogramBuilder::new().unwrap();
        let err = builder.define(0x40, 1, ControlWord::NOP).unwrap_err();
        assert_eq!(err.to_string(), "Step 1 is out of range for opcode 0x40");
        let err = builder.define(0x40, STEPS, ControlWord::NOP).unwrap_err();
        assert_eq!(err.to_string(), "Step 8 is out of range for opcode 0x40");
    }
}
