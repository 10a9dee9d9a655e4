//! Control-word encoding for the WH-02 bus.
//!
//! Registers are selected through two 4-bit decoders, one for the register
//! driving the bus and one for the register latching it. Each decoder is
//! gated by its own enable line, so selector 0 is still a real selection.

use std::collections::HashMap;
use std::fmt;

use strum::IntoEnumIterator;

use crate::ds::{
    ControlWord, Field, Register, HALT, INPUT_ENABLE, INPUT_FIELD, INPUT_SELECT, LAYOUT,
    OUTPUT_ENABLE, OUTPUT_FIELD, OUTPUT_SELECT, PC_ENABLE, RESET_STEP, WORD_BITS,
};
use crate::error::BuildError;

/// Output decoder index of every register that can drive the bus. Every
/// register has one, so `UnknownSource` only fires if an entry is removed.
fn output_selector(register: Register) -> Option<u32> {
    match register {
        Register::A => Some(0x0),
        Register::B => Some(0x1),
        Register::C => Some(0x2),
        Register::Accumulator => Some(0x3),
        Register::Operand1 => Some(0x4),
        Register::Operand2 => Some(0x5),
        Register::ProgramCounter => Some(0x6),
        Register::MemoryAddressRegister => Some(0x7),
        Register::InstructionRegister => Some(0x8),
        Register::Memory => Some(0x9),
        Register::Stack => Some(0xA),
    }
}

/// Input decoder index of every register that can latch the bus.
/// Index 5 belongs to the flags register, which is written by the ALU only.
fn input_selector(register: Register) -> Option<u32> {
    match register {
        Register::A => Some(0x0),
        Register::B => Some(0x1),
        Register::C => Some(0x2),
        Register::Operand1 => Some(0x3),
        Register::Operand2 => Some(0x4),
        Register::ProgramCounter => Some(0x6),
        Register::MemoryAddressRegister => Some(0x7),
        Register::InstructionRegister => Some(0x8),
        Register::Memory => Some(0x9),
        Register::Stack => Some(0xA),
        Register::Accumulator => None,
    }
}

fn shift_of(field: Field) -> u32 {
    field.mask.trailing_zeros()
}

fn selected_bits(
    register: Register,
    enable: Field,
    select: Field,
    selector: fn(Register) -> Option<u32>,
) -> Option<u32> {
    selector(register).map(|value| enable.mask | value << shift_of(select))
}

/// Bits that put `register` on the bus
pub(crate) fn output_bits(register: Register) -> Result<u32, BuildError> {
    selected_bits(register, OUTPUT_ENABLE, OUTPUT_SELECT, output_selector)
        .ok_or(BuildError::UnknownSource(register))
}

/// Bits that latch the bus into `register`
pub(crate) fn input_bits(register: Register) -> Result<u32, BuildError> {
    selected_bits(register, INPUT_ENABLE, INPUT_SELECT, input_selector)
        .ok_or(BuildError::UnknownDestination(register))
}

/// Control word moving `source` onto the bus and into `destination`
pub(crate) fn read_write(
    source: Register,
    destination: Register,
) -> Result<ControlWord, BuildError> {
    Ok(ControlWord::from_bits(output_bits(source)? | input_bits(destination)?))
}

/// Verifies the whole control-word layout: fields never share a bit, every
/// field fits the stored word, and both selector tables are collision-free.
pub(crate) fn check_layout() -> Result<(), BuildError> {
    check_fields(&LAYOUT, WORD_BITS)?;
    check_selectors(OUTPUT_SELECT, output_selector)?;
    check_selectors(INPUT_SELECT, input_selector)?;
    Ok(())
}

fn check_fields(fields: &[Field], width: u32) -> Result<(), BuildError> {
    let word_mask = (1u32 << width) - 1;
    for (i, first) in fields.iter().enumerate() {
        if first.mask & !word_mask != 0 {
            return Err(BuildError::FieldOutsideWord {
                field: first.name,
                mask: first.mask,
                width,
            });
        }
        for second in &fields[i + 1..] {
            let overlap = first.mask & second.mask;
            if overlap != 0 {
                return Err(BuildError::OverlappingFields {
                    first: first.name,
                    second: second.name,
                    overlap,
                });
            }
        }
    }
    Ok(())
}

fn check_selectors(field: Field, selector: fn(Register) -> Option<u32>) -> Result<(), BuildError> {
    let capacity = field.mask >> shift_of(field);
    let mut seen: HashMap<u32, Register> = HashMap::new();
    for register in Register::iter() {
        let Some(value) = selector(register) else {
            continue;
        };
        if value > capacity {
            return Err(BuildError::SelectorOutsideField {
                register,
                selector: value,
                field: field.name,
            });
        }
        if let Some(&first) = seen.get(&value) {
            return Err(BuildError::DuplicateSelector {
                first,
                second: register,
                selector: value,
                field: field.name,
            });
        }
        seen.insert(value, register);
    }
    Ok(())
}

/// Symbolic reading of a control word, used by the microcode listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Decoded {
    pub(crate) source: Option<Register>,
    pub(crate) destination: Option<Register>,
    pub(crate) pc_enable: bool,
    pub(crate) halt: bool,
    pub(crate) reset: bool,
    /// Bits no register or flag accounts for
    pub(crate) unmapped: u32,
}

pub(crate) fn decode(word: ControlWord) -> Decoded {
    let bits = word.bits();
    let mut unmapped = bits & !LAYOUT.iter().fold(0, |acc, field| acc | field.mask);

    let source = decode_side(bits, OUTPUT_ENABLE, OUTPUT_SELECT, output_selector);
    if source.is_none() {
        unmapped |= word.masked(OUTPUT_FIELD);
    }
    let destination = decode_side(bits, INPUT_ENABLE, INPUT_SELECT, input_selector);
    if destination.is_none() {
        unmapped |= word.masked(INPUT_FIELD);
    }

    Decoded {
        source,
        destination,
        pc_enable: bits & PC_ENABLE.mask != 0,
        halt: bits & HALT.mask != 0,
        reset: bits & RESET_STEP.mask != 0,
        unmapped,
    }
}

fn decode_side(
    bits: u32,
    enable: Field,
    select: Field,
    selector: fn(Register) -> Option<u32>,
) -> Option<Register> {
    if bits & enable.mask == 0 {
        return None;
    }
    let value = (bits & select.mask) >> shift_of(select);
    Register::iter().find(|&register| selector(register) == Some(value))
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        match (self.source, self.destination) {
            (Some(source), Some(destination)) => {
                parts.push(format!("{} -> {}", source, destination))
            }
            (Some(source), None) => parts.push(format!("{} -> bus", source)),
            (None, Some(destination)) => parts.push(format!("bus -> {}", destination)),
            (None, None) => {}
        }
        if self.pc_enable {
            parts.push("PC+".to_string());
        }
        if self.halt {
            parts.push("HALT".to_string());
        }
        if self.reset {
            parts.push("RESET".to_string());
        }
        if self.unmapped != 0 {
            parts.push(format!("?{:#07x}", self.unmapped));
        }
        if parts.is_empty() {
            return write!(f, "NOP");
        }
        write!(f, "{}", parts.join(", "))
    }
}
