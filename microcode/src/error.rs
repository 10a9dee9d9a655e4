use thiserror::Error;

use crate::ds::Register;

#[derive(Debug, Error)]
pub(crate) enum BuildError {
    #[error("Register {0} has no output selector and cannot drive the bus")]
    UnknownSource(Register),

    #[error("Register {0} has no input selector and cannot latch the bus")]
    UnknownDestination(Register),

    #[error("Control fields '{first}' and '{second}' overlap at bits {overlap:#07x}")]
    OverlappingFields {
        first: &'static str,
        second: &'static str,
        overlap: u32,
    },

    #[error("Control field '{field}' ({mask:#07x}) does not fit in a {width}-bit word")]
    FieldOutsideWord {
        field: &'static str,
        mask: u32,
        width: u32,
    },

    #[error("Selector {selector:#x} of register {register} does not fit field '{field}'")]
    SelectorOutsideField {
        register: Register,
        selector: u32,
        field: &'static str,
    },

    #[error("Registers {first} and {second} share selector {selector:#x} in field '{field}'")]
    DuplicateSelector {
        first: Register,
        second: Register,
        selector: u32,
        field: &'static str,
    },

    #[error("Opcode {opcode:#04x} assigned to both '{first}' and '{second}'")]
    DuplicateOpcode {
        opcode: u8,
        first: String,
        second: String,
    },

    #[error("Opcode {opcode:#04x} ('{mnemonic}') never resets the step counter")]
    IncompleteSequence { opcode: u8, mnemonic: String },

    #[error(
        "Opcode {opcode:#04x} ('{mnemonic}') resets at step {step}, leaving later steps unreachable"
    )]
    UnreachableSteps {
        opcode: u8,
        mnemonic: String,
        step: usize,
    },

    #[error(
        "Opcode {opcode:#04x} ('{mnemonic}') needs {steps} steps but only {max} are addressable"
    )]
    SequenceTooLong {
        opcode: u8,
        mnemonic: String,
        steps: usize,
        max: usize,
    },

    #[error("Step {step} is out of range for opcode {opcode:#04x}")]
    StepOutOfRange { opcode: u8, step: usize },

    #[error("Microcode already defined for step {step} of opcode {opcode:#04x}")]
    CellAlreadyDefined { opcode: u8, step: usize },

    #[error("Word {word:#x} at address {address:#05x} exceeds {width} bits")]
    WordOverflow { address: usize, word: u32, width: u32 },

    #[error("Unknown output format '{0}'")]
    UnknownFormat(String),

    #[error("Failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
