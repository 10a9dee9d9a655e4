//! Linearizes the microprogram into the control ROM and renders it as a
//! Logisim "v3.0 hex words addressed" image.

use crate::builder::{Microprogram, FETCH_STEPS};
use crate::ds::{ControlWord, OPCODES, OPCODE_BITS, STEP_BITS, WORD_BITS};
use crate::encoder::decode;
use crate::error::BuildError;

pub(crate) const HEADER: &str = "v3.0 hex words addressed";
pub(crate) const WORDS_PER_ROW: usize = 15;
pub(crate) const ROM_SIZE: usize = 1 << (STEP_BITS + OPCODE_BITS);

const WORD_DIGITS: usize = WORD_BITS.div_ceil(4) as usize;

/// ROM address of a (step, opcode) cell: step bits above opcode bits
pub(crate) fn address(step: usize, opcode: u8) -> usize {
    step << OPCODE_BITS | opcode as usize
}

/// Inverse of [`address`]
pub(crate) fn split_address(address: usize) -> (usize, u8) {
    (address >> OPCODE_BITS, (address & (OPCODES - 1)) as u8)
}

/// The flat contents of the control ROM
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RomImage {
    words: Vec<ControlWord>,
}

impl RomImage {
    pub(crate) fn from_microprogram(program: &Microprogram) -> Self {
        let words = (0..ROM_SIZE)
            .map(|address| {
                let (step, opcode) = split_address(address);
                program.word(step, opcode)
            })
            .collect();
        RomImage { words }
    }

    pub(crate) fn words(&self) -> &[ControlWord] {
        &self.words
    }

    /// Renders the image, failing if any word is wider than the ROM
    pub(crate) fn render(&self) -> Result<String, BuildError> {
        let limit = 1u32 << WORD_BITS;
        let mut output = String::new();
        output += HEADER;
        output.push('\n');

        for (row, chunk) in self.words().chunks(WORDS_PER_ROW).enumerate() {
            let start = row * WORDS_PER_ROW;
            output += format!("{:03x}:", start).as_str();
            for (i, word) in chunk.iter().enumerate() {
                if word.bits() >= limit {
                    return Err(BuildError::WordOverflow {
                        address: start + i,
                        word: word.bits(),
                        width: WORD_BITS,
                    });
                }
                output += format!(" {:0width$x}", word, width = WORD_DIGITS).as_str();
            }
            output.push('\n');
        }

        Ok(output)
    }
}

/// Human-readable dump of every assigned opcode and its decoded steps
pub(crate) fn render_listing(program: &Microprogram) -> String {
    let mut output = String::new();
    let mut assigned = 0;

    for (opcode, instruction) in program.instructions() {
        assigned += 1;
        output += format!("{:02x}  {}\n", opcode, instruction).as_str();

        let sequence = program.sequence(opcode);
        let last = sequence
            .iter()
            .rposition(|&word| word != ControlWord::NOP)
            .unwrap_or(0)
            .max(FETCH_STEPS - 1);
        for (step, &word) in sequence.iter().enumerate().take(last + 1) {
            output += format!(
                "    {}  {:03x}  {:0width$x}  {}\n",
                step,
                address(step, opcode),
                word,
                decode(word),
                width = WORD_DIGITS
            )
            .as_str();
        }
        output.push('\n');
    }

    output += format!("{} unassigned opcodes execute NOP\n", OPCODES - assigned).as_str();
    output
}
