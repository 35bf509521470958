use log::trace;

use crate::error::ParseError;
use crate::instruction::Instruction;
use crate::op::{Op, Shape};
use crate::reader::Reader;

/// Decode one instruction at the reader's cursor.
pub fn decode(reader: &mut Reader<'_>) -> Result<Instruction, ParseError> {
    let offset = reader.offset();
    let op = Op::try_from(reader.read_u8()?)
        .map_err(|byte| ParseError::UnknownOpcode { offset, byte })?;

    let instr = match op.shape() {
        Shape::Z => Instruction::z(op),
        Shape::B => Instruction::new(op, reader.read_u8()? as u16, 0, 0),
        Shape::BB => {
            let a = reader.read_u8()? as u16;
            let b = reader.read_u8()? as u16;
            Instruction::new(op, a, b, 0)
        }
        Shape::BBB => {
            let a = reader.read_u8()? as u16;
            let b = reader.read_u8()? as u16;
            let c = reader.read_u8()? as u16;
            Instruction::new(op, a, b, c)
        }
        Shape::BS => {
            let a = reader.read_u8()? as u16;
            let b = reader.read_u16()?;
            Instruction::new(op, a, b, 0)
        }
        Shape::BSS => {
            let a = reader.read_u8()? as u16;
            let b = reader.read_u16()?;
            let c = reader.read_u16()?;
            Instruction::new(op, a, b, c)
        }
        Shape::S => Instruction::new(op, reader.read_u16()?, 0, 0),
    };
    trace!("{offset:06x}: {instr}");
    Ok(instr)
}

/// Iterates over the instructions of one code section.
///
/// Yields each instruction with its offset relative to the start of the
/// section. An instruction that does not fit in the section yields
/// [`ParseError::CodeOverrun`]; iteration stops after the first error.
pub struct BytecodeDecoder<'a> {
    reader: Reader<'a>,
    base: usize,
    failed: bool,
}

impl<'a> BytecodeDecoder<'a> {
    /// `base` is the absolute position of `code` in the image, for errors.
    pub fn new(code: &'a [u8], base: usize) -> Self {
        Self {
            reader: Reader::with_base(code, base),
            base,
            failed: false,
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.failed || self.reader.at_end()
    }

    fn section_len(&self) -> usize {
        self.reader.offset() - self.base + self.reader.remaining()
    }
}

impl Iterator for BytecodeDecoder<'_> {
    type Item = Result<(u32, Instruction), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let start = self.reader.offset();
        let item = match decode(&mut self.reader) {
            Ok(instr) => Ok(((start - self.base) as u32, instr)),
            Err(ParseError::TruncatedInput { .. }) => {
                Err(ParseError::CodeOverrun {
                    offset: start,
                    declared: self.section_len(),
                })
            }
            Err(err) => Err(err),
        };
        self.failed = item.is_err();
        Some(item)
    }
}

/// The decoded code section of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    /// Section-relative byte offset of each instruction.
    pub offsets: Vec<u32>,
    pub len: u32,
}

/// Decode exactly `len` bytes of instructions from `reader`.
pub fn decode_code(
    reader: &mut Reader<'_>,
    len: usize,
) -> Result<Code, ParseError> {
    let base = reader.offset();
    let bytes = reader.read_bytes(len)?;
    let mut code = Code {
        len: len as u32,
        ..Code::default()
    };
    for item in BytecodeDecoder::new(bytes, base) {
        let (offset, instr) = item?;
        code.offsets.push(offset);
        code.instructions.push(instr);
    }
    Ok(code)
}
