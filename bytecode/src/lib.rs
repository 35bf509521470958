mod builder;
mod decoder;
mod error;
mod image;
mod instruction;
mod op;
mod reader;

pub use builder::{ImageBuilder, RepBuilder};
pub use decoder::{decode, decode_code, BytecodeDecoder, Code};
pub use error::ParseError;
pub use image::{
    parse, Discrepancy, Image, Literal, Rep, HEADER_LEN, MAGIC,
    SECTION_DEBUG, SECTION_END, SECTION_IREP, SECTION_LVAR,
};
pub use instruction::Instruction;
pub use op::{Op, Shape};
pub use reader::{Datum, Field, Reader};

/// Load a RITE image from a contiguous buffer.
pub fn load(bytes: &[u8]) -> Result<Image, ParseError> {
    parse(bytes)
}
