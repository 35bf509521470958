use log::{debug, warn};

use crate::decoder::{decode_code, Code};
use crate::error::{show_tag, ParseError};
use crate::instruction::Instruction;
use crate::reader::{Datum, Field, Reader};

pub const MAGIC: &[u8; 4] = b"RITE";
pub const HEADER_LEN: usize = 20;
pub const SECTION_HEADER_LEN: usize = 8;
pub const RECORD_HEADER_LEN: usize = 16;

pub const SECTION_IREP: &[u8; 4] = b"IREP";
pub const SECTION_LVAR: &[u8; 4] = b"LVAR";
pub const SECTION_DEBUG: &[u8; 4] = b"DBG\0";
pub const SECTION_END: &[u8; 4] = b"END\0";

/// Literal pool tag for strings. The format also defines integer, float and
/// big-integer tags, none of which are loaded.
pub const LITERAL_STRING: u8 = 0;

const HEADER_TAIL: &[Field] = &[
    Field::U16,
    Field::U16,
    Field::U32,
    Field::Bytes(4),
    Field::Bytes(4),
];
const SECTION_HEADER: &[Field] = &[Field::Bytes(4), Field::U32];
const RECORD_HEADER: &[Field] = &[
    Field::U32,
    Field::U16,
    Field::U16,
    Field::U16,
    Field::U16,
    Field::U32,
];

/// A loaded RITE image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub major: u16,
    pub minor: u16,
    pub total_size: u32,
    pub compiler: [u8; 4],
    pub compiler_version: [u8; 4],
    /// Root records in file order, one per `IREP` section.
    pub records: Vec<Rep>,
    /// Size mismatches the loader tolerated.
    pub diagnostics: Vec<Discrepancy>,
}

/// A declared size that did not match what was actually read. Not fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    TotalSize { declared: u32, actual: usize },
    SectionSize {
        offset: usize,
        declared: u32,
        consumed: usize,
    },
    RecordSize {
        offset: usize,
        declared: u32,
        consumed: usize,
    },
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TotalSize { declared, actual } => write!(
                f,
                "header declares {declared} bytes, image has {actual}"
            ),
            Self::SectionSize {
                offset,
                declared,
                consumed,
            } => write!(
                f,
                "section at {offset} declares {declared} bytes, consumed {consumed}"
            ),
            Self::RecordSize {
                offset,
                declared,
                consumed,
            } => write!(
                f,
                "record at {offset} declares {declared} bytes, consumed {consumed}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    String(String),
}

/// One compiled unit: a script, class body or method body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rep {
    pub local_count: u16,
    pub register_count: u16,
    pub catch_count: u16,
    pub instructions: Vec<Instruction>,
    /// Code-section offset of each instruction, parallel to `instructions`.
    pub offsets: Vec<u32>,
    /// Length of the code section in bytes.
    pub code_len: u32,
    pub literal_pool: Vec<Literal>,
    pub symbol_table: Vec<String>,
    pub children: Vec<Rep>,
}

impl Rep {
    pub fn symbol(&self, idx: usize) -> Option<&str> {
        self.symbol_table.get(idx).map(String::as_str)
    }

    pub fn literal(&self, idx: usize) -> Option<&Literal> {
        self.literal_pool.get(idx)
    }

    pub fn child(&self, idx: usize) -> Option<&Rep> {
        self.children.get(idx)
    }

    /// Index of the instruction starting at code offset `offset`. The end of
    /// the code section maps to `instructions.len()`.
    pub fn position_of(&self, offset: u32) -> Option<usize> {
        if offset == self.code_len {
            return Some(self.instructions.len());
        }
        self.offsets.binary_search(&offset).ok()
    }

    /// Number of records in this tree, `self` included.
    pub fn tree_size(&self) -> usize {
        1 + self.children.iter().map(Rep::tree_size).sum::<usize>()
    }
}

/// Parse a complete RITE image.
pub fn parse(bytes: &[u8]) -> Result<Image, ParseError> {
    ImageParser::new(bytes).parse()
}

struct ImageParser<'a> {
    reader: Reader<'a>,
    diagnostics: Vec<Discrepancy>,
}

impl<'a> ImageParser<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: Reader::new(bytes),
            diagnostics: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Image, ParseError> {
        let image_len = self.reader.remaining();

        let found = self.reader.read_tag()?;
        if &found != MAGIC {
            return Err(ParseError::InvalidMagic { found });
        }
        let header = self.reader.read(HEADER_LEN - 4, HEADER_TAIL)?;
        let [
            Datum::Int(major),
            Datum::Int(minor),
            Datum::Int(total_size),
            Datum::Bytes(compiler),
            Datum::Bytes(compiler_version),
        ] = header.as_slice()
        else {
            unreachable!("fixed header layout")
        };
        let compiler = tag(compiler);
        let compiler_version = tag(compiler_version);
        debug!(
            "RITE {major}.{minor}, {total_size} bytes, compiler {} {}",
            show_tag(&compiler),
            show_tag(&compiler_version)
        );
        if *total_size as usize != image_len {
            self.note(Discrepancy::TotalSize {
                declared: *total_size,
                actual: image_len,
            });
        }

        let mut records = Vec::new();
        while !self.reader.at_end() {
            let offset = self.reader.offset();
            let section = self.reader.read(SECTION_HEADER_LEN, SECTION_HEADER)?;
            let [Datum::Bytes(section_tag), Datum::Int(size)] =
                section.as_slice()
            else {
                unreachable!("fixed section header layout")
            };
            let section_tag = tag(section_tag);
            let size = *size;
            debug!("section {} at {offset}, {size} bytes", show_tag(&section_tag));

            match &section_tag {
                SECTION_IREP => {
                    let format = self.reader.read_tag()?;
                    debug!("record format {}", show_tag(&format));
                    records.push(self.parse_record()?);
                    // the declared size covers the section header too
                    let consumed = self.reader.offset() - offset;
                    if consumed != size as usize {
                        self.note(Discrepancy::SectionSize {
                            offset,
                            declared: size,
                            consumed,
                        });
                    }
                }
                SECTION_LVAR => self.reader.skip(size as usize)?,
                SECTION_DEBUG => {
                    return Err(ParseError::UnsupportedSection {
                        offset,
                        tag: section_tag,
                    });
                }
                SECTION_END => break,
                _ => {
                    return Err(ParseError::UnknownSection {
                        offset,
                        tag: section_tag,
                    });
                }
            }
        }

        Ok(Image {
            major: *major as u16,
            minor: *minor as u16,
            total_size: *total_size,
            compiler,
            compiler_version,
            records,
            diagnostics: self.diagnostics,
        })
    }

    fn parse_record(&mut self) -> Result<Rep, ParseError> {
        let start = self.reader.offset();
        let header = self.reader.read(RECORD_HEADER_LEN, RECORD_HEADER)?;
        let [
            Datum::Int(record_size),
            Datum::Int(local_count),
            Datum::Int(register_count),
            Datum::Int(child_count),
            Datum::Int(catch_count),
            Datum::Int(code_len),
        ] = header.as_slice()
        else {
            unreachable!("fixed record header layout")
        };
        debug!(
            "record at {start}: size={record_size} locals={local_count} \
             regs={register_count} children={child_count} \
             catch={catch_count} code={code_len}"
        );

        let Code {
            instructions,
            offsets,
            len,
        } = decode_code(&mut self.reader, *code_len as usize)?;
        let literal_pool = self.parse_literals()?;
        let symbol_table = self.parse_symbols()?;

        let consumed = self.reader.offset() - start;
        if consumed != *record_size as usize {
            self.note(Discrepancy::RecordSize {
                offset: start,
                declared: *record_size,
                consumed,
            });
        }

        let mut children = Vec::with_capacity(*child_count as usize);
        for _ in 0..*child_count {
            children.push(self.parse_record()?);
        }

        Ok(Rep {
            local_count: *local_count as u16,
            register_count: *register_count as u16,
            catch_count: *catch_count as u16,
            instructions,
            offsets,
            code_len: len,
            literal_pool,
            symbol_table,
            children,
        })
    }

    fn parse_literals(&mut self) -> Result<Vec<Literal>, ParseError> {
        let count = self.reader.read_u16()? as usize;
        let mut pool = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = self.reader.offset();
            let kind = self.reader.read_u8()?;
            let len = self.reader.read_u16()? as usize;
            match kind {
                LITERAL_STRING => {
                    let s = self.reader.read_cstr(len)?;
                    self.reader.skip(1)?;
                    pool.push(Literal::String(s));
                }
                tag => {
                    return Err(ParseError::UnsupportedLiteralType {
                        offset,
                        tag,
                    });
                }
            }
        }
        Ok(pool)
    }

    fn parse_symbols(&mut self) -> Result<Vec<String>, ParseError> {
        let count = self.reader.read_u16()? as usize;
        let mut symbols = Vec::with_capacity(count);
        for _ in 0..count {
            let len = self.reader.read_u16()? as usize;
            symbols.push(self.reader.read_cstr(len)?);
            self.reader.skip(1)?;
        }
        Ok(symbols)
    }

    fn note(&mut self, discrepancy: Discrepancy) {
        warn!("size mismatch: {discrepancy}");
        self.diagnostics.push(discrepancy);
    }
}

fn tag(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0; 4];
    out.copy_from_slice(bytes);
    out
}
