use crate::image::{
    HEADER_LEN, LITERAL_STRING, MAGIC, RECORD_HEADER_LEN, SECTION_END,
    SECTION_HEADER_LEN, SECTION_IREP,
};
use crate::instruction::Instruction;
use crate::op::Op;

/// Assembles one instruction record in RITE encoding.
///
/// Symbols and string literals are interned: asking for the same name twice
/// returns the same index.
#[derive(Debug, Clone, Default)]
pub struct RepBuilder {
    locals: u16,
    registers: u16,
    catch: u16,
    code: Vec<u8>,
    literals: Vec<String>,
    symbols: Vec<String>,
    children: Vec<RepBuilder>,
}

impl RepBuilder {
    pub fn new(registers: u16) -> Self {
        Self {
            registers,
            ..Self::default()
        }
    }

    pub fn locals(mut self, locals: u16) -> Self {
        self.locals = locals;
        self
    }

    pub fn catch_handlers(mut self, catch: u16) -> Self {
        self.catch = catch;
        self
    }

    /// Current code offset, for computing jump targets.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        instr.encode_into(&mut self.code);
        self
    }

    pub fn z(&mut self, op: Op) -> &mut Self {
        self.emit(Instruction::z(op))
    }

    pub fn b(&mut self, op: Op, a: u8) -> &mut Self {
        self.emit(Instruction::new(op, a as u16, 0, 0))
    }

    pub fn bb(&mut self, op: Op, a: u8, b: u8) -> &mut Self {
        self.emit(Instruction::new(op, a as u16, b as u16, 0))
    }

    pub fn bbb(&mut self, op: Op, a: u8, b: u8, c: u8) -> &mut Self {
        self.emit(Instruction::new(op, a as u16, b as u16, c as u16))
    }

    pub fn bs(&mut self, op: Op, a: u8, b: u16) -> &mut Self {
        self.emit(Instruction::new(op, a as u16, b, 0))
    }

    pub fn bss(&mut self, op: Op, a: u8, b: u16, c: u16) -> &mut Self {
        self.emit(Instruction::new(op, a as u16, b, c))
    }

    pub fn s(&mut self, op: Op, a: u16) -> &mut Self {
        self.emit(Instruction::new(op, a, 0, 0))
    }

    /// Append raw bytes to the code section.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub fn symbol(&mut self, name: &str) -> u8 {
        intern(&mut self.symbols, name)
    }

    pub fn string(&mut self, value: &str) -> u8 {
        intern(&mut self.literals, value)
    }

    pub fn child(&mut self, child: RepBuilder) -> u8 {
        self.children.push(child);
        (self.children.len() - 1) as u8
    }

    /// `SEND`/`SSEND` shorthand: `name` with `argc` positional arguments.
    pub fn send(&mut self, op: Op, a: u8, name: &str, argc: u8) -> &mut Self {
        let sym = self.symbol(name);
        self.bbb(op, a, sym, argc)
    }

    /// Encode this record and its children.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        body.extend_from_slice(&self.code);

        body.extend_from_slice(&(self.literals.len() as u16).to_be_bytes());
        for lit in &self.literals {
            body.push(LITERAL_STRING);
            body.extend_from_slice(&(lit.len() as u16).to_be_bytes());
            body.extend_from_slice(lit.as_bytes());
            body.push(0);
        }

        body.extend_from_slice(&(self.symbols.len() as u16).to_be_bytes());
        for sym in &self.symbols {
            body.extend_from_slice(&(sym.len() as u16).to_be_bytes());
            body.extend_from_slice(sym.as_bytes());
            body.push(0);
        }

        // the code length field is part of the 16-byte header
        let record_size = RECORD_HEADER_LEN - 4 + body.len();
        let mut out = Vec::with_capacity(record_size);
        out.extend_from_slice(&(record_size as u32).to_be_bytes());
        out.extend_from_slice(&self.locals.to_be_bytes());
        out.extend_from_slice(&self.registers.to_be_bytes());
        out.extend_from_slice(&(self.children.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.catch.to_be_bytes());
        out.extend_from_slice(&body);
        for child in &self.children {
            out.extend_from_slice(&child.encode());
        }
        out
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> u8 {
    match table.iter().position(|s| s == name) {
        Some(idx) => idx as u8,
        None => {
            table.push(name.to_string());
            (table.len() - 1) as u8
        }
    }
}

/// Assembles a complete RITE image.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    /// Tag, declared size and payload of each section.
    sections: Vec<([u8; 4], u32, Vec<u8>)>,
    end: bool,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            end: true,
        }
    }

    /// Add an `IREP` section holding `rep` as its root record. As `mrbc`
    /// writes it, the declared size includes the 8-byte section header.
    pub fn record(mut self, rep: &RepBuilder) -> Self {
        let mut payload = b"0300".to_vec();
        payload.extend_from_slice(&rep.encode());
        let size = (SECTION_HEADER_LEN + payload.len()) as u32;
        self.sections.push((*SECTION_IREP, size, payload));
        self
    }

    /// Add an arbitrary section declaring exactly `payload.len()` bytes, the
    /// amount the loader skips for `LVAR`.
    pub fn section(mut self, tag: &[u8; 4], payload: Vec<u8>) -> Self {
        let size = payload.len() as u32;
        self.sections.push((*tag, size, payload));
        self
    }

    /// Leave off the trailing `END\0` section.
    pub fn without_end(mut self) -> Self {
        self.end = false;
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut body = Vec::new();
        for (tag, size, payload) in &self.sections {
            body.extend_from_slice(tag);
            body.extend_from_slice(&size.to_be_bytes());
            body.extend_from_slice(payload);
        }
        if self.end {
            body.extend_from_slice(SECTION_END);
            body.extend_from_slice(&(SECTION_HEADER_LEN as u32).to_be_bytes());
        }

        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(b"03");
        out.extend_from_slice(b"00");
        out.extend_from_slice(&((HEADER_LEN + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(b"MATZ");
        out.extend_from_slice(b"0000");
        out.extend_from_slice(&body);
        out
    }
}
