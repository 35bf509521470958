use core::fmt;

use crate::op::{Op, Shape};

/// A decoded instruction.
///
/// Operands are widened to `u16`; which of `a`, `b`, `c` are meaningful is
/// given by the opcode's [`Shape`]. Unused operands are zero. For the
/// single-operand [`Shape::S`] the 16-bit value lives in `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl Instruction {
    pub const fn new(op: Op, a: u16, b: u16, c: u16) -> Self {
        Self { op, a, b, c }
    }

    pub const fn z(op: Op) -> Self {
        Self::new(op, 0, 0, 0)
    }

    /// Encoded size, opcode byte included.
    pub const fn encoded_len(&self) -> usize {
        self.op.encoded_len()
    }

    /// The signed relative offset of a jump instruction.
    pub const fn jump_offset(&self) -> Option<i16> {
        match self.op {
            Op::Jmp | Op::JmpUw => Some(self.a as i16),
            Op::JmpIf | Op::JmpNot | Op::JmpNil => Some(self.b as i16),
            _ => None,
        }
    }

    /// Append the encoded form to `buf`. 8-bit operands are truncated.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(self.op as u8);
        match self.op.shape() {
            Shape::Z => {}
            Shape::B => buf.push(self.a as u8),
            Shape::BB => buf.extend_from_slice(&[self.a as u8, self.b as u8]),
            Shape::BBB => buf.extend_from_slice(&[
                self.a as u8,
                self.b as u8,
                self.c as u8,
            ]),
            Shape::BS => {
                buf.push(self.a as u8);
                buf.extend_from_slice(&self.b.to_be_bytes());
            }
            Shape::BSS => {
                buf.push(self.a as u8);
                buf.extend_from_slice(&self.b.to_be_bytes());
                buf.extend_from_slice(&self.c.to_be_bytes());
            }
            Shape::S => buf.extend_from_slice(&self.a.to_be_bytes()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.op.mnemonic();
        let Self { a, b, c, .. } = *self;
        match self.op.shape() {
            Shape::Z => write!(f, "{name}"),
            Shape::B => write!(f, "{name} R{a}"),
            Shape::BB => write!(f, "{name} R{a} {b}"),
            Shape::BBB => write!(f, "{name} R{a} {b} {c}"),
            Shape::BS if self.op.is_jump() => {
                write!(f, "{name} R{a} {:+}", b as i16)
            }
            Shape::BS => write!(f, "{name} R{a} {b}"),
            Shape::BSS => write!(f, "{name} R{a} {b} {c}"),
            Shape::S if self.op.is_jump() => write!(f, "{name} {:+}", a as i16),
            Shape::S => write!(f, "{name} {a}"),
        }
    }
}
