use crate::error::ParseError;

/// One field of a fixed [`Reader::read`] layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Unsigned 8-bit integer.
    U8,
    /// Big-endian unsigned 16-bit integer.
    U16,
    /// Big-endian unsigned 32-bit integer.
    U32,
    /// Fixed-length raw bytes.
    Bytes(usize),
    /// Null-terminated string stored in a fixed-length slot. Bytes after the
    /// first NUL are ignored.
    CStr(usize),
}

impl Field {
    pub const fn width(self) -> usize {
        match self {
            Field::U8 => 1,
            Field::U16 => 2,
            Field::U32 => 4,
            Field::Bytes(n) | Field::CStr(n) => n,
        }
    }
}

/// A decoded [`Field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum<'a> {
    Int(u32),
    Bytes(&'a [u8]),
    Str(String),
}

/// Forward-only cursor over a byte buffer.
///
/// All integers are big-endian. Offsets reported in errors are absolute:
/// a reader over a sub-slice can be given the slice's position in the
/// enclosing buffer with [`Reader::with_base`].
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_base(bytes, 0)
    }

    pub fn with_base(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, pos: 0, base }
    }

    /// Absolute offset of the cursor.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Consume exactly `n` bytes and decode them per `layout`.
    ///
    /// The fields are decoded from the start of the window; any bytes of the
    /// window not covered by the layout are skipped.
    pub fn read(
        &mut self,
        n: usize,
        layout: &[Field],
    ) -> Result<Vec<Datum<'a>>, ParseError> {
        let width: usize = layout.iter().map(|f| f.width()).sum();
        if width > n {
            return Err(ParseError::LayoutOverflow { width, window: n });
        }

        let window = self.take(n)?;
        let mut at = 0;
        let mut out = Vec::with_capacity(layout.len());
        for field in layout {
            let raw = &window[at..at + field.width()];
            at += field.width();
            out.push(match field {
                Field::U8 => Datum::Int(raw[0] as u32),
                Field::U16 => {
                    Datum::Int(u16::from_be_bytes([raw[0], raw[1]]) as u32)
                }
                Field::U32 => Datum::Int(u32::from_be_bytes([
                    raw[0], raw[1], raw[2], raw[3],
                ])),
                Field::Bytes(_) => Datum::Bytes(raw),
                Field::CStr(_) => Datum::Str(cstr(raw)),
            });
        }
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        let raw = self.take(2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Four raw bytes, as used for magic numbers and section tags.
    pub fn read_tag(&mut self) -> Result<[u8; 4], ParseError> {
        let raw = self.take(4)?;
        Ok([raw[0], raw[1], raw[2], raw[3]])
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.take(n)
    }

    /// `len` bytes holding a null-terminated string.
    pub fn read_cstr(&mut self, len: usize) -> Result<String, ParseError> {
        Ok(cstr(self.take(len)?))
    }

    pub fn skip(&mut self, n: usize) -> Result<(), ParseError> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::TruncatedInput {
                offset: self.offset(),
                needed: n,
                available: self.remaining(),
            });
        }
        let raw = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(raw)
    }
}

fn cstr(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
