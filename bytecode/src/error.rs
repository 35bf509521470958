use thiserror::Error;

/// Why an image failed to load.
///
/// Every variant is fatal to the load. Offsets are absolute byte positions
/// in the input buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("not a RITE image: magic is {}", show_tag(.found))]
    InvalidMagic { found: [u8; 4] },

    #[error(
        "truncated input at offset {offset}: needed {needed} bytes, {available} available"
    )]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown section {} at offset {offset}", show_tag(.tag))]
    UnknownSection { offset: usize, tag: [u8; 4] },

    #[error("unsupported section {} at offset {offset}", show_tag(.tag))]
    UnsupportedSection { offset: usize, tag: [u8; 4] },

    #[error("unsupported literal type {tag} at offset {offset}")]
    UnsupportedLiteralType { offset: usize, tag: u8 },

    #[error("unknown opcode 0x{byte:02x} at offset {offset}")]
    UnknownOpcode { offset: usize, byte: u8 },

    #[error(
        "instruction at offset {offset} runs past the {declared}-byte code section"
    )]
    CodeOverrun { offset: usize, declared: usize },

    #[error("layout needs {width} bytes but the read window is {window}")]
    LayoutOverflow { width: usize, window: usize },
}

/// Render a 4-byte section tag, escaping NULs and other non-printables.
pub(crate) fn show_tag(tag: &[u8; 4]) -> String {
    let mut out = String::with_capacity(6);
    out.push('"');
    for &b in tag {
        out.extend(std::ascii::escape_default(b).map(char::from));
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_violation() {
        let err = ParseError::UnsupportedSection {
            offset: 40,
            tag: *b"DBG\0",
        };
        assert_eq!(
            err.to_string(),
            "unsupported section \"DBG\\x00\" at offset 40"
        );

        let err = ParseError::UnknownOpcode {
            offset: 7,
            byte: 0xEE,
        };
        assert_eq!(err.to_string(), "unknown opcode 0xee at offset 7");
    }
}
