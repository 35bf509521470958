/// Operand layout of an opcode.
///
/// `B` is an 8-bit operand, `S` a 16-bit big-endian operand. The register
/// operand (`a`) always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Z,
    B,
    BB,
    BBB,
    BS,
    BSS,
    S,
}

impl Shape {
    /// Number of operand bytes following the opcode byte.
    pub const fn width(self) -> usize {
        match self {
            Shape::Z => 0,
            Shape::B => 1,
            Shape::BB => 2,
            Shape::BBB => 3,
            Shape::BS => 3,
            Shape::BSS => 5,
            Shape::S => 2,
        }
    }

    /// Number of operands carried by an instruction of this shape.
    pub const fn arity(self) -> usize {
        match self {
            Shape::Z => 0,
            Shape::B | Shape::S => 1,
            Shape::BB | Shape::BS => 2,
            Shape::BBB | Shape::BSS => 3,
        }
    }
}

macro_rules! opcodes {
    ($(
        $(#[$doc:meta])*
        $name:ident = $code:literal, $mnemonic:literal, $shape:ident;
    )*) => {
        /// RITE bytecode opcodes.
        ///
        /// The discriminant is the encoded opcode byte.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Op {
            $($(#[$doc])* $name = $code,)*
        }

        impl Op {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [Op] = &[$(Op::$name),*];

            pub const fn shape(self) -> Shape {
                match self {
                    $(Op::$name => Shape::$shape,)*
                }
            }

            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Op::$name => $mnemonic,)*
                }
            }
        }

        impl TryFrom<u8> for Op {
            type Error = u8;

            fn try_from(byte: u8) -> Result<Self, u8> {
                match byte {
                    $($code => Ok(Op::$name),)*
                    other => Err(other),
                }
            }
        }
    };
}

opcodes! {
    /// No operation.
    Nop = 0x00, "NOP", Z;
    /// `R[a] = R[b]`
    Move = 0x01, "MOVE", BB;
    /// `R[a] = Pool[b]`
    LoadL = 0x02, "LOADL", BB;
    /// `R[a] = b`
    LoadI = 0x03, "LOADI", BB;
    /// `R[a] = -b`
    LoadINeg = 0x04, "LOADINEG", BB;
    /// `R[a] = -1`
    LoadIMinus1 = 0x05, "LOADI__1", B;
    LoadI0 = 0x06, "LOADI_0", B;
    LoadI1 = 0x07, "LOADI_1", B;
    LoadI2 = 0x08, "LOADI_2", B;
    LoadI3 = 0x09, "LOADI_3", B;
    LoadI4 = 0x0A, "LOADI_4", B;
    LoadI5 = 0x0B, "LOADI_5", B;
    LoadI6 = 0x0C, "LOADI_6", B;
    LoadI7 = 0x0D, "LOADI_7", B;
    /// `R[a] = b` as a signed 16-bit value.
    LoadI16 = 0x0E, "LOADI16", BS;
    /// `R[a] = (b << 16) | c` as a signed 32-bit value.
    LoadI32 = 0x0F, "LOADI32", BSS;
    /// `R[a] = Syms[b]`
    LoadSym = 0x10, "LOADSYM", BB;
    LoadNil = 0x11, "LOADNIL", B;
    LoadSelf = 0x12, "LOADSELF", B;
    LoadT = 0x13, "LOADT", B;
    LoadF = 0x14, "LOADF", B;
    /// `R[a] = $Syms[b]`
    GetGV = 0x15, "GETGV", BB;
    /// `$Syms[b] = R[a]`
    SetGV = 0x16, "SETGV", BB;
    GetSV = 0x17, "GETSV", BB;
    SetSV = 0x18, "SETSV", BB;
    /// `R[a] = @Syms[b]`
    GetIV = 0x19, "GETIV", BB;
    /// `@Syms[b] = R[a]`
    SetIV = 0x1A, "SETIV", BB;
    GetCV = 0x1B, "GETCV", BB;
    SetCV = 0x1C, "SETCV", BB;
    GetConst = 0x1D, "GETCONST", BB;
    SetConst = 0x1E, "SETCONST", BB;
    /// `R[a] = R[a]::Syms[b]`
    GetMCnst = 0x1F, "GETMCNST", BB;
    /// `R[a+1]::Syms[b] = R[a]`
    SetMCnst = 0x20, "SETMCNST", BB;
    GetUpvar = 0x21, "GETUPVAR", BBB;
    SetUpvar = 0x22, "SETUPVAR", BBB;
    /// `R[a] = R[a][R[a+1]]`
    GetIdx = 0x23, "GETIDX", B;
    /// `R[a][R[a+1]] = R[a+2]`
    SetIdx = 0x24, "SETIDX", B;
    /// Relative jump. Operand: `offset:i16`
    Jmp = 0x25, "JMP", S;
    JmpIf = 0x26, "JMPIF", BS;
    JmpNot = 0x27, "JMPNOT", BS;
    JmpNil = 0x28, "JMPNIL", BS;
    /// Unwind ensure handlers, then jump.
    JmpUw = 0x29, "JMPUW", S;
    Except = 0x2A, "EXCEPT", B;
    Rescue = 0x2B, "RESCUE", BB;
    RaiseIf = 0x2C, "RAISEIF", B;
    /// `R[a] = self.send(Syms[b], R[a+1]..)`, `c = n | k << 4`
    SSend = 0x2D, "SSEND", BBB;
    SSendB = 0x2E, "SSENDB", BBB;
    /// `R[a] = R[a].send(Syms[b], R[a+1]..)`, `c = n | k << 4`
    Send = 0x2F, "SEND", BBB;
    SendB = 0x30, "SENDB", BBB;
    Call = 0x31, "CALL", Z;
    Super = 0x32, "SUPER", BB;
    ArgAry = 0x33, "ARGARY", BS;
    Enter = 0x34, "ENTER", S;
    KeyP = 0x35, "KEY_P", BB;
    KeyEnd = 0x36, "KEYEND", Z;
    KArg = 0x37, "KARG", BB;
    Return = 0x38, "RETURN", B;
    ReturnBlk = 0x39, "RETURN_BLK", B;
    Break = 0x3A, "BREAK", B;
    BlkPush = 0x3B, "BLKPUSH", BS;
    /// `R[a] = R[a] + R[a+1]`
    Add = 0x3C, "ADD", B;
    /// `R[a] = R[a] + b`
    AddI = 0x3D, "ADDI", BB;
    Sub = 0x3E, "SUB", B;
    SubI = 0x3F, "SUBI", BB;
    Mul = 0x40, "MUL", B;
    Div = 0x41, "DIV", B;
    Eq = 0x42, "EQ", B;
    Lt = 0x43, "LT", B;
    Le = 0x44, "LE", B;
    Gt = 0x45, "GT", B;
    Ge = 0x46, "GE", B;
    /// `R[a] = [R[a], .., R[a+b-1]]`
    Array = 0x47, "ARRAY", BB;
    /// `R[a] = [R[b], .., R[b+c-1]]`
    Array2 = 0x48, "ARRAY2", BBB;
    AryCat = 0x49, "ARYCAT", B;
    AryPush = 0x4A, "ARYPUSH", BB;
    AryDup = 0x4B, "ARYDUP", B;
    /// `R[a] = R[b][c]`
    ARef = 0x4C, "AREF", BBB;
    /// `R[b][c] = R[a]`
    ASet = 0x4D, "ASET", BBB;
    /// `*R[a], R[a+1]..R[a+c] = R[a][b..]`
    APost = 0x4E, "APOST", BBB;
    Intern = 0x4F, "INTERN", B;
    Symbol = 0x50, "SYMBOL", BB;
    String = 0x51, "STRING", BB;
    StrCat = 0x52, "STRCAT", B;
    /// `R[a] = {R[a] => R[a+1], ..}` with `b` pairs.
    Hash = 0x53, "HASH", BB;
    HashAdd = 0x54, "HASHADD", BB;
    HashCat = 0x55, "HASHCAT", B;
    Lambda = 0x56, "LAMBDA", BB;
    Block = 0x57, "BLOCK", BB;
    /// `R[a] = method(Irep[b])`
    Method = 0x58, "METHOD", BB;
    RangeInc = 0x59, "RANGE_INC", B;
    RangeExc = 0x5A, "RANGE_EXC", B;
    OClass = 0x5B, "OCLASS", B;
    /// `R[a] = newclass(R[a], Syms[b], R[a+1])`
    Class = 0x5C, "CLASS", BB;
    Module = 0x5D, "MODULE", BB;
    /// `R[a] = blockexec(R[a], Irep[b])`
    Exec = 0x5E, "EXEC", BB;
    /// `R[a].newmethod(Syms[b], R[a+1]); R[a] = Syms[b]`
    Def = 0x5F, "DEF", BB;
    Alias = 0x60, "ALIAS", BB;
    Undef = 0x61, "UNDEF", B;
    SClass = 0x62, "SCLASS", B;
    TClass = 0x63, "TCLASS", B;
    Debug = 0x64, "DEBUG", BBB;
    Err = 0x65, "ERR", B;
    /// Prefix: widen operand `a` of the next instruction.
    Ext1 = 0x66, "EXT1", Z;
    /// Prefix: widen operand `b` of the next instruction.
    Ext2 = 0x67, "EXT2", Z;
    /// Prefix: widen operands `a` and `b` of the next instruction.
    Ext3 = 0x68, "EXT3", Z;
    Stop = 0x69, "STOP", Z;
}

impl Op {
    pub const COUNT: usize = Op::Stop as usize + 1;

    /// Encoded size of an instruction with this opcode, opcode byte included.
    pub const fn encoded_len(self) -> usize {
        1 + self.shape().width()
    }

    /// Jumps whose 16-bit operand is a signed, instruction-relative offset.
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Op::Jmp | Op::JmpIf | Op::JmpNot | Op::JmpNil | Op::JmpUw
        )
    }
}

impl core::fmt::Display for Op {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_dense() {
        assert_eq!(Op::ALL.len(), Op::COUNT);
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i, "{op} out of order");
            assert_eq!(Op::try_from(i as u8), Ok(*op));
        }
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert_eq!(Op::try_from(0x6A), Err(0x6A));
        assert_eq!(Op::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn shapes_match_the_isa() {
        assert_eq!(Op::LoadI32.shape(), Shape::BSS);
        assert_eq!(Op::LoadI16.shape(), Shape::BS);
        assert_eq!(Op::Enter.shape(), Shape::S);
        assert_eq!(Op::Send.shape(), Shape::BBB);
        assert_eq!(Op::Stop.encoded_len(), 1);
        assert_eq!(Op::LoadI32.encoded_len(), 6);
    }
}
