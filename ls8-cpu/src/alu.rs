use static_assertions::const_assert_eq;
use thiserror::Error;

/// Condition flags register
///
/// Only the low three bits are used, and exactly one of them is set after a
/// `CMP`:
///
/// ```text
/// 00000LGE
///      ||`-- Equal
///      |`--- Greater-than
///      `---- Less-than
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Flags(u8);

const_assert_eq!(core::mem::size_of::<Flags>(), 1);

impl Flags {
    const EQUAL: u8 = 1 << 0;
    const GREATER: u8 = 1 << 1;
    const LESS: u8 = 1 << 2;

    /// Builds the flags resulting from comparing `a` against `b`
    #[inline]
    pub const fn compare(a: u8, b: u8) -> Self {
        let bits = if a == b {
            Self::EQUAL
        } else if a > b {
            Self::GREATER
        } else {
            Self::LESS
        };
        Self(bits)
    }

    /// Checks whether the `E` flag is set
    #[inline]
    pub const fn equal(self) -> bool {
        self.0 & Self::EQUAL != 0
    }

    /// Checks whether the `G` flag is set
    #[inline]
    pub const fn greater(self) -> bool {
        self.0 & Self::GREATER != 0
    }

    /// Checks whether the `L` flag is set
    #[inline]
    pub const fn less(self) -> bool {
        self.0 & Self::LESS != 0
    }

    /// Returns the raw register value
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// Operation performed by the arithmetic/logic unit
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    /// `reg[a] = reg[a] + reg[b]`, wrapping at 256
    Add,
    /// `reg[a] = reg[a] * reg[b]`, wrapping at 256
    Mul,
    /// Sets the flags register from `reg[a]` vs `reg[b]`
    Cmp,
}

/// Result of a single ALU evaluation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AluOutput {
    /// New value for the destination register
    Register(u8),
    /// New value for the flags register
    Flags(Flags),
}

/// Raw operation code which doesn't name an ALU operation
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported ALU operation {0:#04x}")]
pub struct UnsupportedOperation(pub u8);

impl AluOp {
    /// Returns the LS8 opcode for this operation
    pub const fn opcode(self) -> u8 {
        match self {
            AluOp::Add => 0xa0,
            AluOp::Mul => 0xa2,
            AluOp::Cmp => 0xa7,
        }
    }

    /// Returns the assembler mnemonic for this operation
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "ADD",
            AluOp::Mul => "MUL",
            AluOp::Cmp => "CMP",
        }
    }

    /// Evaluates the operation on two register values
    #[inline]
    pub const fn eval(self, a: u8, b: u8) -> AluOutput {
        match self {
            AluOp::Add => AluOutput::Register(a.wrapping_add(b)),
            AluOp::Mul => AluOutput::Register(a.wrapping_mul(b)),
            AluOp::Cmp => AluOutput::Flags(Flags::compare(a, b)),
        }
    }
}

impl TryFrom<u8> for AluOp {
    type Error = UnsupportedOperation;
    fn try_from(op: u8) -> Result<Self, Self::Error> {
        match op {
            0xa0 => Ok(AluOp::Add),
            0xa2 => Ok(AluOp::Mul),
            0xa7 => Ok(AluOp::Cmp),
            op => Err(UnsupportedOperation(op)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compare_sets_one_flag() {
        for a in 0..=u8::MAX {
            for b in 0..=u8::MAX {
                let f = Flags::compare(a, b);
                assert_eq!(f.bits().count_ones(), 1, "{a} vs {b}: {f:?}");
                assert_eq!(f.bits() & !0b111, 0);
                assert_eq!(f.equal(), a == b);
                assert_eq!(f.greater(), a > b);
                assert_eq!(f.less(), a < b);
            }
        }
    }

    #[test]
    fn flag_bit_positions() {
        assert_eq!(Flags::compare(3, 3).bits(), 0b001);
        assert_eq!(Flags::compare(4, 3).bits(), 0b010);
        assert_eq!(Flags::compare(3, 4).bits(), 0b100);
        assert_eq!(Flags::default().bits(), 0);
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(AluOp::Add.eval(0xff, 0x02), AluOutput::Register(0x01));
        assert_eq!(AluOp::Add.eval(0x1a, 0x2e), AluOutput::Register(0x48));
        assert_eq!(AluOp::Mul.eval(8, 9), AluOutput::Register(72));
        assert_eq!(AluOp::Mul.eval(0x10, 0x10), AluOutput::Register(0));
        assert_eq!(
            AluOp::Cmp.eval(1, 2),
            AluOutput::Flags(Flags::compare(1, 2))
        );
    }

    #[test]
    fn raw_operation_codes() {
        for op in [AluOp::Add, AluOp::Mul, AluOp::Cmp] {
            assert_eq!(AluOp::try_from(op.opcode()), Ok(op));
        }
        assert_eq!(AluOp::try_from(0xa1), Err(UnsupportedOperation(0xa1)));
        assert_eq!(AluOp::try_from(0x82), Err(UnsupportedOperation(0x82)));
    }
}
