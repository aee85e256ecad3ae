//! Abstract instruction set for the 32-bit target.
//!
//! The code generator emits these descriptors; a downstream assembler owns
//! byte encoding. Operands are the small tagged union the whole
//! instruction-selection matrix is parameterized over: a register, a
//! memory reference (base + optional scaled index + displacement), or an
//! immediate. The x87 subset models the one-register evaluation-stack
//! discipline the float lowerings use: loads push, `f*p` forms pop, and
//! comparison status travels through `fnstsw ax` / `sahf` into the integer
//! flags.
//!
//! Display renders Intel syntax, which the tests match against.

use crate::ir::label::LabelId;
use crate::runtime::RuntimeEntry;
use std::fmt;

use super::registers::Gpr;

// =============================================================================
// Operands
// =============================================================================

/// Addressing-mode scale for an index register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    X1,
    X2,
    X4,
    X8,
}

impl Scale {
    /// Build from log2 of the element size.
    #[must_use]
    pub const fn from_log2(log2: u8) -> Option<Self> {
        match log2 {
            0 => Some(Scale::X1),
            1 => Some(Scale::X2),
            2 => Some(Scale::X4),
            3 => Some(Scale::X8),
            _ => None,
        }
    }

    /// Multiplier value.
    #[inline]
    #[must_use]
    pub const fn factor(self) -> u32 {
        match self {
            Scale::X1 => 1,
            Scale::X2 => 2,
            Scale::X4 => 4,
            Scale::X8 => 8,
        }
    }
}

/// A memory reference: `[base + index*scale + disp]`. A missing base means
/// absolute addressing (`disp` is the address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRef {
    pub base: Option<Gpr>,
    pub index: Option<(Gpr, Scale)>,
    pub disp: i32,
}

impl MemRef {
    /// `[base + disp]`
    #[inline]
    #[must_use]
    pub const fn base_disp(base: Gpr, disp: i32) -> Self {
        Self {
            base: Some(base),
            index: None,
            disp,
        }
    }

    /// `[base + index*scale + disp]`
    #[inline]
    #[must_use]
    pub const fn base_index_disp(base: Gpr, index: Gpr, scale: Scale, disp: i32) -> Self {
        Self {
            base: Some(base),
            index: Some((index, scale)),
            disp,
        }
    }

    /// `[addr]`
    #[inline]
    #[must_use]
    pub const fn absolute(addr: i32) -> Self {
        Self {
            base: None,
            index: None,
            disp: addr,
        }
    }

    /// Same reference shifted by `delta` bytes.
    #[inline]
    #[must_use]
    pub const fn offset(self, delta: i32) -> Self {
        Self {
            disp: self.disp + delta,
            ..self
        }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut wrote = false;
        if let Some(base) = self.base {
            write!(f, "{base}")?;
            wrote = true;
        }
        if let Some((index, scale)) = self.index {
            if wrote {
                write!(f, "+")?;
            }
            write!(f, "{index}*{}", scale.factor())?;
            wrote = true;
        }
        if !wrote {
            write!(f, "{:#x}", self.disp)?;
        } else if self.disp > 0 {
            write!(f, "+{}", self.disp)?;
        } else if self.disp < 0 {
            write!(f, "{}", self.disp)?;
        }
        write!(f, "]")
    }
}

/// An instruction operand: the storage-kind union instruction selection
/// dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opnd {
    /// A general-purpose register.
    Reg(Gpr),
    /// A 32-bit memory word.
    Mem(MemRef),
    /// A 32-bit immediate (also used for raw float bits).
    Imm(i32),
}

impl Opnd {
    /// The register, if this operand is one.
    #[inline]
    #[must_use]
    pub const fn as_reg(self) -> Option<Gpr> {
        match self {
            Opnd::Reg(r) => Some(r),
            _ => None,
        }
    }

    /// The memory reference, if this operand is one.
    #[inline]
    #[must_use]
    pub const fn as_mem(self) -> Option<MemRef> {
        match self {
            Opnd::Mem(m) => Some(m),
            _ => None,
        }
    }

    /// Whether this operand is an immediate.
    #[inline]
    #[must_use]
    pub const fn is_imm(self) -> bool {
        matches!(self, Opnd::Imm(_))
    }

    /// Whether two operands name the same storage.
    #[inline]
    #[must_use]
    pub fn same_storage(self, other: Opnd) -> bool {
        self == other && !self.is_imm()
    }
}

impl fmt::Display for Opnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opnd::Reg(r) => write!(f, "{r}"),
            Opnd::Mem(m) => write!(f, "{m}"),
            Opnd::Imm(v) => write!(f, "{v}"),
        }
    }
}

impl From<Gpr> for Opnd {
    fn from(reg: Gpr) -> Self {
        Opnd::Reg(reg)
    }
}

impl From<MemRef> for Opnd {
    fn from(mem: MemRef) -> Self {
        Opnd::Mem(mem)
    }
}

// =============================================================================
// Instruction attributes
// =============================================================================

/// Access width for narrow loads and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Word,
    Dword,
}

impl Width {
    /// Intel size keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Word => "word",
            Width::Dword => "dword",
        }
    }
}

/// Extension applied by a narrow load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ext {
    Zero,
    Sign,
}

/// Source of a widening move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtSrc {
    /// Narrow slice of a register (its low byte or word).
    Reg(Gpr),
    /// Narrow memory access.
    Mem(MemRef),
}

/// Two-operand ALU operations (also the compare, which only sets flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
}

impl AluOp {
    /// Mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }

    /// Whether `a op b == b op a`.
    #[inline]
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(self, AluOp::Add | AluOp::And | AluOp::Or | AluOp::Xor)
    }
}

/// Shift operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    /// Arithmetic/logical left shift.
    Shl,
    /// Arithmetic right shift (sign-propagating).
    Sar,
    /// Logical right shift (zero-filling).
    Shr,
}

impl ShiftOp {
    /// Mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            ShiftOp::Shl => "shl",
            ShiftOp::Sar => "sar",
            ShiftOp::Shr => "shr",
        }
    }
}

/// Shift count: an immediate or the fixed count register `cl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftCount {
    Imm(u8),
    Cl,
}

/// Branch conditions (signed, unsigned, and parity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    E,
    Ne,
    L,
    Ge,
    G,
    Le,
    B,
    Ae,
    A,
    Be,
    P,
}

impl Cond {
    /// Jcc mnemonic suffix.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::L => "l",
            Cond::Ge => "ge",
            Cond::G => "g",
            Cond::Le => "le",
            Cond::B => "b",
            Cond::Ae => "ae",
            Cond::A => "a",
            Cond::Be => "be",
            Cond::P => "p",
        }
    }

    /// The condition that holds after swapping the compare's operands.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            Cond::E => Cond::E,
            Cond::Ne => Cond::Ne,
            Cond::L => Cond::G,
            Cond::Ge => Cond::Le,
            Cond::G => Cond::L,
            Cond::Le => Cond::Ge,
            Cond::B => Cond::A,
            Cond::Ae => Cond::Be,
            Cond::A => Cond::B,
            Cond::Be => Cond::Ae,
            Cond::P => Cond::P,
        }
    }

    /// The negated condition.
    #[must_use]
    pub const fn negated(self) -> Self {
        match self {
            Cond::E => Cond::Ne,
            Cond::Ne => Cond::E,
            Cond::L => Cond::Ge,
            Cond::Ge => Cond::L,
            Cond::G => Cond::Le,
            Cond::Le => Cond::G,
            Cond::B => Cond::Ae,
            Cond::Ae => Cond::B,
            Cond::A => Cond::Be,
            Cond::Be => Cond::A,
            Cond::P => Cond::P,
        }
    }
}

/// x87 operand width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpWidth {
    Single,
    Double,
}

impl FpWidth {
    /// Intel size keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            FpWidth::Single => "dword",
            FpWidth::Double => "qword",
        }
    }
}

/// Popping x87 arithmetic: `f{op}p st(1), st(0)` computes
/// `st(1) <- st(1) op st(0)` and pops, leaving the result in `st(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FpOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl FpOp {
    /// Mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            FpOp::Add => "faddp",
            FpOp::Sub => "fsubp",
            FpOp::Mul => "fmulp",
            FpOp::Div => "fdivp",
        }
    }
}

/// Call targets. Runtime entries are symbolic; in-table dispatch goes
/// through a memory operand (the statics table or a vtable slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    Runtime(RuntimeEntry),
    Mem(MemRef),
}

// =============================================================================
// Instructions
// =============================================================================

/// One abstract machine instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insn {
    // Data movement (32-bit unless stated otherwise)
    Mov { dst: Opnd, src: Opnd },
    MovExt { ext: Ext, width: Width, dst: Gpr, src: ExtSrc },
    Store { width: Width, dst: MemRef, src: Gpr },
    StoreImm { width: Width, dst: MemRef, imm: i32 },
    Lea { dst: Gpr, src: MemRef },
    Push { src: Opnd },
    Pop { dst: Opnd },

    // Integer arithmetic
    Alu { op: AluOp, dst: Opnd, src: Opnd },
    Imul { dst: Gpr, src: Opnd },
    Idiv { src: MemRef },
    Cdq,
    Neg { dst: Opnd },
    Inc { dst: Opnd },
    Dec { dst: Opnd },
    Shift { op: ShiftOp, dst: Opnd, count: ShiftCount },

    // Control flow
    Jmp { target: LabelId },
    Jcc { cond: Cond, target: LabelId },
    Call { target: CallTarget },
    Ret { pop_bytes: u16 },

    // x87 floating point
    Fld { width: FpWidth, src: MemRef },
    Fstp { width: FpWidth, dst: MemRef },
    FstpSt0,
    Fild { src: MemRef },
    Fistp { dst: MemRef },
    Fchs,
    FpArith { op: FpOp },
    Fprem,
    Fucompp,
    FnstswAx,
    Sahf,
    Fnstcw { dst: MemRef },
    Fldcw { src: MemRef },
}

impl Insn {
    /// Whether this instruction transfers control to a label.
    #[inline]
    #[must_use]
    pub const fn branch_target(&self) -> Option<LabelId> {
        match self {
            Insn::Jmp { target } | Insn::Jcc { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Whether this is a call to the given runtime entry.
    #[inline]
    #[must_use]
    pub fn is_runtime_call(&self, entry: RuntimeEntry) -> bool {
        matches!(self, Insn::Call { target: CallTarget::Runtime(e) } if *e == entry)
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Mov { dst, src } => match (dst, src) {
                (Opnd::Mem(m), Opnd::Imm(v)) => write!(f, "mov dword {m}, {v}"),
                _ => write!(f, "mov {dst}, {src}"),
            },
            Insn::MovExt { ext, width, dst, src } => {
                let mn = match ext {
                    Ext::Zero => "movzx",
                    Ext::Sign => "movsx",
                };
                match src {
                    ExtSrc::Mem(m) => write!(f, "{mn} {dst}, {} {m}", width.keyword()),
                    ExtSrc::Reg(r) => {
                        let narrow = match width {
                            Width::Byte => r.low_byte_name(),
                            _ => r.low_word_name(),
                        };
                        write!(f, "{mn} {dst}, {narrow}")
                    }
                }
            }
            Insn::Store { width, dst, src } => {
                let narrow = match width {
                    Width::Byte => src.low_byte_name(),
                    Width::Word => src.low_word_name(),
                    Width::Dword => src.name(),
                };
                write!(f, "mov {} {dst}, {narrow}", width.keyword())
            }
            Insn::StoreImm { width, dst, imm } => {
                write!(f, "mov {} {dst}, {imm}", width.keyword())
            }
            Insn::Lea { dst, src } => write!(f, "lea {dst}, {src}"),
            Insn::Push { src } => match src {
                Opnd::Mem(m) => write!(f, "push dword {m}"),
                _ => write!(f, "push {src}"),
            },
            Insn::Pop { dst } => match dst {
                Opnd::Mem(m) => write!(f, "pop dword {m}"),
                _ => write!(f, "pop {dst}"),
            },
            Insn::Alu { op, dst, src } => write!(f, "{} {dst}, {src}", op.mnemonic()),
            Insn::Imul { dst, src } => write!(f, "imul {dst}, {src}"),
            Insn::Idiv { src } => write!(f, "idiv dword {src}"),
            Insn::Cdq => write!(f, "cdq"),
            Insn::Neg { dst } => write!(f, "neg {dst}"),
            Insn::Inc { dst } => match dst {
                Opnd::Mem(m) => write!(f, "inc dword {m}"),
                _ => write!(f, "inc {dst}"),
            },
            Insn::Dec { dst } => match dst {
                Opnd::Mem(m) => write!(f, "dec dword {m}"),
                _ => write!(f, "dec {dst}"),
            },
            Insn::Shift { op, dst, count } => match count {
                ShiftCount::Imm(n) => write!(f, "{} {dst}, {n}", op.mnemonic()),
                ShiftCount::Cl => write!(f, "{} {dst}, cl", op.mnemonic()),
            },
            Insn::Jmp { target } => write!(f, "jmp {target}"),
            Insn::Jcc { cond, target } => write!(f, "j{} {target}", cond.suffix()),
            Insn::Call { target } => match target {
                CallTarget::Runtime(entry) => write!(f, "call rt:{}", entry.name()),
                CallTarget::Mem(m) => write!(f, "call dword {m}"),
            },
            Insn::Ret { pop_bytes } => {
                if *pop_bytes == 0 {
                    write!(f, "ret")
                } else {
                    write!(f, "ret {pop_bytes}")
                }
            }
            Insn::Fld { width, src } => write!(f, "fld {} {src}", width.keyword()),
            Insn::Fstp { width, dst } => write!(f, "fstp {} {dst}", width.keyword()),
            Insn::FstpSt0 => write!(f, "fstp st(0)"),
            Insn::Fild { src } => write!(f, "fild dword {src}"),
            Insn::Fistp { dst } => write!(f, "fistp dword {dst}"),
            Insn::Fchs => write!(f, "fchs"),
            Insn::FpArith { op } => write!(f, "{} st(1), st(0)", op.mnemonic()),
            Insn::Fprem => write!(f, "fprem"),
            Insn::Fucompp => write!(f, "fucompp"),
            Insn::FnstswAx => write!(f, "fnstsw ax"),
            Insn::Sahf => write!(f, "sahf"),
            Insn::Fnstcw { dst } => write!(f, "fnstcw word {dst}"),
            Insn::Fldcw { src } => write!(f, "fldcw word {src}"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
