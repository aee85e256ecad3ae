//! General-purpose register definitions for the 32-bit target.
//!
//! # Register roles
//!
//! The tier fixes register roles up front instead of tracking them
//! dynamically:
//! - `eax` is the scratch register. It is never allocated to a variable,
//!   so every lowering may clobber it freely; it also carries integer and
//!   reference return values.
//! - `ecx` and `edx` are allocatable but caller-saved; the allocator
//!   withholds them from live ranges that cross a call. They double as
//!   the architecture's fixed shift-count (`cl`) and remainder (`edx`)
//!   registers, which the affected lowerings save and restore explicitly.
//! - `ebx`, `esi`, `edi` are allocatable callee-saved registers; the
//!   prologue saves any that the allocator hands out.
//! - `esp` and `ebp` are the stack and frame pointers and are never
//!   allocated.

use std::fmt;

// =============================================================================
// Gpr
// =============================================================================

/// A general-purpose register. The discriminant is the hardware encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Gpr {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

impl Gpr {
    /// All eight registers in encoding order.
    pub const ALL: [Gpr; 8] = [
        Gpr::Eax,
        Gpr::Ecx,
        Gpr::Edx,
        Gpr::Ebx,
        Gpr::Esp,
        Gpr::Ebp,
        Gpr::Esi,
        Gpr::Edi,
    ];

    /// Hardware encoding (0-7).
    #[inline]
    #[must_use]
    pub const fn encoding(self) -> u8 {
        self as u8
    }

    /// Decode a hardware encoding.
    #[must_use]
    pub const fn from_encoding(enc: u8) -> Option<Self> {
        match enc {
            0 => Some(Gpr::Eax),
            1 => Some(Gpr::Ecx),
            2 => Some(Gpr::Edx),
            3 => Some(Gpr::Ebx),
            4 => Some(Gpr::Esp),
            5 => Some(Gpr::Ebp),
            6 => Some(Gpr::Esi),
            7 => Some(Gpr::Edi),
            _ => None,
        }
    }

    /// 32-bit register name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Gpr::Eax => "eax",
            Gpr::Ecx => "ecx",
            Gpr::Edx => "edx",
            Gpr::Ebx => "ebx",
            Gpr::Esp => "esp",
            Gpr::Ebp => "ebp",
            Gpr::Esi => "esi",
            Gpr::Edi => "edi",
        }
    }

    /// Whether the low 8 bits are addressable as a byte register
    /// (al/cl/dl/bl). `esi`/`edi` have no byte form in 32-bit mode, which
    /// is why byte-wide stores route their value through `eax` or `ecx`.
    #[inline]
    #[must_use]
    pub const fn has_low_byte(self) -> bool {
        matches!(self, Gpr::Eax | Gpr::Ecx | Gpr::Edx | Gpr::Ebx)
    }

    /// Low-byte register name (panics for registers without one; callers
    /// check [`Gpr::has_low_byte`] or use a routed register).
    #[must_use]
    pub const fn low_byte_name(self) -> &'static str {
        match self {
            Gpr::Eax => "al",
            Gpr::Ecx => "cl",
            Gpr::Edx => "dl",
            Gpr::Ebx => "bl",
            _ => "<no byte form>",
        }
    }

    /// Low-word (16-bit) register name.
    #[must_use]
    pub const fn low_word_name(self) -> &'static str {
        match self {
            Gpr::Eax => "ax",
            Gpr::Ecx => "cx",
            Gpr::Edx => "dx",
            Gpr::Ebx => "bx",
            Gpr::Esp => "sp",
            Gpr::Ebp => "bp",
            Gpr::Esi => "si",
            Gpr::Edi => "di",
        }
    }

    /// Whether this register is preserved across calls by the callee.
    #[inline]
    #[must_use]
    pub const fn is_callee_saved(self) -> bool {
        matches!(self, Gpr::Ebx | Gpr::Esi | Gpr::Edi)
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// GprSet
// =============================================================================

/// A set of general-purpose registers as a bitmask over encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GprSet(u8);

impl GprSet {
    /// The empty set.
    pub const EMPTY: GprSet = GprSet(0);

    /// Registers the allocator may hand out to variables.
    pub const ALLOCATABLE: GprSet = GprSet::EMPTY
        .inserted(Gpr::Ecx)
        .inserted(Gpr::Edx)
        .inserted(Gpr::Ebx)
        .inserted(Gpr::Esi)
        .inserted(Gpr::Edi);

    /// Allocatable registers that survive calls.
    pub const CALLEE_SAVED: GprSet = GprSet::EMPTY
        .inserted(Gpr::Ebx)
        .inserted(Gpr::Esi)
        .inserted(Gpr::Edi);

    /// Allocatable registers clobbered by calls.
    pub const CALLER_SAVED: GprSet = GprSet::EMPTY.inserted(Gpr::Ecx).inserted(Gpr::Edx);

    /// Create a set from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        GprSet(bits)
    }

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Copy of this set with `reg` inserted.
    #[inline]
    #[must_use]
    pub const fn inserted(self, reg: Gpr) -> Self {
        GprSet(self.0 | (1 << reg.encoding()))
    }

    /// Copy of this set with `reg` removed.
    #[inline]
    #[must_use]
    pub const fn removed(self, reg: Gpr) -> Self {
        GprSet(self.0 & !(1 << reg.encoding()))
    }

    /// Insert in place.
    #[inline]
    pub fn insert(&mut self, reg: Gpr) {
        self.0 |= 1 << reg.encoding();
    }

    /// Remove in place.
    #[inline]
    pub fn remove(&mut self, reg: Gpr) {
        self.0 &= !(1 << reg.encoding());
    }

    /// Membership test.
    #[inline]
    #[must_use]
    pub const fn contains(self, reg: Gpr) -> bool {
        self.0 & (1 << reg.encoding()) != 0
    }

    /// Whether the set is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of registers in the set.
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate members in encoding order.
    pub fn iter(self) -> impl Iterator<Item = Gpr> {
        Gpr::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl fmt::Display for GprSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for reg in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{reg}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Tests
// =============================================================================
