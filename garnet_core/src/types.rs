//! Primitive type model shared by the bytecode surface and the compiler.
//!
//! Three views of "type" exist in the tier and they are deliberately kept
//! apart:
//! - [`ValueType`]: what a local variable or expression holds. Sub-int
//!   types widen to `Int` in locals, so they never appear here.
//! - [`FieldKind`]: a field's declared signature character, which decides
//!   load/store width and extension at member-access sites.
//! - [`ElemKind`]: the primitive array element tag carried by `newarray`,
//!   which decides element scale and the tag pushed to the allocator.

use std::fmt;

// =============================================================================
// Value types
// =============================================================================

/// Type of a value held in an IR variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit two's-complement integer (also boolean/byte/char/short after
    /// widening).
    Int,
    /// 32-bit IEEE-754 float.
    Float,
    /// 64-bit IEEE-754 double.
    Double,
    /// 64-bit integer. Recognized so it can be rejected with a distinct
    /// signal; this tier never allocates or lowers longs.
    Long,
    /// Object or array reference (pointer-sized, 32-bit here).
    Reference,
}

impl ValueType {
    /// Size in bytes of a value of this type in a stack slot.
    #[inline]
    #[must_use]
    pub const fn size_bytes(self) -> u32 {
        match self {
            Self::Int | Self::Float | Self::Reference => 4,
            Self::Double | Self::Long => 8,
        }
    }

    /// Number of 32-bit words a value of this type occupies.
    #[inline]
    #[must_use]
    pub const fn word_count(self) -> u32 {
        self.size_bytes() / 4
    }

    /// Whether values of this type live on the x87 stack rather than in
    /// general-purpose registers.
    #[inline]
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Whether the general-purpose register pool may hold this type.
    #[inline]
    #[must_use]
    pub const fn is_gpr_eligible(self) -> bool {
        matches!(self, Self::Int | Self::Reference)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Double => "double",
            Self::Long => "long",
            Self::Reference => "ref",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Field signature kinds
// =============================================================================

/// Declared kind of a field, from its signature character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `Z`: boolean, 8-bit, zero-extended.
    Boolean,
    /// `B`: byte, 8-bit, sign-extended.
    Byte,
    /// `C`: char, 16-bit, zero-extended.
    Char,
    /// `S`: short, 16-bit, sign-extended.
    Short,
    /// `I`: int, 32-bit.
    Int,
    /// `F`: float, 32-bit (moved as raw bits at member-access sites).
    Float,
    /// `J`: long, 64-bit. Unsupported by this tier.
    Long,
    /// `D`: double, 64-bit. Unsupported by this tier at member-access
    /// sites.
    Double,
    /// `L...;` or `[...`: reference, 32-bit.
    Reference,
}

impl FieldKind {
    /// Parse a signature character. Reference signatures are collapsed to
    /// their leading character by the caller (`L` or `[`).
    #[must_use]
    pub const fn from_signature_char(c: u8) -> Option<Self> {
        match c {
            b'Z' => Some(Self::Boolean),
            b'B' => Some(Self::Byte),
            b'C' => Some(Self::Char),
            b'S' => Some(Self::Short),
            b'I' => Some(Self::Int),
            b'F' => Some(Self::Float),
            b'J' => Some(Self::Long),
            b'D' => Some(Self::Double),
            b'L' | b'[' => Some(Self::Reference),
            _ => None,
        }
    }

    /// Access width in bytes at a member-access site.
    #[inline]
    #[must_use]
    pub const fn access_bytes(self) -> u32 {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float | Self::Reference => 4,
            Self::Long | Self::Double => 8,
        }
    }

    /// Whether loads of this kind sign-extend (as opposed to zero-extend).
    /// Only meaningful for sub-word kinds.
    #[inline]
    #[must_use]
    pub const fn sign_extends(self) -> bool {
        matches!(self, Self::Byte | Self::Short)
    }

    /// Whether this kind is too wide for the tier's member-access lowering.
    #[inline]
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }

    /// The value type a loaded field of this kind produces.
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            Self::Boolean | Self::Byte | Self::Char | Self::Short | Self::Int => ValueType::Int,
            Self::Float => ValueType::Float,
            Self::Double => ValueType::Double,
            Self::Long => ValueType::Long,
            Self::Reference => ValueType::Reference,
        }
    }
}

// =============================================================================
// Array element kinds
// =============================================================================

/// Primitive array element kind, as tagged by `newarray`, plus the
/// reference case for object arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemKind {
    /// Boolean elements (1 byte, zero-extended).
    Boolean,
    /// Char elements (2 bytes, zero-extended).
    Char,
    /// Float elements (4 bytes).
    Float,
    /// Double elements (8 bytes).
    Double,
    /// Byte elements (1 byte, sign-extended).
    Byte,
    /// Short elements (2 bytes, sign-extended).
    Short,
    /// Int elements (4 bytes).
    Int,
    /// Long elements (8 bytes). Unsupported by this tier.
    Long,
    /// Reference elements (4 bytes).
    Reference,
}

impl ElemKind {
    /// Decode the `newarray` primitive type tag.
    #[must_use]
    pub const fn from_newarray_tag(tag: u8) -> Option<Self> {
        match tag {
            4 => Some(Self::Boolean),
            5 => Some(Self::Char),
            6 => Some(Self::Float),
            7 => Some(Self::Double),
            8 => Some(Self::Byte),
            9 => Some(Self::Short),
            10 => Some(Self::Int),
            11 => Some(Self::Long),
            _ => None,
        }
    }

    /// The tag pushed to the primitive-array allocation entry point.
    #[inline]
    #[must_use]
    pub const fn newarray_tag(self) -> i32 {
        match self {
            Self::Boolean => 4,
            Self::Char => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::Byte => 8,
            Self::Short => 9,
            Self::Int => 10,
            Self::Long => 11,
            // Object arrays allocate through their own entry point and
            // never push a primitive tag.
            Self::Reference => 0,
        }
    }

    /// log2 of the element size, used as an addressing-mode scale.
    #[inline]
    #[must_use]
    pub const fn log2_scale(self) -> u8 {
        match self {
            Self::Boolean | Self::Byte => 0,
            Self::Char | Self::Short => 1,
            Self::Float | Self::Int | Self::Reference => 2,
            Self::Double | Self::Long => 3,
        }
    }

    /// Element size in bytes.
    #[inline]
    #[must_use]
    pub const fn size_bytes(self) -> u32 {
        1 << self.log2_scale()
    }

    /// Whether element loads sign-extend.
    #[inline]
    #[must_use]
    pub const fn sign_extends(self) -> bool {
        matches!(self, Self::Byte | Self::Short)
    }

    /// Whether this kind is too wide for the tier (longs are rejected by
    /// the pre-check; doubles are handled as paired word moves).
    #[inline]
    #[must_use]
    pub const fn is_long(self) -> bool {
        matches!(self, Self::Long)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Char => "char",
            Self::Float => "float",
            Self::Double => "double",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Reference => "ref",
        }
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================
