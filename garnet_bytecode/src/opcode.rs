//! The stack-bytecode opcode table.
//!
//! One variant per opcode, with the discriminant equal to the encoded
//! byte. Operand lengths cover every fixed-length opcode; the three
//! variable-length opcodes (the switches and the `wide` prefix) report
//! themselves as such and are rejected by the compiler tier before their
//! payloads would ever need decoding.

use std::fmt;

/// A bytecode opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // =========================================================================
    // Constants
    // =========================================================================
    Nop = 0x00,
    AconstNull = 0x01,
    IconstM1 = 0x02,
    Iconst0 = 0x03,
    Iconst1 = 0x04,
    Iconst2 = 0x05,
    Iconst3 = 0x06,
    Iconst4 = 0x07,
    Iconst5 = 0x08,
    Lconst0 = 0x09,
    Lconst1 = 0x0A,
    Fconst0 = 0x0B,
    Fconst1 = 0x0C,
    Fconst2 = 0x0D,
    Dconst0 = 0x0E,
    Dconst1 = 0x0F,
    Bipush = 0x10,
    Sipush = 0x11,
    Ldc = 0x12,
    LdcW = 0x13,
    Ldc2W = 0x14,

    // =========================================================================
    // Local loads
    // =========================================================================
    Iload = 0x15,
    Lload = 0x16,
    Fload = 0x17,
    Dload = 0x18,
    Aload = 0x19,
    Iload0 = 0x1A,
    Iload1 = 0x1B,
    Iload2 = 0x1C,
    Iload3 = 0x1D,
    Lload0 = 0x1E,
    Lload1 = 0x1F,
    Lload2 = 0x20,
    Lload3 = 0x21,
    Fload0 = 0x22,
    Fload1 = 0x23,
    Fload2 = 0x24,
    Fload3 = 0x25,
    Dload0 = 0x26,
    Dload1 = 0x27,
    Dload2 = 0x28,
    Dload3 = 0x29,
    Aload0 = 0x2A,
    Aload1 = 0x2B,
    Aload2 = 0x2C,
    Aload3 = 0x2D,

    // =========================================================================
    // Array loads
    // =========================================================================
    Iaload = 0x2E,
    Laload = 0x2F,
    Faload = 0x30,
    Daload = 0x31,
    Aaload = 0x32,
    Baload = 0x33,
    Caload = 0x34,
    Saload = 0x35,

    // =========================================================================
    // Local stores
    // =========================================================================
    Istore = 0x36,
    Lstore = 0x37,
    Fstore = 0x38,
    Dstore = 0x39,
    Astore = 0x3A,
    Istore0 = 0x3B,
    Istore1 = 0x3C,
    Istore2 = 0x3D,
    Istore3 = 0x3E,
    Lstore0 = 0x3F,
    Lstore1 = 0x40,
    Lstore2 = 0x41,
    Lstore3 = 0x42,
    Fstore0 = 0x43,
    Fstore1 = 0x44,
    Fstore2 = 0x45,
    Fstore3 = 0x46,
    Dstore0 = 0x47,
    Dstore1 = 0x48,
    Dstore2 = 0x49,
    Dstore3 = 0x4A,
    Astore0 = 0x4B,
    Astore1 = 0x4C,
    Astore2 = 0x4D,
    Astore3 = 0x4E,

    // =========================================================================
    // Array stores
    // =========================================================================
    Iastore = 0x4F,
    Lastore = 0x50,
    Fastore = 0x51,
    Dastore = 0x52,
    Aastore = 0x53,
    Bastore = 0x54,
    Castore = 0x55,
    Sastore = 0x56,

    // =========================================================================
    // Stack shuffles
    // =========================================================================
    Pop = 0x57,
    Pop2 = 0x58,
    Dup = 0x59,
    DupX1 = 0x5A,
    DupX2 = 0x5B,
    Dup2 = 0x5C,
    Dup2X1 = 0x5D,
    Dup2X2 = 0x5E,
    Swap = 0x5F,

    // =========================================================================
    // Arithmetic
    // =========================================================================
    Iadd = 0x60,
    Ladd = 0x61,
    Fadd = 0x62,
    Dadd = 0x63,
    Isub = 0x64,
    Lsub = 0x65,
    Fsub = 0x66,
    Dsub = 0x67,
    Imul = 0x68,
    Lmul = 0x69,
    Fmul = 0x6A,
    Dmul = 0x6B,
    Idiv = 0x6C,
    Ldiv = 0x6D,
    Fdiv = 0x6E,
    Ddiv = 0x6F,
    Irem = 0x70,
    Lrem = 0x71,
    Frem = 0x72,
    Drem = 0x73,
    Ineg = 0x74,
    Lneg = 0x75,
    Fneg = 0x76,
    Dneg = 0x77,
    Ishl = 0x78,
    Lshl = 0x79,
    Ishr = 0x7A,
    Lshr = 0x7B,
    Iushr = 0x7C,
    Lushr = 0x7D,
    Iand = 0x7E,
    Land = 0x7F,
    Ior = 0x80,
    Lor = 0x81,
    Ixor = 0x82,
    Lxor = 0x83,
    Iinc = 0x84,

    // =========================================================================
    // Conversions
    // =========================================================================
    I2l = 0x85,
    I2f = 0x86,
    I2d = 0x87,
    L2i = 0x88,
    L2f = 0x89,
    L2d = 0x8A,
    F2i = 0x8B,
    F2l = 0x8C,
    F2d = 0x8D,
    D2i = 0x8E,
    D2l = 0x8F,
    D2f = 0x90,
    I2b = 0x91,
    I2c = 0x92,
    I2s = 0x93,

    // =========================================================================
    // Comparisons and branches
    // =========================================================================
    Lcmp = 0x94,
    Fcmpl = 0x95,
    Fcmpg = 0x96,
    Dcmpl = 0x97,
    Dcmpg = 0x98,
    Ifeq = 0x99,
    Ifne = 0x9A,
    Iflt = 0x9B,
    Ifge = 0x9C,
    Ifgt = 0x9D,
    Ifle = 0x9E,
    IfIcmpeq = 0x9F,
    IfIcmpne = 0xA0,
    IfIcmplt = 0xA1,
    IfIcmpge = 0xA2,
    IfIcmpgt = 0xA3,
    IfIcmple = 0xA4,
    IfAcmpeq = 0xA5,
    IfAcmpne = 0xA6,
    Goto = 0xA7,
    Jsr = 0xA8,
    Ret = 0xA9,
    Tableswitch = 0xAA,
    Lookupswitch = 0xAB,

    // =========================================================================
    // Returns
    // =========================================================================
    Ireturn = 0xAC,
    Lreturn = 0xAD,
    Freturn = 0xAE,
    Dreturn = 0xAF,
    Areturn = 0xB0,
    Return = 0xB1,

    // =========================================================================
    // Field and method access
    // =========================================================================
    Getstatic = 0xB2,
    Putstatic = 0xB3,
    Getfield = 0xB4,
    Putfield = 0xB5,
    Invokevirtual = 0xB6,
    Invokespecial = 0xB7,
    Invokestatic = 0xB8,
    Invokeinterface = 0xB9,
    Invokedynamic = 0xBA,

    // =========================================================================
    // Objects, arrays, monitors
    // =========================================================================
    New = 0xBB,
    Newarray = 0xBC,
    Anewarray = 0xBD,
    Arraylength = 0xBE,
    Athrow = 0xBF,
    Checkcast = 0xC0,
    Instanceof = 0xC1,
    Monitorenter = 0xC2,
    Monitorexit = 0xC3,

    // =========================================================================
    // Extended
    // =========================================================================
    Wide = 0xC4,
    Multianewarray = 0xC5,
    Ifnull = 0xC6,
    Ifnonnull = 0xC7,
    GotoW = 0xC8,
    JsrW = 0xC9,
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Opcode::Nop),
            0x01 => Some(Opcode::AconstNull),
            0x02 => Some(Opcode::IconstM1),
            0x03 => Some(Opcode::Iconst0),
            0x04 => Some(Opcode::Iconst1),
            0x05 => Some(Opcode::Iconst2),
            0x06 => Some(Opcode::Iconst3),
            0x07 => Some(Opcode::Iconst4),
            0x08 => Some(Opcode::Iconst5),
            0x09 => Some(Opcode::Lconst0),
            0x0A => Some(Opcode::Lconst1),
            0x0B => Some(Opcode::Fconst0),
            0x0C => Some(Opcode::Fconst1),
            0x0D => Some(Opcode::Fconst2),
            0x0E => Some(Opcode::Dconst0),
            0x0F => Some(Opcode::Dconst1),
            0x10 => Some(Opcode::Bipush),
            0x11 => Some(Opcode::Sipush),
            0x12 => Some(Opcode::Ldc),
            0x13 => Some(Opcode::LdcW),
            0x14 => Some(Opcode::Ldc2W),

            0x15 => Some(Opcode::Iload),
            0x16 => Some(Opcode::Lload),
            0x17 => Some(Opcode::Fload),
            0x18 => Some(Opcode::Dload),
            0x19 => Some(Opcode::Aload),
            0x1A => Some(Opcode::Iload0),
            0x1B => Some(Opcode::Iload1),
            0x1C => Some(Opcode::Iload2),
            0x1D => Some(Opcode::Iload3),
            0x1E => Some(Opcode::Lload0),
            0x1F => Some(Opcode::Lload1),
            0x20 => Some(Opcode::Lload2),
            0x21 => Some(Opcode::Lload3),
            0x22 => Some(Opcode::Fload0),
            0x23 => Some(Opcode::Fload1),
            0x24 => Some(Opcode::Fload2),
            0x25 => Some(Opcode::Fload3),
            0x26 => Some(Opcode::Dload0),
            0x27 => Some(Opcode::Dload1),
            0x28 => Some(Opcode::Dload2),
            0x29 => Some(Opcode::Dload3),
            0x2A => Some(Opcode::Aload0),
            0x2B => Some(Opcode::Aload1),
            0x2C => Some(Opcode::Aload2),
            0x2D => Some(Opcode::Aload3),

            0x2E => Some(Opcode::Iaload),
            0x2F => Some(Opcode::Laload),
            0x30 => Some(Opcode::Faload),
            0x31 => Some(Opcode::Daload),
            0x32 => Some(Opcode::Aaload),
            0x33 => Some(Opcode::Baload),
            0x34 => Some(Opcode::Caload),
            0x35 => Some(Opcode::Saload),

            0x36 => Some(Opcode::Istore),
            0x37 => Some(Opcode::Lstore),
            0x38 => Some(Opcode::Fstore),
            0x39 => Some(Opcode::Dstore),
            0x3A => Some(Opcode::Astore),
            0x3B => Some(Opcode::Istore0),
            0x3C => Some(Opcode::Istore1),
            0x3D => Some(Opcode::Istore2),
            0x3E => Some(Opcode::Istore3),
            0x3F => Some(Opcode::Lstore0),
            0x40 => Some(Opcode::Lstore1),
            0x41 => Some(Opcode::Lstore2),
            0x42 => Some(Opcode::Lstore3),
            0x43 => Some(Opcode::Fstore0),
            0x44 => Some(Opcode::Fstore1),
            0x45 => Some(Opcode::Fstore2),
            0x46 => Some(Opcode::Fstore3),
            0x47 => Some(Opcode::Dstore0),
            0x48 => Some(Opcode::Dstore1),
            0x49 => Some(Opcode::Dstore2),
            0x4A => Some(Opcode::Dstore3),
            0x4B => Some(Opcode::Astore0),
            0x4C => Some(Opcode::Astore1),
            0x4D => Some(Opcode::Astore2),
            0x4E => Some(Opcode::Astore3),

            0x4F => Some(Opcode::Iastore),
            0x50 => Some(Opcode::Lastore),
            0x51 => Some(Opcode::Fastore),
            0x52 => Some(Opcode::Dastore),
            0x53 => Some(Opcode::Aastore),
            0x54 => Some(Opcode::Bastore),
            0x55 => Some(Opcode::Castore),
            0x56 => Some(Opcode::Sastore),

            0x57 => Some(Opcode::Pop),
            0x58 => Some(Opcode::Pop2),
            0x59 => Some(Opcode::Dup),
            0x5A => Some(Opcode::DupX1),
            0x5B => Some(Opcode::DupX2),
            0x5C => Some(Opcode::Dup2),
            0x5D => Some(Opcode::Dup2X1),
            0x5E => Some(Opcode::Dup2X2),
            0x5F => Some(Opcode::Swap),

            0x60 => Some(Opcode::Iadd),
            0x61 => Some(Opcode::Ladd),
            0x62 => Some(Opcode::Fadd),
            0x63 => Some(Opcode::Dadd),
            0x64 => Some(Opcode::Isub),
            0x65 => Some(Opcode::Lsub),
            0x66 => Some(Opcode::Fsub),
            0x67 => Some(Opcode::Dsub),
            0x68 => Some(Opcode::Imul),
            0x69 => Some(Opcode::Lmul),
            0x6A => Some(Opcode::Fmul),
            0x6B => Some(Opcode::Dmul),
            0x6C => Some(Opcode::Idiv),
            0x6D => Some(Opcode::Ldiv),
            0x6E => Some(Opcode::Fdiv),
            0x6F => Some(Opcode::Ddiv),
            0x70 => Some(Opcode::Irem),
            0x71 => Some(Opcode::Lrem),
            0x72 => Some(Opcode::Frem),
            0x73 => Some(Opcode::Drem),
            0x74 => Some(Opcode::Ineg),
            0x75 => Some(Opcode::Lneg),
            0x76 => Some(Opcode::Fneg),
            0x77 => Some(Opcode::Dneg),
            0x78 => Some(Opcode::Ishl),
            0x79 => Some(Opcode::Lshl),
            0x7A => Some(Opcode::Ishr),
            0x7B => Some(Opcode::Lshr),
            0x7C => Some(Opcode::Iushr),
            0x7D => Some(Opcode::Lushr),
            0x7E => Some(Opcode::Iand),
            0x7F => Some(Opcode::Land),
            0x80 => Some(Opcode::Ior),
            0x81 => Some(Opcode::Lor),
            0x82 => Some(Opcode::Ixor),
            0x83 => Some(Opcode::Lxor),
            0x84 => Some(Opcode::Iinc),

            0x85 => Some(Opcode::I2l),
            0x86 => Some(Opcode::I2f),
            0x87 => Some(Opcode::I2d),
            0x88 => Some(Opcode::L2i),
            0x89 => Some(Opcode::L2f),
            0x8A => Some(Opcode::L2d),
            0x8B => Some(Opcode::F2i),
            0x8C => Some(Opcode::F2l),
            0x8D => Some(Opcode::F2d),
            0x8E => Some(Opcode::D2i),
            0x8F => Some(Opcode::D2l),
            0x90 => Some(Opcode::D2f),
            0x91 => Some(Opcode::I2b),
            0x92 => Some(Opcode::I2c),
            0x93 => Some(Opcode::I2s),

            0x94 => Some(Opcode::Lcmp),
            0x95 => Some(Opcode::Fcmpl),
            0x96 => Some(Opcode::Fcmpg),
            0x97 => Some(Opcode::Dcmpl),
            0x98 => Some(Opcode::Dcmpg),
            0x99 => Some(Opcode::Ifeq),
            0x9A => Some(Opcode::Ifne),
            0x9B => Some(Opcode::Iflt),
            0x9C => Some(Opcode::Ifge),
            0x9D => Some(Opcode::Ifgt),
            0x9E => Some(Opcode::Ifle),
            0x9F => Some(Opcode::IfIcmpeq),
            0xA0 => Some(Opcode::IfIcmpne),
            0xA1 => Some(Opcode::IfIcmplt),
            0xA2 => Some(Opcode::IfIcmpge),
            0xA3 => Some(Opcode::IfIcmpgt),
            0xA4 => Some(Opcode::IfIcmple),
            0xA5 => Some(Opcode::IfAcmpeq),
            0xA6 => Some(Opcode::IfAcmpne),
            0xA7 => Some(Opcode::Goto),
            0xA8 => Some(Opcode::Jsr),
            0xA9 => Some(Opcode::Ret),
            0xAA => Some(Opcode::Tableswitch),
            0xAB => Some(Opcode::Lookupswitch),

            0xAC => Some(Opcode::Ireturn),
            0xAD => Some(Opcode::Lreturn),
            0xAE => Some(Opcode::Freturn),
            0xAF => Some(Opcode::Dreturn),
            0xB0 => Some(Opcode::Areturn),
            0xB1 => Some(Opcode::Return),

            0xB2 => Some(Opcode::Getstatic),
            0xB3 => Some(Opcode::Putstatic),
            0xB4 => Some(Opcode::Getfield),
            0xB5 => Some(Opcode::Putfield),
            0xB6 => Some(Opcode::Invokevirtual),
            0xB7 => Some(Opcode::Invokespecial),
            0xB8 => Some(Opcode::Invokestatic),
            0xB9 => Some(Opcode::Invokeinterface),
            0xBA => Some(Opcode::Invokedynamic),

            0xBB => Some(Opcode::New),
            0xBC => Some(Opcode::Newarray),
            0xBD => Some(Opcode::Anewarray),
            0xBE => Some(Opcode::Arraylength),
            0xBF => Some(Opcode::Athrow),
            0xC0 => Some(Opcode::Checkcast),
            0xC1 => Some(Opcode::Instanceof),
            0xC2 => Some(Opcode::Monitorenter),
            0xC3 => Some(Opcode::Monitorexit),

            0xC4 => Some(Opcode::Wide),
            0xC5 => Some(Opcode::Multianewarray),
            0xC6 => Some(Opcode::Ifnull),
            0xC7 => Some(Opcode::Ifnonnull),
            0xC8 => Some(Opcode::GotoW),
            0xC9 => Some(Opcode::JsrW),

            _ => None,
        }
    }

    /// Encoded opcode byte.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Number of fixed operand bytes following the opcode byte.
    ///
    /// Variable-length opcodes ([`Opcode::is_variable_length`]) return 0
    /// here; callers must check for them first.
    #[must_use]
    pub const fn operand_len(self) -> usize {
        match self {
            // One-byte operand: small immediates, local indices, newarray
            // tag.
            Opcode::Bipush
            | Opcode::Ldc
            | Opcode::Iload
            | Opcode::Lload
            | Opcode::Fload
            | Opcode::Dload
            | Opcode::Aload
            | Opcode::Istore
            | Opcode::Lstore
            | Opcode::Fstore
            | Opcode::Dstore
            | Opcode::Astore
            | Opcode::Ret
            | Opcode::Newarray => 1,

            // Two-byte operand: wide immediates, constant-pool indices,
            // branch displacements, iinc.
            Opcode::Sipush
            | Opcode::LdcW
            | Opcode::Ldc2W
            | Opcode::Iinc
            | Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle
            | Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne
            | Opcode::Goto
            | Opcode::Jsr
            | Opcode::Getstatic
            | Opcode::Putstatic
            | Opcode::Getfield
            | Opcode::Putfield
            | Opcode::Invokevirtual
            | Opcode::Invokespecial
            | Opcode::Invokestatic
            | Opcode::New
            | Opcode::Anewarray
            | Opcode::Checkcast
            | Opcode::Instanceof
            | Opcode::Ifnull
            | Opcode::Ifnonnull => 2,

            // Three-byte operand: multianewarray (index + dimension
            // count).
            Opcode::Multianewarray => 3,

            // Four-byte operand: wide branches, interface/dynamic invokes.
            Opcode::Invokeinterface | Opcode::Invokedynamic | Opcode::GotoW | Opcode::JsrW => 4,

            _ => 0,
        }
    }

    /// Whether this opcode's encoded length depends on its payload (the
    /// switches are padded and table-driven, `wide` modifies its
    /// successor).
    #[inline]
    #[must_use]
    pub const fn is_variable_length(self) -> bool {
        matches!(
            self,
            Opcode::Tableswitch | Opcode::Lookupswitch | Opcode::Wide
        )
    }

    /// Lowercase mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::AconstNull => "aconst_null",
            Opcode::IconstM1 => "iconst_m1",
            Opcode::Iconst0 => "iconst_0",
            Opcode::Iconst1 => "iconst_1",
            Opcode::Iconst2 => "iconst_2",
            Opcode::Iconst3 => "iconst_3",
            Opcode::Iconst4 => "iconst_4",
            Opcode::Iconst5 => "iconst_5",
            Opcode::Lconst0 => "lconst_0",
            Opcode::Lconst1 => "lconst_1",
            Opcode::Fconst0 => "fconst_0",
            Opcode::Fconst1 => "fconst_1",
            Opcode::Fconst2 => "fconst_2",
            Opcode::Dconst0 => "dconst_0",
            Opcode::Dconst1 => "dconst_1",
            Opcode::Bipush => "bipush",
            Opcode::Sipush => "sipush",
            Opcode::Ldc => "ldc",
            Opcode::LdcW => "ldc_w",
            Opcode::Ldc2W => "ldc2_w",
            Opcode::Iload => "iload",
            Opcode::Lload => "lload",
            Opcode::Fload => "fload",
            Opcode::Dload => "dload",
            Opcode::Aload => "aload",
            Opcode::Iload0 => "iload_0",
            Opcode::Iload1 => "iload_1",
            Opcode::Iload2 => "iload_2",
            Opcode::Iload3 => "iload_3",
            Opcode::Lload0 => "lload_0",
            Opcode::Lload1 => "lload_1",
            Opcode::Lload2 => "lload_2",
            Opcode::Lload3 => "lload_3",
            Opcode::Fload0 => "fload_0",
            Opcode::Fload1 => "fload_1",
            Opcode::Fload2 => "fload_2",
            Opcode::Fload3 => "fload_3",
            Opcode::Dload0 => "dload_0",
            Opcode::Dload1 => "dload_1",
            Opcode::Dload2 => "dload_2",
            Opcode::Dload3 => "dload_3",
            Opcode::Aload0 => "aload_0",
            Opcode::Aload1 => "aload_1",
            Opcode::Aload2 => "aload_2",
            Opcode::Aload3 => "aload_3",
            Opcode::Iaload => "iaload",
            Opcode::Laload => "laload",
            Opcode::Faload => "faload",
            Opcode::Daload => "daload",
            Opcode::Aaload => "aaload",
            Opcode::Baload => "baload",
            Opcode::Caload => "caload",
            Opcode::Saload => "saload",
            Opcode::Istore => "istore",
            Opcode::Lstore => "lstore",
            Opcode::Fstore => "fstore",
            Opcode::Dstore => "dstore",
            Opcode::Astore => "astore",
            Opcode::Istore0 => "istore_0",
            Opcode::Istore1 => "istore_1",
            Opcode::Istore2 => "istore_2",
            Opcode::Istore3 => "istore_3",
            Opcode::Lstore0 => "lstore_0",
            Opcode::Lstore1 => "lstore_1",
            Opcode::Lstore2 => "lstore_2",
            Opcode::Lstore3 => "lstore_3",
            Opcode::Fstore0 => "fstore_0",
            Opcode::Fstore1 => "fstore_1",
            Opcode::Fstore2 => "fstore_2",
            Opcode::Fstore3 => "fstore_3",
            Opcode::Dstore0 => "dstore_0",
            Opcode::Dstore1 => "dstore_1",
            Opcode::Dstore2 => "dstore_2",
            Opcode::Dstore3 => "dstore_3",
            Opcode::Astore0 => "astore_0",
            Opcode::Astore1 => "astore_1",
            Opcode::Astore2 => "astore_2",
            Opcode::Astore3 => "astore_3",
            Opcode::Iastore => "iastore",
            Opcode::Lastore => "lastore",
            Opcode::Fastore => "fastore",
            Opcode::Dastore => "dastore",
            Opcode::Aastore => "aastore",
            Opcode::Bastore => "bastore",
            Opcode::Castore => "castore",
            Opcode::Sastore => "sastore",
            Opcode::Pop => "pop",
            Opcode::Pop2 => "pop2",
            Opcode::Dup => "dup",
            Opcode::DupX1 => "dup_x1",
            Opcode::DupX2 => "dup_x2",
            Opcode::Dup2 => "dup2",
            Opcode::Dup2X1 => "dup2_x1",
            Opcode::Dup2X2 => "dup2_x2",
            Opcode::Swap => "swap",
            Opcode::Iadd => "iadd",
            Opcode::Ladd => "ladd",
            Opcode::Fadd => "fadd",
            Opcode::Dadd => "dadd",
            Opcode::Isub => "isub",
            Opcode::Lsub => "lsub",
            Opcode::Fsub => "fsub",
            Opcode::Dsub => "dsub",
            Opcode::Imul => "imul",
            Opcode::Lmul => "lmul",
            Opcode::Fmul => "fmul",
            Opcode::Dmul => "dmul",
            Opcode::Idiv => "idiv",
            Opcode::Ldiv => "ldiv",
            Opcode::Fdiv => "fdiv",
            Opcode::Ddiv => "ddiv",
            Opcode::Irem => "irem",
            Opcode::Lrem => "lrem",
            Opcode::Frem => "frem",
            Opcode::Drem => "drem",
            Opcode::Ineg => "ineg",
            Opcode::Lneg => "lneg",
            Opcode::Fneg => "fneg",
            Opcode::Dneg => "dneg",
            Opcode::Ishl => "ishl",
            Opcode::Lshl => "lshl",
            Opcode::Ishr => "ishr",
            Opcode::Lshr => "lshr",
            Opcode::Iushr => "iushr",
            Opcode::Lushr => "lushr",
            Opcode::Iand => "iand",
            Opcode::Land => "land",
            Opcode::Ior => "ior",
            Opcode::Lor => "lor",
            Opcode::Ixor => "ixor",
            Opcode::Lxor => "lxor",
            Opcode::Iinc => "iinc",
            Opcode::I2l => "i2l",
            Opcode::I2f => "i2f",
            Opcode::I2d => "i2d",
            Opcode::L2i => "l2i",
            Opcode::L2f => "l2f",
            Opcode::L2d => "l2d",
            Opcode::F2i => "f2i",
            Opcode::F2l => "f2l",
            Opcode::F2d => "f2d",
            Opcode::D2i => "d2i",
            Opcode::D2l => "d2l",
            Opcode::D2f => "d2f",
            Opcode::I2b => "i2b",
            Opcode::I2c => "i2c",
            Opcode::I2s => "i2s",
            Opcode::Lcmp => "lcmp",
            Opcode::Fcmpl => "fcmpl",
            Opcode::Fcmpg => "fcmpg",
            Opcode::Dcmpl => "dcmpl",
            Opcode::Dcmpg => "dcmpg",
            Opcode::Ifeq => "ifeq",
            Opcode::Ifne => "ifne",
            Opcode::Iflt => "iflt",
            Opcode::Ifge => "ifge",
            Opcode::Ifgt => "ifgt",
            Opcode::Ifle => "ifle",
            Opcode::IfIcmpeq => "if_icmpeq",
            Opcode::IfIcmpne => "if_icmpne",
            Opcode::IfIcmplt => "if_icmplt",
            Opcode::IfIcmpge => "if_icmpge",
            Opcode::IfIcmpgt => "if_icmpgt",
            Opcode::IfIcmple => "if_icmple",
            Opcode::IfAcmpeq => "if_acmpeq",
            Opcode::IfAcmpne => "if_acmpne",
            Opcode::Goto => "goto",
            Opcode::Jsr => "jsr",
            Opcode::Ret => "ret",
            Opcode::Tableswitch => "tableswitch",
            Opcode::Lookupswitch => "lookupswitch",
            Opcode::Ireturn => "ireturn",
            Opcode::Lreturn => "lreturn",
            Opcode::Freturn => "freturn",
            Opcode::Dreturn => "dreturn",
            Opcode::Areturn => "areturn",
            Opcode::Return => "return",
            Opcode::Getstatic => "getstatic",
            Opcode::Putstatic => "putstatic",
            Opcode::Getfield => "getfield",
            Opcode::Putfield => "putfield",
            Opcode::Invokevirtual => "invokevirtual",
            Opcode::Invokespecial => "invokespecial",
            Opcode::Invokestatic => "invokestatic",
            Opcode::Invokeinterface => "invokeinterface",
            Opcode::Invokedynamic => "invokedynamic",
            Opcode::New => "new",
            Opcode::Newarray => "newarray",
            Opcode::Anewarray => "anewarray",
            Opcode::Arraylength => "arraylength",
            Opcode::Athrow => "athrow",
            Opcode::Checkcast => "checkcast",
            Opcode::Instanceof => "instanceof",
            Opcode::Monitorenter => "monitorenter",
            Opcode::Monitorexit => "monitorexit",
            Opcode::Wide => "wide",
            Opcode::Multianewarray => "multianewarray",
            Opcode::Ifnull => "ifnull",
            Opcode::Ifnonnull => "ifnonnull",
            Opcode::GotoW => "goto_w",
            Opcode::JsrW => "jsr_w",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

// =============================================================================
// Tests
// =============================================================================
