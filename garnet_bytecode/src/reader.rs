//! Bounds-checked bytecode reader.
//!
//! Produces `(offset, opcode)` pairs in code order, skipping operand bytes
//! by table lookup. The reader refuses to guess at constructs it cannot
//! size: an unassigned opcode byte, a truncated operand, or one of the
//! variable-length opcodes stops the walk with an error. The compiler tier
//! rejects methods containing the variable-length opcodes anyway, so the
//! reader never needs their payload layout.

use crate::opcode::Opcode;
use garnet_core::{JitError, JitResult};

/// Cursor over a method's code array.
#[derive(Debug)]
pub struct BytecodeReader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> BytecodeReader<'a> {
    /// Create a reader over a method's code.
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, pos: 0 }
    }

    /// Current offset (the offset of the next opcode to be read).
    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Whether the whole code array has been consumed.
    #[inline]
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.code.len()
    }

    /// Read the next `(offset, opcode)` pair, advancing past the opcode
    /// and its fixed operands. Returns `Ok(None)` at the end of the code.
    pub fn next_opcode(&mut self) -> JitResult<Option<(usize, Opcode)>> {
        if self.is_at_end() {
            return Ok(None);
        }
        let at = self.pos;
        let byte = self.code[at];
        let op = Opcode::from_u8(byte).ok_or_else(|| {
            JitError::internal(format!("unassigned opcode byte {byte:#04x} at offset {at}"))
        })?;

        if op.is_variable_length() {
            // The walk cannot continue past a payload of unknown length.
            return Err(JitError::not_supported(format!(
                "{} at offset {at}",
                op.mnemonic()
            )));
        }

        let next = at + 1 + op.operand_len();
        if next > self.code.len() {
            return Err(JitError::internal(format!(
                "truncated operands for {} at offset {at}",
                op.mnemonic()
            )));
        }
        self.pos = next;
        Ok(Some((at, op)))
    }

    /// Operand bytes of the opcode most recently returned, given its
    /// offset.
    #[must_use]
    pub fn operands_at(&self, offset: usize, op: Opcode) -> &'a [u8] {
        let start = offset + 1;
        &self.code[start..start + op.operand_len()]
    }
}

// =============================================================================
// Tests
// =============================================================================
