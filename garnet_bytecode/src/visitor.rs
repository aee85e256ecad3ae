//! Single-pass opcode visitor.
//!
//! [`walk`] drives a [`BytecodeReader`] over a method's code and hands
//! every `(offset, opcode)` pair to the visitor. The first `Err` from the
//! visitor (or from the reader itself) stops the walk immediately; this
//! fail-fast shape is what makes the compatibility pre-check cheap.

use crate::opcode::Opcode;
use crate::reader::BytecodeReader;
use garnet_core::JitResult;

/// Receiver for a bytecode walk.
pub trait OpcodeVisitor {
    /// Called once per opcode, in code order.
    fn visit(&mut self, offset: usize, op: Opcode) -> JitResult<()>;
}

/// Walk a method's code, visiting every opcode until the end or the first
/// error.
pub fn walk<V: OpcodeVisitor>(code: &[u8], visitor: &mut V) -> JitResult<()> {
    let mut reader = BytecodeReader::new(code);
    while let Some((offset, op)) = reader.next_opcode()? {
        visitor.visit(offset, op)?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
