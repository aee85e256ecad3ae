//! Bytecode compatibility pre-check.
//!
//! One cheap pass over a method's code before any IR is built. The walk
//! fails on the first opcode this tier has no lowering for; the driver
//! declines the method and leaves it to another tier. Rejected
//! categories:
//! - 64-bit integer opcodes: the allocator keeps longs out of the
//!   register pool, so nothing downstream can place them
//! - operand-stack shuffles (`pop`, the `dup` family, `swap`), which the
//!   quad front end never materializes
//! - subroutines (`jsr`/`ret`) and the four-byte-offset branches
//! - type tests (`checkcast`/`instanceof`), interface and dynamic
//!   dispatch
//! - the variable-length opcodes (the switches, `wide`), which already
//!   stop the reader itself
//!
//! Passing the check does not guarantee compilation succeeds: a 64-bit
//! field kind or an unresolvable member surfaces only once metadata
//! resolution runs. The opcode walk is merely the cheapest filter, and
//! it catches the common declines before the pipeline spends any work.

use garnet_bytecode::{walk, Opcode, OpcodeVisitor};
use garnet_core::{JitError, JitResult};

/// Visitor that accepts exactly the opcodes this tier can lower.
#[derive(Debug, Default)]
pub struct OpcodeSupport;

impl OpcodeVisitor for OpcodeSupport {
    fn visit(&mut self, offset: usize, op: Opcode) -> JitResult<()> {
        if is_supported(op) {
            Ok(())
        } else {
            Err(JitError::not_supported(format!(
                "{} at offset {offset}",
                op.mnemonic()
            )))
        }
    }
}

/// Whether this tier has a lowering for `op`.
///
/// The constant-pool loads (`ldc`, `ldc_w`, `ldc2_w`) are accepted even
/// though string and class entries are not lowered: the entry kind is
/// not visible from the code array alone, and the front end declines
/// such entries when it meets them.
#[must_use]
pub fn is_supported(op: Opcode) -> bool {
    use Opcode::*;
    !matches!(
        op,
        // The 64-bit integer family, kept out of the register pool by
        // tier policy.
        Lconst0
            | Lconst1
            | Lload
            | Lload0
            | Lload1
            | Lload2
            | Lload3
            | Laload
            | Lastore
            | Lstore
            | Lstore0
            | Lstore1
            | Lstore2
            | Lstore3
            | Ladd
            | Lsub
            | Lmul
            | Ldiv
            | Lrem
            | Lneg
            | Lshl
            | Lshr
            | Lushr
            | Land
            | Lor
            | Lxor
            | I2l
            | F2l
            | D2l
            | L2i
            | L2f
            | L2d
            | Lcmp
            | Lreturn
            // Operand-stack shuffles never reach the quad stream.
            | Pop
            | Pop2
            | Dup
            | DupX1
            | DupX2
            | Dup2
            | Dup2X1
            | Dup2X2
            | Swap
            // Subroutines and four-byte branch offsets.
            | Jsr
            | Ret
            | JsrW
            | GotoW
            // Type tests, interface and dynamic dispatch.
            | Checkcast
            | Instanceof
            | Invokeinterface
            | Invokedynamic
            // Variable length; the reader stops on these on its own.
            | Tableswitch
            | Lookupswitch
            | Wide
    )
}

/// Walk `code` and fail on the first opcode without a lowering.
pub fn check_method(code: &[u8]) -> JitResult<()> {
    walk(code, &mut OpcodeSupport)
}

// =============================================================================
// Tests
// =============================================================================
