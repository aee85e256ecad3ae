//! 32-bit x86-style target: registers, abstract instructions, the
//! recording emitter, and the instruction-level simulator used by tests.

pub mod emitter;
pub mod insn;
pub mod registers;
pub mod sim;

pub use emitter::{CodeBuffer, CodeSink, Entry};
pub use insn::{
    AluOp, CallTarget, Cond, Ext, ExtSrc, FpOp, FpWidth, Insn, MemRef, Opnd, Scale, ShiftCount,
    ShiftOp, Width,
};
pub use sim::{Machine, RunOutcome};
pub use registers::{Gpr, GprSet};
