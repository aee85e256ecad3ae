//! Stack-frame shape and prologue/epilogue emission.
//!
//! Frames follow the classic ebp chain:
//!
//! ```text
//!   [ebp + 8 + 4w]  incoming argument word w
//!   [ebp + 4]       return address
//!   [ebp]           caller's ebp
//!   [ebp - 4 ..]    spill words, sized by the allocator
//!   below spills    saved callee registers, then working stack
//! ```
//!
//! Compiled methods pop their own arguments on return. The prologue
//! also homes register-assigned parameters from their argument slots,
//! after the callee saves so the incoming values are not clobbered.

use crate::backend::x86::{AluOp, CodeSink, Gpr, GprSet, Insn, MemRef, Opnd};
use crate::ir::{Location, MethodIr};
use crate::regalloc::{Allocation, ARG_BASE_DISP};

/// Frame measurements for one compiled method.
#[derive(Debug, Clone, Copy)]
pub struct FrameLayout {
    spill_bytes: i32,
    saved: GprSet,
    arg_bytes: u16,
}

impl FrameLayout {
    #[must_use]
    pub fn new(alloc: &Allocation, arg_words: u16) -> Self {
        Self {
            spill_bytes: 4 * alloc.spill_words as i32,
            saved: alloc.used_callee_saved,
            arg_bytes: 4 * arg_words,
        }
    }

    /// ebp-relative displacement of incoming argument word `w`.
    #[inline]
    #[must_use]
    pub const fn arg_disp(word: u16) -> i32 {
        ARG_BASE_DISP + 4 * word as i32
    }

    #[inline]
    #[must_use]
    pub const fn spill_bytes(&self) -> i32 {
        self.spill_bytes
    }

    #[inline]
    #[must_use]
    pub const fn saved_registers(&self) -> GprSet {
        self.saved
    }

    /// Bytes of incoming arguments the `ret` pops.
    #[inline]
    #[must_use]
    pub const fn arg_bytes(&self) -> u16 {
        self.arg_bytes
    }

    /// Establish the frame and home register-assigned parameters.
    pub fn emit_prologue(&self, ir: &MethodIr, sink: &mut impl CodeSink) {
        sink.emit(Insn::Push {
            src: Opnd::Reg(Gpr::Ebp),
        });
        sink.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Ebp),
            src: Opnd::Reg(Gpr::Esp),
        });
        if self.spill_bytes > 0 {
            sink.emit(Insn::Alu {
                op: AluOp::Sub,
                dst: Opnd::Reg(Gpr::Esp),
                src: Opnd::Imm(self.spill_bytes),
            });
        }
        for reg in self.saved.iter() {
            sink.emit(Insn::Push {
                src: Opnd::Reg(reg),
            });
        }
        for (_, var) in ir.pool.iter() {
            if var.retired {
                continue;
            }
            let (Some(word), Some(Location::Register(reg))) = (var.param_index, var.location)
            else {
                continue;
            };
            sink.emit(Insn::Mov {
                dst: Opnd::Reg(reg),
                src: Opnd::Mem(MemRef::base_disp(Gpr::Ebp, Self::arg_disp(word))),
            });
        }
    }

    /// Tear the frame down and return, popping the argument words.
    pub fn emit_epilogue(&self, sink: &mut impl CodeSink) {
        let saved: Vec<Gpr> = self.saved.iter().collect();
        for &reg in saved.iter().rev() {
            sink.emit(Insn::Pop {
                dst: Opnd::Reg(reg),
            });
        }
        sink.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Esp),
            src: Opnd::Reg(Gpr::Ebp),
        });
        sink.emit(Insn::Pop {
            dst: Opnd::Reg(Gpr::Ebp),
        });
        sink.emit(Insn::Ret {
            pop_bytes: self.arg_bytes,
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
