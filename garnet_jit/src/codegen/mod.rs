//! Instruction selection from finished quads.
//!
//! One pass over the blocks in layout order. Every block start binds the
//! label for its bytecode index, so a branch whose target is already
//! bound is a backward branch; those get a yieldpoint call ahead of the
//! jump and nothing else does. Lowerings are written against operand
//! shape, register, frame slot, or immediate, with eax reserved as the
//! scratch register that keeps memory-to-memory shapes legal.
//!
//! By the time quads reach this stage every live variable has a storage
//! [`Location`] and foldable all-constant operations are gone; either
//! showing up here is an internal compiler error, not a decline.
//!
//! Array bounds failures jump to out-of-line blocks collected during
//! the main walk and emitted after the epilogue, keeping the hot path
//! straight.

pub mod arith;
pub mod branch;
pub mod calls;
pub mod float;
pub mod memory;

use garnet_core::{JitError, JitResult};

use crate::backend::x86::{
    AluOp, CallTarget, CodeBuffer, CodeSink, Gpr, Insn, MemRef, Opnd,
};
use crate::frame::FrameLayout;
use crate::ir::{
    AuxKind, Bci, LabelId, LabelKey, LabelTable, Location, MethodIr, Operand, Quad, QuadKind,
    VarId,
};
use crate::opt::fold::{eval_int_binary, eval_int_unary};
use crate::runtime::{MethodMetadata, RuntimeEntry, TargetConfig};

#[derive(Debug, Default, Clone, Copy)]
pub struct CodegenStats {
    pub quads: usize,
    pub insns: usize,
    pub yieldpoints: usize,
    pub bounds_checks: usize,
    pub runtime_calls: usize,
}

/// Deferred failure block for one array access. The operands are the
/// access's original storage shapes, still valid on the jump edge.
struct BoundsFailure {
    label: LabelId,
    array: Opnd,
    index: Opnd,
}

/// Single-use code generator for one method.
pub struct CodeGenerator<'a, M: MethodMetadata> {
    ir: &'a MethodIr,
    meta: &'a M,
    target: &'a TargetConfig,
    frame: &'a FrameLayout,
    labels: LabelTable,
    buf: CodeBuffer,
    epilogue: LabelId,
    bounds_failures: Vec<BoundsFailure>,
    stats: CodegenStats,
}

impl<'a, M: MethodMetadata> CodeGenerator<'a, M> {
    #[must_use]
    pub fn new(
        ir: &'a MethodIr,
        meta: &'a M,
        target: &'a TargetConfig,
        frame: &'a FrameLayout,
    ) -> Self {
        let mut labels = LabelTable::new();
        let epilogue = labels.intern(LabelKey::Epilogue);
        Self {
            ir,
            meta,
            target,
            frame,
            labels,
            buf: CodeBuffer::new(),
            epilogue,
            bounds_failures: Vec::new(),
            stats: CodegenStats::default(),
        }
    }

    /// Emit the whole method: prologue, blocks in layout order, the
    /// shared epilogue, then the out-of-line failure blocks.
    pub fn run(mut self) -> JitResult<(CodeBuffer, CodegenStats)> {
        self.frame.emit_prologue(self.ir, &mut self.buf);
        let ir = self.ir;
        for b in ir.block_ids() {
            let label = self.labels.intern(LabelKey::Bci(ir.block(b).start_bci));
            self.buf.bind(label)?;
            for quad in ir.block(b).live_quads() {
                self.emit_quad(quad)?;
            }
        }
        let epilogue = self.epilogue;
        self.buf.bind(epilogue)?;
        self.frame.emit_epilogue(&mut self.buf);
        self.emit_bounds_failures()?;
        self.buf.finish()?;
        Ok((self.buf, self.stats))
    }

    fn emit_quad(&mut self, quad: &Quad) -> JitResult<()> {
        self.stats.quads += 1;
        match &quad.kind {
            QuadKind::Binary {
                op,
                ty,
                dst,
                lhs,
                rhs,
            } => self.emit_binary(quad.bci, *op, *ty, *dst, lhs, rhs),
            QuadKind::Unary { op, dst, src } => self.emit_unary(*op, *dst, src),
            QuadKind::Assign { ty, dst, src } => self.emit_assign(*ty, *dst, src),
            QuadKind::Goto { target } => self.emit_goto(quad, *target),
            QuadKind::Branch {
                cond,
                lhs,
                rhs,
                target,
            } => self.emit_branch(quad, *cond, lhs, rhs, *target),
            QuadKind::FCmp {
                bias,
                ty,
                dst,
                lhs,
                rhs,
            } => self.emit_fcmp(quad.bci, *bias, *ty, *dst, lhs, rhs),
            QuadKind::ArrayLoad {
                elem,
                dst,
                array,
                index,
            } => self.emit_array_load(quad.bci, *elem, *dst, array, index),
            QuadKind::ArrayStore {
                elem,
                array,
                index,
                value,
            } => self.emit_array_store(quad.bci, *elem, array, index, value),
            QuadKind::ArrayLength { dst, array } => self.emit_array_length(*dst, array),
            QuadKind::GetField { field, dst, object } => self.emit_get_field(*field, *dst, object),
            QuadKind::PutField {
                field,
                object,
                value,
            } => self.emit_put_field(*field, object, value),
            QuadKind::GetStatic { field, dst } => self.emit_get_static(*field, *dst),
            QuadKind::PutStatic { field, value } => self.emit_put_static(*field, value),
            QuadKind::New { class, dst } => self.emit_new(*class, *dst),
            QuadKind::NewArray { elem, dst, length } => self.emit_new_array(*elem, *dst, length),
            QuadKind::NewObjectArray { class, dst, length } => {
                self.emit_new_object_array(*class, *dst, length)
            }
            QuadKind::NewMultiArray { class, dst, dims } => {
                self.emit_new_multi_array(*class, *dst, dims)
            }
            QuadKind::MonitorEnter { object } => self.emit_monitor(RuntimeEntry::MonitorEnter, object),
            QuadKind::MonitorExit { object } => self.emit_monitor(RuntimeEntry::MonitorExit, object),
            QuadKind::Call {
                kind,
                method,
                dst,
                args,
            } => self.emit_call(*kind, *method, *dst, args),
            QuadKind::Return { value } => self.emit_return(value.as_ref()),
            QuadKind::Throw { exception } => self.emit_throw(exception),
            QuadKind::Phi { .. } => Err(JitError::internal(
                "phi survived into code generation",
            )),
        }
    }

    // =========================================================================
    // Operand plumbing
    // =========================================================================

    fn emit(&mut self, insn: Insn) {
        self.stats.insns += 1;
        self.buf.emit(insn);
    }

    fn location(&self, v: VarId) -> JitResult<Location> {
        self.ir
            .pool
            .location(v)
            .ok_or_else(|| JitError::internal(format!("{v} has no storage at code generation")))
    }

    /// Resolve an operand to its machine shape. Doubles have no single-
    /// word shape and are handled by their own lowerings.
    fn operand(&self, op: &Operand) -> JitResult<Opnd> {
        match op {
            Operand::Var(v) => Ok(match self.location(*v)? {
                Location::Register(r) => Opnd::Reg(r),
                Location::Stack(d) => Opnd::Mem(MemRef::base_disp(Gpr::Ebp, d)),
            }),
            Operand::Const(c) => c
                .word_bits()
                .map(Opnd::Imm)
                .ok_or_else(|| JitError::internal("double constant outside the fpu path")),
        }
    }

    fn dst_opnd(&self, v: VarId) -> JitResult<Opnd> {
        self.operand(&Operand::Var(v))
    }

    /// The frame slot of a float or double variable. Floats never get a
    /// register, so anything else is an internal error.
    fn float_slot(&self, v: VarId) -> JitResult<MemRef> {
        match self.location(v)? {
            Location::Stack(d) => Ok(MemRef::base_disp(Gpr::Ebp, d)),
            Location::Register(_) => Err(JitError::internal(format!(
                "float {v} assigned to a general register"
            ))),
        }
    }

    /// Have the value in a register, borrowing `scratch` when it is not
    /// already in one.
    fn into_reg(&mut self, src: Opnd, scratch: Gpr) -> Gpr {
        match src {
            Opnd::Reg(r) => r,
            _ => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(scratch),
                    src,
                });
                scratch
            }
        }
    }

    /// General 32-bit move: elides self-moves and routes memory to
    /// memory through eax.
    fn move_word(&mut self, dst: Opnd, src: Opnd) {
        if src.same_storage(dst) {
            return;
        }
        if dst.as_mem().is_some() && src.as_mem().is_some() {
            self.emit(Insn::Mov {
                dst: Opnd::Reg(Gpr::Eax),
                src,
            });
            self.emit(Insn::Mov {
                dst,
                src: Opnd::Reg(Gpr::Eax),
            });
        } else {
            self.emit(Insn::Mov { dst, src });
        }
    }

    fn block_label(&mut self, bci: Bci) -> LabelId {
        self.labels.intern(LabelKey::Bci(bci))
    }

    fn aux_label(&mut self, bci: Bci, kind: AuxKind) -> LabelId {
        self.labels.intern(LabelKey::Aux { bci, kind })
    }

    // =========================================================================
    // Runtime transfer
    // =========================================================================

    fn yieldpoint(&mut self) {
        self.emit(Insn::Call {
            target: CallTarget::Runtime(RuntimeEntry::YieldPoint),
        });
        self.stats.yieldpoints += 1;
    }

    /// Discard `bytes` of machine stack.
    fn drop_stack(&mut self, bytes: i32) {
        self.emit(Insn::Alu {
            op: AluOp::Add,
            dst: Opnd::Reg(Gpr::Esp),
            src: Opnd::Imm(bytes),
        });
    }

    /// Call a runtime entry with its arguments already pushed. Runtime
    /// entries use the caller-pops convention, so the stack fixup is
    /// emitted here for entries that come back.
    fn runtime_call(&mut self, entry: RuntimeEntry) {
        self.emit(Insn::Call {
            target: CallTarget::Runtime(entry),
        });
        self.stats.runtime_calls += 1;
        let bytes = 4 * i32::from(entry.arg_words());
        if entry.returns_normally() && bytes > 0 {
            self.drop_stack(bytes);
        }
    }

    // =========================================================================
    // Invariant checks
    // =========================================================================

    /// A binary whose operands are all constants must have been folded
    /// upstream, except the division forms folding refuses.
    fn check_binary_folded(
        &self,
        op: crate::ir::BinOp,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        if let (Operand::Const(a), Operand::Const(b)) = (lhs, rhs) {
            if let (Some(a), Some(b)) = (a.as_int(), b.as_int()) {
                if eval_int_binary(op, a, b).is_some() {
                    return Err(JitError::internal("constants should have been folded"));
                }
            }
        }
        Ok(())
    }

    fn check_unary_folded(&self, op: crate::ir::UnOp, src: &Operand) -> JitResult<()> {
        if let Operand::Const(c) = src {
            if let Some(a) = c.as_int() {
                if eval_int_unary(op, a).is_some() {
                    return Err(JitError::internal("constants should have been folded"));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Out-of-line blocks
    // =========================================================================

    /// Register a bounds-failure continuation and hand back its label.
    fn defer_bounds_failure(&mut self, bci: Bci, array: Opnd, index: Opnd) -> LabelId {
        let label = self.aux_label(bci, AuxKind::BoundsFail);
        self.bounds_failures.push(BoundsFailure {
            label,
            array,
            index,
        });
        self.stats.bounds_checks += 1;
        label
    }

    /// The failure blocks push the reference and index the check saw and
    /// leave through the runtime, which does not return.
    fn emit_bounds_failures(&mut self) -> JitResult<()> {
        let failures = std::mem::take(&mut self.bounds_failures);
        for failure in failures {
            self.buf.bind(failure.label)?;
            self.emit(Insn::Push { src: failure.index });
            self.emit(Insn::Push { src: failure.array });
            self.runtime_call(RuntimeEntry::OutOfBounds);
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
