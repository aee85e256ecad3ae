//! x87 lowerings: float and double arithmetic, three-way compares, and
//! the numeric conversions.
//!
//! Float values never occupy general registers; they live in frame slots
//! and visit the x87 stack one operation at a time. Every sequence here
//! loads its operands, computes, and stores the result back, leaving the
//! x87 stack empty again, so no FPU state flows between quads.
//!
//! The two compare forms differ only in operand push order: `fucompp`
//! reports "unordered" the same way it reports "below", so whichever
//! operand sits in st(0) decides which way a NaN resolves. Pushing the
//! left operand last biases NaN toward -1, pushing it first biases
//! toward +1.

use garnet_core::{JitError, JitResult, ValueType};

use crate::backend::x86::{
    AluOp, CodeSink, Cond, Ext, ExtSrc, FpOp, FpWidth, Gpr, Insn, MemRef, Opnd, Width,
};
use crate::ir::{AuxKind, Bci, BinOp, CmpBias, Operand, UnOp, VarId};
use crate::runtime::MethodMetadata;

use super::CodeGenerator;

impl<M: MethodMetadata> CodeGenerator<'_, M> {
    fn fp_width(ty: ValueType) -> FpWidth {
        if ty == ValueType::Double {
            FpWidth::Double
        } else {
            FpWidth::Single
        }
    }

    /// Push a float or double operand onto the x87 stack. Constants are
    /// staged through the machine stack as raw bits.
    pub(super) fn fpu_load(&mut self, ty: ValueType, op: &Operand) -> JitResult<()> {
        let width = Self::fp_width(ty);
        match op {
            Operand::Var(v) => {
                let slot = self.float_slot(*v)?;
                self.emit(Insn::Fld { width, src: slot });
            }
            Operand::Const(c) => match width {
                FpWidth::Single => {
                    let bits = c.word_bits().ok_or_else(|| {
                        JitError::internal("single-word load of a double constant")
                    })?;
                    self.emit(Insn::Push {
                        src: Opnd::Imm(bits),
                    });
                    self.emit(Insn::Fld {
                        width,
                        src: MemRef::base_disp(Gpr::Esp, 0),
                    });
                    self.drop_stack(4);
                }
                FpWidth::Double => {
                    let bits = c.double_bits().ok_or_else(|| {
                        JitError::internal("double load of a single-word constant")
                    })?;
                    self.emit(Insn::Push {
                        src: Opnd::Imm((bits >> 32) as i32),
                    });
                    self.emit(Insn::Push {
                        src: Opnd::Imm(bits as u32 as i32),
                    });
                    self.emit(Insn::Fld {
                        width,
                        src: MemRef::base_disp(Gpr::Esp, 0),
                    });
                    self.drop_stack(8);
                }
            },
        }
        Ok(())
    }

    /// Pop st(0) into the destination's frame slot.
    fn fpu_store(&mut self, ty: ValueType, dst: VarId) -> JitResult<()> {
        let slot = self.float_slot(dst)?;
        self.emit(Insn::Fstp {
            width: Self::fp_width(ty),
            dst: slot,
        });
        Ok(())
    }

    pub(super) fn emit_float_binary(
        &mut self,
        bci: Bci,
        op: BinOp,
        ty: ValueType,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        let fp = match op {
            BinOp::Add => FpOp::Add,
            BinOp::Sub => FpOp::Sub,
            BinOp::Mul => FpOp::Mul,
            BinOp::Div => FpOp::Div,
            BinOp::Rem => return self.emit_float_rem(bci, ty, dst, lhs, rhs),
            _ => {
                return Err(JitError::internal(format!(
                    "{} on {} operands",
                    op.mnemonic(),
                    ty.name()
                )))
            }
        };
        self.fpu_load(ty, lhs)?;
        self.fpu_load(ty, rhs)?;
        self.emit(Insn::FpArith { op: fp });
        self.fpu_store(ty, dst)
    }

    /// `fprem` computes a partial remainder of st(0) by st(1) and flags
    /// C2 while reduction is incomplete, so the sequence loops on it. The
    /// result inherits the dividend's sign.
    fn emit_float_rem(
        &mut self,
        bci: Bci,
        ty: ValueType,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        self.fpu_load(ty, rhs)?;
        self.fpu_load(ty, lhs)?;
        let again = self.aux_label(bci, AuxKind::FremLoop);
        self.buf.bind(again)?;
        self.emit(Insn::Fprem);
        self.emit(Insn::FnstswAx);
        self.emit(Insn::Sahf);
        self.emit(Insn::Jcc {
            cond: Cond::P,
            target: again,
        });
        self.fpu_store(ty, dst)?;
        // The divisor is still below the popped remainder.
        self.emit(Insn::FstpSt0);
        Ok(())
    }

    /// Three-way compare with an explicit NaN bias. The destination is
    /// zeroed up front, then bumped to +1 or -1 on the strict orderings.
    pub(super) fn emit_fcmp(
        &mut self,
        bci: Bci,
        bias: CmpBias,
        ty: ValueType,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        self.emit(Insn::Mov {
            dst: d,
            src: Opnd::Imm(0),
        });
        match bias {
            CmpBias::Less => {
                self.fpu_load(ty, rhs)?;
                self.fpu_load(ty, lhs)?;
            }
            CmpBias::Greater => {
                self.fpu_load(ty, lhs)?;
                self.fpu_load(ty, rhs)?;
            }
        }
        self.emit(Insn::Fucompp);
        self.emit(Insn::FnstswAx);
        self.emit(Insn::Sahf);

        let inc = self.aux_label(bci, AuxKind::FcmpInc);
        let dec = self.aux_label(bci, AuxKind::FcmpDec);
        let done = self.aux_label(bci, AuxKind::FcmpDone);
        // `ja` fires when st(0) is strictly greater; `jb` also fires on
        // unordered, which is exactly where the bias comes from.
        let (above, below) = match bias {
            CmpBias::Less => (inc, dec),
            CmpBias::Greater => (dec, inc),
        };
        self.emit(Insn::Jcc {
            cond: Cond::A,
            target: above,
        });
        self.emit(Insn::Jcc {
            cond: Cond::B,
            target: below,
        });
        self.emit(Insn::Jmp { target: done });
        self.buf.bind(inc)?;
        self.emit(Insn::Inc { dst: d });
        self.emit(Insn::Jmp { target: done });
        self.buf.bind(dec)?;
        self.emit(Insn::Dec { dst: d });
        self.buf.bind(done)?;
        Ok(())
    }

    pub(super) fn emit_float_unary(
        &mut self,
        op: UnOp,
        dst: VarId,
        src: &Operand,
    ) -> JitResult<()> {
        match op {
            UnOp::NegFloat => {
                self.fpu_load(ValueType::Float, src)?;
                self.emit(Insn::Fchs);
                self.fpu_store(ValueType::Float, dst)
            }
            UnOp::NegDouble => {
                self.fpu_load(ValueType::Double, src)?;
                self.emit(Insn::Fchs);
                self.fpu_store(ValueType::Double, dst)
            }
            UnOp::I2F => self.emit_int_to_fp(ValueType::Float, dst, src),
            UnOp::I2D => self.emit_int_to_fp(ValueType::Double, dst, src),
            UnOp::F2D => {
                self.fpu_load(ValueType::Float, src)?;
                self.fpu_store(ValueType::Double, dst)
            }
            UnOp::D2F => {
                self.fpu_load(ValueType::Double, src)?;
                self.fpu_store(ValueType::Float, dst)
            }
            UnOp::F2I => self.emit_fp_to_int(ValueType::Float, dst, src),
            UnOp::D2I => self.emit_fp_to_int(ValueType::Double, dst, src),
            UnOp::NegInt | UnOp::I2B | UnOp::I2C | UnOp::I2S => Err(JitError::internal(format!(
                "{} reached the fpu path",
                op.mnemonic()
            ))),
        }
    }

    /// `fild` only reads memory, so register and immediate sources take a
    /// trip through the machine stack.
    fn emit_int_to_fp(&mut self, to: ValueType, dst: VarId, src: &Operand) -> JitResult<()> {
        let s = self.operand(src)?;
        match s {
            Opnd::Mem(m) => self.emit(Insn::Fild { src: m }),
            _ => {
                self.emit(Insn::Push { src: s });
                self.emit(Insn::Fild {
                    src: MemRef::base_disp(Gpr::Esp, 0),
                });
                self.drop_stack(4);
            }
        }
        self.fpu_store(to, dst)
    }

    /// Truncating conversion. `fistp` obeys the rounding-control field of
    /// the control word, which defaults to round-nearest, so the sequence
    /// swaps in truncation for one store and puts the old word back.
    /// Scratch layout: saved control word at [esp], the modified word and
    /// then the stored integer at [esp+4].
    fn emit_fp_to_int(&mut self, from: ValueType, dst: VarId, src: &Operand) -> JitResult<()> {
        self.fpu_load(from, src)?;
        self.emit(Insn::Alu {
            op: AluOp::Sub,
            dst: Opnd::Reg(Gpr::Esp),
            src: Opnd::Imm(8),
        });
        let saved = MemRef::base_disp(Gpr::Esp, 0);
        let work = MemRef::base_disp(Gpr::Esp, 4);
        self.emit(Insn::Fnstcw { dst: saved });
        self.emit(Insn::MovExt {
            ext: Ext::Zero,
            width: Width::Word,
            dst: Gpr::Eax,
            src: ExtSrc::Mem(saved),
        });
        self.emit(Insn::Alu {
            op: AluOp::Or,
            dst: Opnd::Reg(Gpr::Eax),
            src: Opnd::Imm(0x0C00),
        });
        self.emit(Insn::Store {
            width: Width::Word,
            dst: work,
            src: Gpr::Eax,
        });
        self.emit(Insn::Fldcw { src: work });
        self.emit(Insn::Fistp { dst: work });
        self.emit(Insn::Fldcw { src: saved });
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Eax),
            src: Opnd::Mem(work),
        });
        self.drop_stack(8);
        let d = self.dst_opnd(dst)?;
        self.emit(Insn::Mov {
            dst: d,
            src: Opnd::Reg(Gpr::Eax),
        });
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
