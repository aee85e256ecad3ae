//! Integer arithmetic, shifts, and word-shaped assignments.
//!
//! Each lowering enumerates the storage shapes of its operands and picks
//! the shortest legal sequence, preferring to operate on the destination
//! in place when an operand already aliases it. Division is the one
//! protocol-heavy case: `idiv` insists on the dividend in edx:eax and
//! writes both halves, so the sequence parks the divisor on the machine
//! stack and preserves edx around the whole thing unless edx is the
//! destination itself.

use garnet_core::{JitError, JitResult, ValueType};

use crate::backend::x86::{AluOp, Ext, ExtSrc, Gpr, Insn, MemRef, Opnd, ShiftCount, ShiftOp, Width};
use crate::ir::{Bci, BinOp, Operand, UnOp, VarId};
use crate::runtime::MethodMetadata;

use super::CodeGenerator;

impl<M: MethodMetadata> CodeGenerator<'_, M> {
    pub(super) fn emit_binary(
        &mut self,
        bci: Bci,
        op: BinOp,
        ty: ValueType,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        self.check_binary_folded(op, lhs, rhs)?;
        if ty.is_float() {
            return self.emit_float_binary(bci, op, ty, dst, lhs, rhs);
        }
        match op {
            BinOp::Add => self.emit_alu(AluOp::Add, true, dst, lhs, rhs),
            BinOp::Sub => self.emit_alu(AluOp::Sub, false, dst, lhs, rhs),
            BinOp::And => self.emit_alu(AluOp::And, true, dst, lhs, rhs),
            BinOp::Or => self.emit_alu(AluOp::Or, true, dst, lhs, rhs),
            BinOp::Xor => self.emit_alu(AluOp::Xor, true, dst, lhs, rhs),
            BinOp::Mul => self.emit_mul(dst, lhs, rhs),
            BinOp::Div => self.emit_div_rem(dst, lhs, rhs, false),
            BinOp::Rem => self.emit_div_rem(dst, lhs, rhs, true),
            BinOp::Shl => self.emit_shift(ShiftOp::Shl, dst, lhs, rhs),
            BinOp::Shr => self.emit_shift(ShiftOp::Sar, dst, lhs, rhs),
            BinOp::Ushr => self.emit_shift(ShiftOp::Shr, dst, lhs, rhs),
        }
    }

    /// Two-operand ALU forms. x86 has no three-operand encoding, so the
    /// value is built up in the destination, or in eax when the
    /// destination is memory or aliases the right-hand side awkwardly.
    fn emit_alu(
        &mut self,
        alu: AluOp,
        commutative: bool,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let l = self.operand(lhs)?;
        let r = self.operand(rhs)?;

        if l.same_storage(d) {
            // dst = dst op rhs
            self.alu_into(alu, d, r);
            return Ok(());
        }
        if commutative && r.same_storage(d) {
            // dst = lhs op dst
            self.alu_into(alu, d, l);
            return Ok(());
        }
        if let Some(dr) = d.as_reg() {
            if alu == AluOp::Sub && r.same_storage(d) {
                // dst = lhs - dst: build in eax, subtraction is ordered.
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Alu {
                    op: AluOp::Sub,
                    dst: Opnd::Reg(Gpr::Eax),
                    src: r,
                });
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
                return Ok(());
            }
            self.emit(Insn::Mov { dst: d, src: l });
            self.emit(Insn::Alu {
                op: alu,
                dst: Opnd::Reg(dr),
                src: r,
            });
            return Ok(());
        }
        // Memory destination: compute in eax, store once. Reading rhs
        // after the mov is safe even when rhs aliases dst, since dst is
        // only written at the end.
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Eax),
            src: l,
        });
        self.alu_into(alu, Opnd::Reg(Gpr::Eax), r);
        self.emit(Insn::Mov {
            dst: d,
            src: Opnd::Reg(Gpr::Eax),
        });
        Ok(())
    }

    /// `dst op= src`, routing memory-to-memory through eax.
    fn alu_into(&mut self, alu: AluOp, dst: Opnd, src: Opnd) {
        if dst.as_mem().is_some() && src.as_mem().is_some() {
            self.emit(Insn::Mov {
                dst: Opnd::Reg(Gpr::Eax),
                src,
            });
            self.emit(Insn::Alu {
                op: alu,
                dst,
                src: Opnd::Reg(Gpr::Eax),
            });
        } else {
            self.emit(Insn::Alu { op: alu, dst, src });
        }
    }

    /// `imul` wants a register destination; everything else is mov
    /// plumbing around it.
    fn emit_mul(&mut self, dst: VarId, lhs: &Operand, rhs: &Operand) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let l = self.operand(lhs)?;
        let r = self.operand(rhs)?;

        if let Some(dr) = d.as_reg() {
            if l.same_storage(d) {
                self.emit(Insn::Imul { dst: dr, src: r });
            } else if r.same_storage(d) {
                self.emit(Insn::Imul { dst: dr, src: l });
            } else {
                self.emit(Insn::Mov { dst: d, src: l });
                self.emit(Insn::Imul { dst: dr, src: r });
            }
            return Ok(());
        }
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Eax),
            src: l,
        });
        self.emit(Insn::Imul {
            dst: Gpr::Eax,
            src: r,
        });
        self.emit(Insn::Mov {
            dst: d,
            src: Opnd::Reg(Gpr::Eax),
        });
        Ok(())
    }

    /// Integer division and remainder through the edx:eax protocol.
    ///
    /// The divisor is staged in a stack slot so its storage kind stops
    /// mattering, and edx is saved first because `cdq` and `idiv` both
    /// clobber it while some other variable may live there. Both source
    /// operands are read before anything is clobbered, so a divisor or
    /// dividend sitting in edx still divides correctly.
    fn emit_div_rem(
        &mut self,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
        want_rem: bool,
    ) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let l = self.operand(lhs)?;
        let r = self.operand(rhs)?;

        self.emit(Insn::Push {
            src: Opnd::Reg(Gpr::Edx),
        });
        self.emit(Insn::Push { src: r });
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Eax),
            src: l,
        });
        self.emit(Insn::Cdq);
        self.emit(Insn::Idiv {
            src: MemRef::base_disp(Gpr::Esp, 0),
        });
        self.drop_stack(4);

        let result = if want_rem { Gpr::Edx } else { Gpr::Eax };
        if d == Opnd::Reg(Gpr::Edx) {
            // The destination is the register we saved; its old value is
            // dead, so drop the saved copy instead of restoring it.
            if !want_rem {
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
            self.drop_stack(4);
        } else {
            if !d.same_storage(Opnd::Reg(result)) {
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(result),
                });
            }
            self.emit(Insn::Pop {
                dst: Opnd::Reg(Gpr::Edx),
            });
        }
        Ok(())
    }

    /// Shifts take their variable count in cl, so ecx gets commandeered
    /// and restored when the count is anywhere else.
    fn emit_shift(
        &mut self,
        shift: ShiftOp,
        dst: VarId,
        lhs: &Operand,
        rhs: &Operand,
    ) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let l = self.operand(lhs)?;
        let r = self.operand(rhs)?;

        if let Opnd::Imm(count) = r {
            let count = ShiftCount::Imm((count & 31) as u8);
            if l.same_storage(d) {
                self.emit(Insn::Shift {
                    op: shift,
                    dst: d,
                    count,
                });
            } else if d.as_reg().is_some() {
                self.emit(Insn::Mov { dst: d, src: l });
                self.emit(Insn::Shift {
                    op: shift,
                    dst: d,
                    count,
                });
            } else {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Shift {
                    op: shift,
                    dst: Opnd::Reg(Gpr::Eax),
                    count,
                });
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
            return Ok(());
        }

        if r == Opnd::Reg(Gpr::Ecx) {
            // Count already where the hardware wants it.
            if d == Opnd::Reg(Gpr::Ecx) {
                // Shifting into the count register: build in eax while cl
                // still holds the count, then move over.
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Shift {
                    op: shift,
                    dst: Opnd::Reg(Gpr::Eax),
                    count: ShiftCount::Cl,
                });
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
            } else if d.as_reg().is_some() {
                if !l.same_storage(d) {
                    self.emit(Insn::Mov { dst: d, src: l });
                }
                self.emit(Insn::Shift {
                    op: shift,
                    dst: d,
                    count: ShiftCount::Cl,
                });
            } else {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Shift {
                    op: shift,
                    dst: Opnd::Reg(Gpr::Eax),
                    count: ShiftCount::Cl,
                });
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
            return Ok(());
        }

        // Count lives elsewhere: save ecx, load the count, shift, restore.
        // If the value to shift was itself in ecx, the saved copy on the
        // stack is the live one.
        self.emit(Insn::Push {
            src: Opnd::Reg(Gpr::Ecx),
        });
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Ecx),
            src: r,
        });
        let work = match d.as_reg() {
            Some(r) if r != Gpr::Ecx => r,
            _ => Gpr::Eax,
        };
        let shiftee = if l == Opnd::Reg(Gpr::Ecx) {
            Opnd::Mem(MemRef::base_disp(Gpr::Esp, 0))
        } else {
            l
        };
        if !shiftee.same_storage(Opnd::Reg(work)) {
            self.emit(Insn::Mov {
                dst: Opnd::Reg(work),
                src: shiftee,
            });
        }
        self.emit(Insn::Shift {
            op: shift,
            dst: Opnd::Reg(work),
            count: ShiftCount::Cl,
        });
        if d == Opnd::Reg(Gpr::Ecx) {
            // Destination is the saved register; discard the stale copy.
            self.drop_stack(4);
            self.emit(Insn::Mov {
                dst: d,
                src: Opnd::Reg(work),
            });
        } else {
            if work == Gpr::Eax {
                self.emit(Insn::Mov {
                    dst: d,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
            self.emit(Insn::Pop {
                dst: Opnd::Reg(Gpr::Ecx),
            });
        }
        Ok(())
    }

    pub(super) fn emit_unary(
        &mut self,
        op: UnOp,
        dst: VarId,
        src: &Operand,
    ) -> JitResult<()> {
        self.check_unary_folded(op, src)?;
        if op.uses_fpu() {
            return self.emit_float_unary(op, dst, src);
        }
        match op {
            UnOp::NegInt => self.emit_neg_int(dst, src),
            UnOp::I2B => self.emit_truncate(Ext::Sign, Width::Byte, dst, src),
            UnOp::I2C => self.emit_truncate(Ext::Zero, Width::Word, dst, src),
            UnOp::I2S => self.emit_truncate(Ext::Sign, Width::Word, dst, src),
            _ => Err(JitError::internal(format!(
                "{} fell through non-fpu unary dispatch",
                op.mnemonic()
            ))),
        }
    }

    fn emit_neg_int(&mut self, dst: VarId, src: &Operand) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let s = self.operand(src)?;
        if s.same_storage(d) {
            self.emit(Insn::Neg { dst: d });
        } else if d.as_reg().is_some() {
            self.emit(Insn::Mov { dst: d, src: s });
            self.emit(Insn::Neg { dst: d });
        } else {
            self.emit(Insn::Mov {
                dst: Opnd::Reg(Gpr::Eax),
                src: s,
            });
            self.emit(Insn::Neg {
                dst: Opnd::Reg(Gpr::Eax),
            });
            self.emit(Insn::Mov {
                dst: d,
                src: Opnd::Reg(Gpr::Eax),
            });
        }
        Ok(())
    }

    /// The narrowing conversions: chop to the low byte or word of eax and
    /// widen back with the matching extension.
    fn emit_truncate(
        &mut self,
        ext: Ext,
        width: Width,
        dst: VarId,
        src: &Operand,
    ) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        let s = self.operand(src)?;
        self.emit(Insn::Mov {
            dst: Opnd::Reg(Gpr::Eax),
            src: s,
        });
        self.emit(Insn::MovExt {
            ext,
            width,
            dst: Gpr::Eax,
            src: ExtSrc::Reg(Gpr::Eax),
        });
        self.emit(Insn::Mov {
            dst: d,
            src: Opnd::Reg(Gpr::Eax),
        });
        Ok(())
    }

    pub(super) fn emit_assign(
        &mut self,
        ty: ValueType,
        dst: VarId,
        src: &Operand,
    ) -> JitResult<()> {
        match ty {
            ValueType::Int | ValueType::Reference | ValueType::Float => {
                // A float value in a frame slot moves as a raw word.
                let d = self.dst_opnd(dst)?;
                let s = self.operand(src)?;
                self.move_word(d, s);
                Ok(())
            }
            ValueType::Double => self.emit_assign_double(dst, src),
            ValueType::Long => Err(JitError::internal("long value reached code generation")),
        }
    }

    fn emit_assign_double(&mut self, dst: VarId, src: &Operand) -> JitResult<()> {
        let d = self.float_slot(dst)?;
        match src {
            Operand::Var(v) => {
                let s = self.float_slot(*v)?;
                if s == d {
                    return Ok(());
                }
                for half in [0, 4] {
                    self.emit(Insn::Mov {
                        dst: Opnd::Reg(Gpr::Eax),
                        src: Opnd::Mem(s.offset(half)),
                    });
                    self.emit(Insn::Mov {
                        dst: Opnd::Mem(d.offset(half)),
                        src: Opnd::Reg(Gpr::Eax),
                    });
                }
                Ok(())
            }
            Operand::Const(c) => {
                let bits = c
                    .double_bits()
                    .ok_or_else(|| JitError::internal("double assign from non-double constant"))?;
                self.emit(Insn::Mov {
                    dst: Opnd::Mem(d),
                    src: Opnd::Imm(bits as u32 as i32),
                });
                self.emit(Insn::Mov {
                    dst: Opnd::Mem(d.offset(4)),
                    src: Opnd::Imm((bits >> 32) as i32),
                });
                Ok(())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
