//! Control transfer: gotos, conditional branches, and returns.
//!
//! A branch whose target bytecode index does not lie ahead of it is a
//! back edge, and every back edge polls the runtime for a pending thread
//! switch before jumping. The poll is a call and calls clobber flags, so
//! it goes ahead of the compare. Returns never poll; a method that only
//! ever returns still reaches yieldpoints through its callers and loops.
//!
//! Fallthrough is implicit: blocks are emitted in layout order, so a
//! conditional branch only ever encodes its taken edge.

use garnet_core::{JitError, JitResult, ValueType};

use crate::backend::x86::{AluOp, Cond, Gpr, Insn, Opnd};
use crate::ir::{Bci, BranchCond, Operand, Quad};
use crate::runtime::MethodMetadata;

use super::CodeGenerator;

const fn cond_code(cond: BranchCond) -> Cond {
    match cond {
        BranchCond::Eq => Cond::E,
        BranchCond::Ne => Cond::Ne,
        BranchCond::Lt => Cond::L,
        BranchCond::Ge => Cond::Ge,
        BranchCond::Gt => Cond::G,
        BranchCond::Le => Cond::Le,
    }
}

impl<M: MethodMetadata> CodeGenerator<'_, M> {
    pub(super) fn emit_goto(&mut self, quad: &Quad, target: Bci) -> JitResult<()> {
        if quad.is_backward_branch() {
            self.yieldpoint();
        }
        let label = self.block_label(target);
        self.emit(Insn::Jmp { target: label });
        Ok(())
    }

    pub(super) fn emit_branch(
        &mut self,
        quad: &Quad,
        cond: BranchCond,
        lhs: &Operand,
        rhs: &Operand,
        target: Bci,
    ) -> JitResult<()> {
        if quad.is_backward_branch() {
            self.yieldpoint();
        }
        let l = self.operand(lhs)?;
        let r = self.operand(rhs)?;
        let cond = self.emit_compare(cond, l, r);
        let label = self.block_label(target);
        self.emit(Insn::Jcc {
            cond: cond_code(cond),
            target: label,
        });
        Ok(())
    }

    /// Set flags for `l ? r`, returning the condition to branch on. An
    /// immediate left operand forces the compare the other way around,
    /// which mirrors the condition.
    fn emit_compare(&mut self, cond: BranchCond, l: Opnd, r: Opnd) -> BranchCond {
        match (l, r) {
            (Opnd::Imm(_), Opnd::Imm(_)) => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: Opnd::Reg(Gpr::Eax),
                    src: r,
                });
                cond
            }
            (Opnd::Imm(_), _) => {
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: r,
                    src: l,
                });
                cond.swapped()
            }
            _ if l.as_mem().is_some() && r.as_mem().is_some() => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: l,
                });
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: Opnd::Reg(Gpr::Eax),
                    src: r,
                });
                cond
            }
            _ => {
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: l,
                    src: r,
                });
                cond
            }
        }
    }

    /// Load the return value into its convention register (eax for word
    /// values, st(0) for floats) and leave through the shared epilogue.
    pub(super) fn emit_return(&mut self, value: Option<&(ValueType, Operand)>) -> JitResult<()> {
        if let Some((ty, v)) = value {
            match ty {
                ValueType::Int | ValueType::Reference => {
                    let s = self.operand(v)?;
                    self.emit(Insn::Mov {
                        dst: Opnd::Reg(Gpr::Eax),
                        src: s,
                    });
                }
                ValueType::Float | ValueType::Double => self.fpu_load(*ty, v)?,
                ValueType::Long => {
                    return Err(JitError::internal("long return reached code generation"))
                }
            }
        }
        let epilogue = self.epilogue;
        self.emit(Insn::Jmp { target: epilogue });
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::tests::NullMeta;
    use super::*;
    use crate::backend::x86::{CodeBuffer, GprSet, Machine, RunOutcome};
    use crate::frame::FrameLayout;
    use crate::ir::{BinOp, Location, MethodIr, QuadKind, VarId, VarOrigin};
    use crate::regalloc::{Allocation, AllocatorStats};
    use crate::runtime::TargetConfig;

    fn compile(ir: &MethodIr) -> (CodeBuffer, super::super::CodegenStats) {
        let alloc = Allocation {
            used_callee_saved: GprSet::EMPTY,
            spill_words: 0,
            stats: AllocatorStats::default(),
        };
        let frame = FrameLayout::new(&alloc, 0);
        let target = TargetConfig::default();
        super::super::CodeGenerator::new(ir, &NullMeta, &target, &frame)
            .run()
            .unwrap()
    }

    fn reg_var(ir: &mut MethodIr, r: Gpr) -> VarId {
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        ir.pool.set_location(v, Location::Register(r));
        v
    }

    #[test]
    fn test_forward_branch_compare_sequence() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(5));
        let a = reg_var(&mut ir, Gpr::Ecx);
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Branch {
                cond: BranchCond::Lt,
                lhs: Operand::Var(a),
                rhs: Operand::int(10),
                target: Bci::new(5),
            },
        );
        ir.push(b1, Bci::new(5), QuadKind::Return { value: None });

        let (buf, stats) = compile(&ir);
        let listing: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        assert!(listing.contains(&"cmp ecx, 10".to_string()));
        assert!(listing.iter().any(|s| s.starts_with("jl ")));
        assert_eq!(stats.yieldpoints, 0);
    }

    #[test]
    fn test_immediate_lhs_swaps_the_condition() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(5));
        let a = reg_var(&mut ir, Gpr::Ecx);
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Branch {
                cond: BranchCond::Lt,
                lhs: Operand::int(10),
                rhs: Operand::Var(a),
                target: Bci::new(5),
            },
        );
        ir.push(b1, Bci::new(5), QuadKind::Return { value: None });

        let (buf, _) = compile(&ir);
        let listing: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        // 10 < a became a > 10.
        assert!(listing.contains(&"cmp ecx, 10".to_string()));
        assert!(listing.iter().any(|s| s.starts_with("jg ")));
    }

    #[test]
    fn test_backward_goto_polls_before_jumping() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        ir.push(
            b0,
            Bci::new(4),
            QuadKind::Goto {
                target: Bci::new(0),
            },
        );

        let (buf, stats) = compile(&ir);
        let listing: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        let poll = listing
            .iter()
            .position(|s| s == "call rt:yieldpoint")
            .unwrap();
        let jump = listing.iter().position(|s| s.starts_with("jmp L")).unwrap();
        assert!(poll < jump);
        assert_eq!(stats.yieldpoints, 1);
    }

    #[test]
    fn test_counted_loop_polls_once_per_iteration() {
        // i = 0; s = 0; while (i < 5) { s += i; i += 1; } return s;
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(2));
        let b2 = ir.new_block(Bci::new(4));
        let b3 = ir.new_block(Bci::new(8));
        let i = reg_var(&mut ir, Gpr::Ecx);
        let s = reg_var(&mut ir, Gpr::Ebx);

        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: i,
                src: Operand::int(0),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: s,
                src: Operand::int(0),
            },
        );
        ir.push(
            b1,
            Bci::new(2),
            QuadKind::Branch {
                cond: BranchCond::Ge,
                lhs: Operand::Var(i),
                rhs: Operand::int(5),
                target: Bci::new(8),
            },
        );
        ir.push(
            b2,
            Bci::new(4),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: s,
                lhs: Operand::Var(s),
                rhs: Operand::Var(i),
            },
        );
        ir.push(
            b2,
            Bci::new(5),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: i,
                lhs: Operand::Var(i),
                rhs: Operand::int(1),
            },
        );
        ir.push(
            b2,
            Bci::new(6),
            QuadKind::Goto {
                target: Bci::new(2),
            },
        );
        ir.push(
            b3,
            Bci::new(8),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(s))),
            },
        );

        let (buf, stats) = compile(&ir);
        assert_eq!(stats.yieldpoints, 1);

        let mut m = Machine::new();
        let outcome = m.call(&buf, &[]);
        assert_eq!(
            outcome,
            RunOutcome::Returned {
                eax: 10,
                st0: None
            }
        );
        // The poll sits on the back edge, once per completed iteration.
        assert_eq!(m.yield_count, 5);
    }

    #[test]
    fn test_both_constant_compare_still_branches() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(5));
        let b2 = ir.new_block(Bci::new(7));
        let d = reg_var(&mut ir, Gpr::Ecx);
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Branch {
                cond: BranchCond::Le,
                lhs: Operand::int(3),
                rhs: Operand::int(3),
                target: Bci::new(7),
            },
        );
        ir.push(
            b1,
            Bci::new(5),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: d,
                src: Operand::int(0),
            },
        );
        ir.push(
            b1,
            Bci::new(6),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );
        ir.push(
            b2,
            Bci::new(7),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: d,
                src: Operand::int(1),
            },
        );
        ir.push(
            b2,
            Bci::new(8),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );

        let (buf, _) = compile(&ir);
        let mut m = Machine::new();
        let outcome = m.call(&buf, &[]);
        assert_eq!(
            outcome,
            RunOutcome::Returned {
                eax: 1,
                st0: None
            }
        );
    }
}
