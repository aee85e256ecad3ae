//! Call and throw lowering.
//!
//! Arguments are pushed last to first, leaving the first argument (the
//! receiver, for instance calls) at the stack top when control
//! transfers. Compiled methods pop their own arguments on return, so no
//! fixup follows the call. Word results come back in eax; float and
//! double results ride the x87 stack and are either spilled to the
//! destination slot or popped when the caller discards them.
//!
//! Direct dispatch calls through the resolved entry cell. Virtual
//! dispatch chases the receiver's type word to its dispatch table and
//! calls through the code pointer of the slotted entry, using eax for
//! the whole chain.

use garnet_core::{JitError, JitResult, ValueType};

use crate::backend::x86::{CallTarget, FpWidth, Gpr, Insn, MemRef, Opnd};
use crate::ir::{CallKind, MethodRef, Operand, OperandList, VarId};
use crate::runtime::{Dispatch, MethodMetadata, RuntimeEntry};

use super::CodeGenerator;

impl<M: MethodMetadata> CodeGenerator<'_, M> {
    /// Push one argument, widest first for doubles so the pair sits
    /// little-endian in the callee's frame. Returns the words pushed.
    fn push_value(&mut self, arg: &Operand) -> JitResult<u16> {
        let ty = match arg {
            Operand::Var(v) => self.ir.pool.ty(*v),
            Operand::Const(c) => c.value_type(),
        };
        match ty {
            ValueType::Long => Err(JitError::not_supported("long call argument")),
            ValueType::Double => {
                match arg {
                    Operand::Var(v) => {
                        let slot = self.float_slot(*v)?;
                        self.emit(Insn::Push {
                            src: Opnd::Mem(slot.offset(4)),
                        });
                        self.emit(Insn::Push {
                            src: Opnd::Mem(slot),
                        });
                    }
                    Operand::Const(c) => {
                        let bits = c.double_bits().ok_or_else(|| {
                            JitError::internal("double argument from a non-double constant")
                        })?;
                        self.emit(Insn::Push {
                            src: Opnd::Imm((bits >> 32) as i32),
                        });
                        self.emit(Insn::Push {
                            src: Opnd::Imm(bits as u32 as i32),
                        });
                    }
                }
                Ok(2)
            }
            _ => {
                let v = self.operand(arg)?;
                self.emit(Insn::Push { src: v });
                Ok(1)
            }
        }
    }

    /// Land the callee's result in its destination. Word results move
    /// out of eax; fpu results are spilled or popped so the x87 stack
    /// leaves the call site empty either way.
    fn take_call_result(&mut self, ret: Option<ValueType>, dst: Option<VarId>) -> JitResult<()> {
        match (ret, dst) {
            (Some(ty), Some(d)) if ty.is_float() => {
                let width = if ty == ValueType::Double {
                    FpWidth::Double
                } else {
                    FpWidth::Single
                };
                let slot = self.float_slot(d)?;
                self.emit(Insn::Fstp { width, dst: slot });
            }
            (Some(ty), None) if ty.is_float() => self.emit(Insn::FstpSt0),
            (Some(_), Some(d)) => {
                let dd = self.dst_opnd(d)?;
                self.move_word(dd, Opnd::Reg(Gpr::Eax));
            }
            (None, Some(_)) => {
                return Err(JitError::internal("void call assigned a result"));
            }
            _ => {}
        }
        Ok(())
    }

    pub(super) fn emit_call(
        &mut self,
        kind: CallKind,
        method: MethodRef,
        dst: Option<VarId>,
        args: &OperandList,
    ) -> JitResult<()> {
        let site = self.meta.method_site(kind, method)?;
        if site.return_type == Some(ValueType::Long) {
            return Err(JitError::not_supported("long return value"));
        }

        let mut pushed: u16 = 0;
        for arg in args.iter().rev() {
            pushed += self.push_value(arg)?;
        }
        if pushed != site.arg_words {
            return Err(JitError::internal(format!(
                "{pushed} argument words pushed for a site expecting {}",
                site.arg_words
            )));
        }

        match site.dispatch {
            Dispatch::Direct { entry_cell } => {
                self.emit(Insn::Call {
                    target: CallTarget::Mem(MemRef::absolute(entry_cell)),
                });
            }
            Dispatch::Vtable { slot } => {
                if args.is_empty() {
                    return Err(JitError::internal("virtual call without a receiver"));
                }
                let hdr = self.target.object;
                // Receiver is the last value pushed, still at the top.
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: Opnd::Mem(MemRef::base_disp(Gpr::Esp, 0)),
                });
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: Opnd::Mem(MemRef::base_disp(Gpr::Eax, hdr.type_word_off)),
                });
                let entry_disp = hdr
                    .vtable_base_off
                    .wrapping_add(slot.wrapping_mul(4) as i32);
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: Opnd::Mem(MemRef::base_disp(Gpr::Eax, entry_disp)),
                });
                self.emit(Insn::Call {
                    target: CallTarget::Mem(MemRef::base_disp(Gpr::Eax, hdr.code_ptr_off)),
                });
            }
        }

        self.take_call_result(site.return_type, dst)
    }

    /// The runtime unwinds from here; nothing follows in this block.
    pub(super) fn emit_throw(&mut self, exception: &Operand) -> JitResult<()> {
        let obj = self.operand(exception)?;
        self.emit(Insn::Push { src: obj });
        self.runtime_call(RuntimeEntry::Throw);
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
    use crate::ir::{Bci, ClassRef, FieldRef, Location, MethodIr, QuadKind, VarOrigin};
    use crate::regalloc::{Allocation, AllocatorStats};
    use crate::runtime::{unresolved, FieldStorage, MethodSite, TargetConfig};
    use garnet_core::ErrorKind;
    use smallvec::smallvec;

    /// Hands every call the one site it was built with.
    struct SiteMeta {
        site: MethodSite,
    }

    impl SiteMeta {
        fn direct(arg_words: u16, return_type: Option<ValueType>) -> Self {
            Self {
                site: MethodSite {
                    arg_words,
                    return_type,
                    dispatch: Dispatch::Direct { entry_cell: 0x2000 },
                },
            }
        }

        fn vtable(arg_words: u16, slot: u32) -> Self {
            Self {
                site: MethodSite {
                    arg_words,
                    return_type: None,
                    dispatch: Dispatch::Vtable { slot },
                },
            }
        }
    }

    impl MethodMetadata for SiteMeta {
        fn bytecode(&self) -> &[u8] {
            &[]
        }
        fn arg_words(&self) -> u16 {
            0
        }
        fn return_type(&self) -> Option<ValueType> {
            None
        }
        fn field_storage(&self, field: FieldRef) -> JitResult<FieldStorage> {
            Err(unresolved(format!("field {field}")))
        }
        fn method_site(&self, _kind: CallKind, _method: MethodRef) -> JitResult<MethodSite> {
            Ok(self.site)
        }
        fn class_handle(&self, class: ClassRef) -> JitResult<i32> {
            Err(unresolved(format!("class {class}")))
        }
    }

    fn layout(spill_words: usize) -> FrameLayout {
        let alloc = Allocation {
            used_callee_saved: GprSet::EMPTY,
            spill_words,
            stats: AllocatorStats::default(),
        };
        FrameLayout::new(&alloc, 0)
    }

    fn compile<M: MethodMetadata>(ir: &MethodIr, meta: &M, spill_words: usize) -> CodeBuffer {
        let target = TargetConfig::default();
        let frame = layout(spill_words);
        let (buf, _) = super::super::CodeGenerator::new(ir, meta, &target, &frame)
            .run()
            .unwrap();
        buf
    }

    fn listing<M: MethodMetadata>(ir: &MethodIr, meta: &M, spill_words: usize) -> Vec<String> {
        compile(ir, meta, spill_words)
            .insns()
            .map(|i| i.to_string())
            .collect()
    }

    fn body<M: MethodMetadata>(ir: &MethodIr, meta: &M, spill_words: usize) -> Vec<String> {
        let full = listing(ir, meta, spill_words);
        let prologue = if spill_words > 0 { 3 } else { 2 };
        let end = full.iter().position(|s| s == "jmp L0").unwrap();
        full[prologue..end].to_vec()
    }

    fn var(ir: &mut MethodIr, ty: ValueType, loc: Location) -> VarId {
        let v = ir.pool.alloc(ty, VarOrigin::Stack(0));
        ir.pool.set_location(v, loc);
        v
    }

    #[test]
    fn test_arguments_push_last_to_first() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let r = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Esi));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![Operand::Var(r), Operand::int(7)],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        // The callee pops its arguments, so nothing follows the call.
        assert_eq!(
            body(&ir, &SiteMeta::direct(2, None), 0),
            vec!["push 7", "push esi", "call dword [0x2000]"]
        );
    }

    #[test]
    fn test_int_result_moves_out_of_eax() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: Some(d),
                args: smallvec![],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, &SiteMeta::direct(0, Some(ValueType::Int)), 0),
            vec!["call dword [0x2000]", "mov ecx, eax"]
        );
    }

    #[test]
    fn test_fpu_results_spill_to_the_destination_slot() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Double, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: Some(d),
                args: smallvec![],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        assert_eq!(
            body(&ir, &SiteMeta::direct(0, Some(ValueType::Double)), 2),
            vec!["call dword [0x2000]", "fstp qword [ebp-8]"]
        );

        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Float, Location::Stack(-4));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: Some(d),
                args: smallvec![],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        assert_eq!(
            body(&ir, &SiteMeta::direct(0, Some(ValueType::Float)), 1),
            vec!["call dword [0x2000]", "fstp dword [ebp-4]"]
        );
    }

    #[test]
    fn test_discarded_fpu_result_is_popped() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, &SiteMeta::direct(0, Some(ValueType::Float)), 0),
            vec!["call dword [0x2000]", "fstp st(0)"]
        );
    }

    #[test]
    fn test_double_argument_pushes_high_word_first() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let x = var(&mut ir, ValueType::Double, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![Operand::Var(x)],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, &SiteMeta::direct(2, None), 2),
            vec![
                "push dword [ebp-4]",
                "push dword [ebp-8]",
                "call dword [0x2000]",
            ]
        );
    }

    #[test]
    fn test_virtual_call_walks_the_receiver_dispatch_chain() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let recv = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Virtual,
                method: MethodRef(5),
                dst: None,
                args: smallvec![Operand::Var(recv)],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let meta = SiteMeta::vtable(1, 3);

        // Default layout: type word at 0, table at 16, code pointer at 4.
        assert_eq!(
            body(&ir, &meta, 0),
            vec![
                "push ebx",
                "mov eax, [esp]",
                "mov eax, [eax]",
                "mov eax, [eax+28]",
                "call dword [eax+4]",
            ]
        );

        let buf = compile(&ir, &meta, 0);
        let mut m = Machine::new();
        m.set_reg(Gpr::Ebx, 0x400);
        m.write_i32(0x400, 0x500).unwrap();
        m.write_i32(0x500 + 28, 0x560).unwrap();
        assert_eq!(
            m.call(&buf, &[]),
            RunOutcome::HaltedAtCall {
                target: MemRef::base_disp(Gpr::Eax, 4)
            }
        );
        assert_eq!(m.reg(Gpr::Eax), 0x560);
        // The receiver is still the top of stack at the transfer.
        assert_eq!(m.read_i32(m.reg(Gpr::Esp)).unwrap(), 0x400);
    }

    #[test]
    fn test_mismatched_argument_width_is_internal() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![Operand::int(1)],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        let target = TargetConfig::default();
        let frame = layout(0);
        let meta = SiteMeta::direct(3, None);
        let err = super::super::CodeGenerator::new(&ir, &meta, &target, &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_long_values_are_declined() {
        // Long argument.
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let x = ir.pool.alloc(ValueType::Long, VarOrigin::Stack(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![Operand::Var(x)],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let target = TargetConfig::default();
        let frame = layout(0);
        let meta = SiteMeta::direct(2, None);
        let err = super::super::CodeGenerator::new(&ir, &meta, &target, &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(err.is_decline());

        // Long return value.
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(5),
                dst: None,
                args: smallvec![],
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let frame = layout(0);
        let meta = SiteMeta::direct(0, Some(ValueType::Long));
        let err = super::super::CodeGenerator::new(&ir, &meta, &target, &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_throw_hands_the_exception_to_the_runtime() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let e = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Throw {
                exception: Operand::Var(e),
            },
        );
        let buf = compile(&ir, &NullMeta, 0);

        let l: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        let at = l.iter().position(|s| s == "call rt:throw").unwrap();
        assert_eq!(l[at - 1], "push ebx");

        let mut m = Machine::new();
        m.set_reg(Gpr::Ebx, 0x77);
        assert_eq!(
            m.call(&buf, &[]),
            RunOutcome::Trapped {
                entry: RuntimeEntry::Throw,
                args: vec![0x77],
            }
        );
    }
}
