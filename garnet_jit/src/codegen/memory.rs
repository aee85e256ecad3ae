//! Heap access lowering: array elements, instance and static fields,
//! allocation, and the monitor pair.
//!
//! Array addressing folds a constant index into the displacement and
//! uses a scaled index register otherwise. Every element access is
//! guarded by a single unsigned compare of the index against the length
//! word in the array header; one branch catches negative indices and
//! indices at or past the length alike, landing in an out-of-line
//! failure block that hands the reference and index to the runtime.
//!
//! Instance accesses dispatch on the field's signature kind for width
//! and extension. The statics table holds one word per slot with
//! sub-int values already widened, so static accesses always move whole
//! words. Wide (64-bit) fields are outside this tier's frame model and
//! are declined; the pre-check screens them out before compilation
//! normally starts.

use garnet_core::{ElemKind, JitError, JitResult};

use crate::backend::x86::{AluOp, Cond, Ext, ExtSrc, Gpr, Insn, MemRef, Opnd, Scale, Width};
use crate::ir::{Bci, ClassRef, FieldRef, Operand, OperandList, VarId};
use crate::runtime::{FieldStorage, MethodMetadata, RuntimeEntry, StaticsAddressing};

use super::CodeGenerator;

/// Whether the address computation reads `reg`.
fn addr_uses(addr: MemRef, reg: Gpr) -> bool {
    addr.base == Some(reg) || matches!(addr.index, Some((index, _)) if index == reg)
}

/// Wide (64-bit) fields have no single-word storage in this tier.
fn check_field_width(field: FieldRef) -> JitResult<()> {
    if field.kind.is_wide() {
        return Err(JitError::not_supported(format!("64-bit field {field}")));
    }
    Ok(())
}

impl<M: MethodMetadata> CodeGenerator<'_, M> {
    // =========================================================================
    // Element addressing
    // =========================================================================

    /// Emit the bounds check for one array access and hand back the
    /// element address. The returned reference may be built on eax, so
    /// the movers below must read it before clobbering eax; ecx is
    /// borrowed and restored when the base and the index both need a
    /// register at once.
    fn array_element(
        &mut self,
        bci: Bci,
        elem: ElemKind,
        array: &Operand,
        index: &Operand,
    ) -> JitResult<MemRef> {
        let a = self.operand(array)?;
        let i = self.operand(index)?;
        // Snapshot the original shapes for the failure block before any
        // register below is repurposed.
        let fail = self.defer_bounds_failure(bci, a, i);

        let len_off = self.target.object.array_len_off;
        let data_off = self.target.object.array_data_off;
        let scale = Scale::from_log2(elem.log2_scale())
            .ok_or_else(|| JitError::internal("element scale outside addressing modes"))?;

        Ok(match i {
            Opnd::Imm(k) => {
                let base = self.into_reg(a, Gpr::Eax);
                // length <= k unsigned, which also catches negative k.
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: Opnd::Mem(MemRef::base_disp(base, len_off)),
                    src: Opnd::Imm(k),
                });
                self.emit(Insn::Jcc {
                    cond: Cond::Be,
                    target: fail,
                });
                // A wild constant index may wrap the displacement; the
                // check in front keeps such an access unreachable.
                let disp = data_off.wrapping_add(k.wrapping_mul(elem.size_bytes() as i32));
                MemRef::base_disp(base, disp)
            }
            Opnd::Reg(ri) => {
                let base = self.into_reg(a, Gpr::Eax);
                self.emit(Insn::Alu {
                    op: AluOp::Cmp,
                    dst: Opnd::Reg(ri),
                    src: Opnd::Mem(MemRef::base_disp(base, len_off)),
                });
                self.emit(Insn::Jcc {
                    cond: Cond::Ae,
                    target: fail,
                });
                MemRef::base_index_disp(base, ri, scale, data_off)
            }
            Opnd::Mem(_) => match a {
                Opnd::Reg(base) => {
                    // The array keeps its register, so eax can carry the
                    // index.
                    self.emit(Insn::Mov {
                        dst: Opnd::Reg(Gpr::Eax),
                        src: i,
                    });
                    self.emit(Insn::Alu {
                        op: AluOp::Cmp,
                        dst: Opnd::Reg(Gpr::Eax),
                        src: Opnd::Mem(MemRef::base_disp(base, len_off)),
                    });
                    self.emit(Insn::Jcc {
                        cond: Cond::Ae,
                        target: fail,
                    });
                    MemRef::base_index_disp(base, Gpr::Eax, scale, data_off)
                }
                _ => {
                    // Neither operand owns a register: base in eax, index
                    // through a borrowed ecx, then collapse the address
                    // into eax so ecx can go back.
                    self.emit(Insn::Mov {
                        dst: Opnd::Reg(Gpr::Eax),
                        src: a,
                    });
                    self.emit(Insn::Push {
                        src: Opnd::Reg(Gpr::Ecx),
                    });
                    self.emit(Insn::Mov {
                        dst: Opnd::Reg(Gpr::Ecx),
                        src: i,
                    });
                    self.emit(Insn::Alu {
                        op: AluOp::Cmp,
                        dst: Opnd::Reg(Gpr::Ecx),
                        src: Opnd::Mem(MemRef::base_disp(Gpr::Eax, len_off)),
                    });
                    self.emit(Insn::Jcc {
                        cond: Cond::Ae,
                        target: fail,
                    });
                    self.emit(Insn::Lea {
                        dst: Gpr::Eax,
                        src: MemRef::base_index_disp(Gpr::Eax, Gpr::Ecx, scale, data_off),
                    });
                    self.emit(Insn::Pop {
                        dst: Opnd::Reg(Gpr::Ecx),
                    });
                    MemRef::base_disp(Gpr::Eax, 0)
                }
            },
        })
    }

    // =========================================================================
    // Width-dispatched movers
    // =========================================================================

    /// Load the word at `addr` into a variable's storage. The read comes
    /// first, so an address built on eax survives eax doubling as the
    /// staging register.
    fn load_word(&mut self, dst: Opnd, addr: MemRef) {
        match dst {
            Opnd::Reg(_) => self.emit(Insn::Mov {
                dst,
                src: Opnd::Mem(addr),
            }),
            _ => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: Opnd::Mem(addr),
                });
                self.emit(Insn::Mov {
                    dst,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
        }
    }

    /// Store a word to `addr`. A memory-resident value normally stages
    /// through eax; when the address is built on eax the copy goes over
    /// the machine stack instead, which needs no register at all.
    fn store_word(&mut self, addr: MemRef, value: Opnd) {
        match value {
            Opnd::Mem(src) if addr_uses(addr, Gpr::Eax) => {
                self.emit(Insn::Push {
                    src: Opnd::Mem(src),
                });
                self.emit(Insn::Pop {
                    dst: Opnd::Mem(addr),
                });
            }
            Opnd::Mem(_) => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: value,
                });
                self.emit(Insn::Mov {
                    dst: Opnd::Mem(addr),
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
            _ => self.emit(Insn::Mov {
                dst: Opnd::Mem(addr),
                src: value,
            }),
        }
    }

    /// Copy two adjacent words between memory locations over the machine
    /// stack.
    fn copy_pair(&mut self, dst: MemRef, src: MemRef) {
        for half in [0, 4] {
            self.emit(Insn::Push {
                src: Opnd::Mem(src.offset(half)),
            });
            self.emit(Insn::Pop {
                dst: Opnd::Mem(dst.offset(half)),
            });
        }
    }

    fn load_narrow(&mut self, ext: Ext, width: Width, dst: Opnd, addr: MemRef) {
        match dst {
            Opnd::Reg(r) => self.emit(Insn::MovExt {
                ext,
                width,
                dst: r,
                src: ExtSrc::Mem(addr),
            }),
            _ => {
                self.emit(Insn::MovExt {
                    ext,
                    width,
                    dst: Gpr::Eax,
                    src: ExtSrc::Mem(addr),
                });
                self.emit(Insn::Mov {
                    dst,
                    src: Opnd::Reg(Gpr::Eax),
                });
            }
        }
    }

    /// Sub-word store. Byte stores need a byte-addressable register for
    /// the value; when eax is unavailable because the address is built
    /// on it, `lea` collapses the address first and ecx is borrowed for
    /// the value.
    fn store_narrow(&mut self, width: Width, addr: MemRef, value: Opnd) {
        match value {
            Opnd::Imm(v) => self.emit(Insn::StoreImm {
                width,
                dst: addr,
                imm: v,
            }),
            Opnd::Reg(r) if width == Width::Word || r.has_low_byte() => {
                self.emit(Insn::Store {
                    width,
                    dst: addr,
                    src: r,
                });
            }
            _ if !addr_uses(addr, Gpr::Eax) => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: value,
                });
                self.emit(Insn::Store {
                    width,
                    dst: addr,
                    src: Gpr::Eax,
                });
            }
            _ => {
                self.emit(Insn::Lea {
                    dst: Gpr::Eax,
                    src: addr,
                });
                self.emit(Insn::Push {
                    src: Opnd::Reg(Gpr::Ecx),
                });
                // value is never ecx here; ecx has a byte form and took
                // the direct path above.
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Ecx),
                    src: value,
                });
                self.emit(Insn::Store {
                    width,
                    dst: MemRef::base_disp(Gpr::Eax, 0),
                    src: Gpr::Ecx,
                });
                self.emit(Insn::Pop {
                    dst: Opnd::Reg(Gpr::Ecx),
                });
            }
        }
    }

    // =========================================================================
    // Array access
    // =========================================================================

    pub(super) fn emit_array_load(
        &mut self,
        bci: Bci,
        elem: ElemKind,
        dst: VarId,
        array: &Operand,
        index: &Operand,
    ) -> JitResult<()> {
        if elem.is_long() {
            return Err(JitError::not_supported("long array element"));
        }
        let addr = self.array_element(bci, elem, array, index)?;
        match elem {
            ElemKind::Double => {
                let slot = self.float_slot(dst)?;
                self.copy_pair(slot, addr);
            }
            ElemKind::Int | ElemKind::Float | ElemKind::Reference => {
                let d = self.dst_opnd(dst)?;
                self.load_word(d, addr);
            }
            _ => {
                let ext = if elem.sign_extends() { Ext::Sign } else { Ext::Zero };
                let width = if elem.size_bytes() == 1 {
                    Width::Byte
                } else {
                    Width::Word
                };
                let d = self.dst_opnd(dst)?;
                self.load_narrow(ext, width, d, addr);
            }
        }
        Ok(())
    }

    pub(super) fn emit_array_store(
        &mut self,
        bci: Bci,
        elem: ElemKind,
        array: &Operand,
        index: &Operand,
        value: &Operand,
    ) -> JitResult<()> {
        if elem.is_long() {
            return Err(JitError::not_supported("long array element"));
        }
        let addr = self.array_element(bci, elem, array, index)?;
        match elem {
            ElemKind::Double => match value {
                Operand::Var(v) => {
                    let slot = self.float_slot(*v)?;
                    self.copy_pair(addr, slot);
                }
                Operand::Const(c) => {
                    let bits = c.double_bits().ok_or_else(|| {
                        JitError::internal("double element store from a non-double constant")
                    })?;
                    self.emit(Insn::Mov {
                        dst: Opnd::Mem(addr),
                        src: Opnd::Imm(bits as u32 as i32),
                    });
                    self.emit(Insn::Mov {
                        dst: Opnd::Mem(addr.offset(4)),
                        src: Opnd::Imm((bits >> 32) as i32),
                    });
                }
            },
            ElemKind::Int | ElemKind::Float | ElemKind::Reference => {
                // TODO: Check element-type compatibility on reference stores
                let v = self.operand(value)?;
                self.store_word(addr, v);
            }
            _ => {
                let v = self.operand(value)?;
                let width = if elem.size_bytes() == 1 {
                    Width::Byte
                } else {
                    Width::Word
                };
                self.store_narrow(width, addr, v);
            }
        }
        Ok(())
    }

    /// The length read is unguarded; a bad reference faults in the
    /// header the same way any other dereference of it would.
    pub(super) fn emit_array_length(&mut self, dst: VarId, array: &Operand) -> JitResult<()> {
        let a = self.operand(array)?;
        let base = self.into_reg(a, Gpr::Eax);
        let d = self.dst_opnd(dst)?;
        self.load_word(d, MemRef::base_disp(base, self.target.object.array_len_off));
        Ok(())
    }

    // =========================================================================
    // Instance fields
    // =========================================================================

    /// Resolve an instance field to its address off the object pointer.
    fn field_address(&mut self, field: FieldRef, object: &Operand) -> JitResult<MemRef> {
        match self.meta.field_storage(field)? {
            FieldStorage::Instance { offset } => {
                let obj = self.operand(object)?;
                let base = self.into_reg(obj, Gpr::Eax);
                Ok(MemRef::base_disp(base, offset))
            }
            FieldStorage::Static { .. } => Err(JitError::incompatible_class_change(format!(
                "instance access to static field {field}"
            ))),
        }
    }

    pub(super) fn emit_get_field(
        &mut self,
        field: FieldRef,
        dst: VarId,
        object: &Operand,
    ) -> JitResult<()> {
        check_field_width(field)?;
        let addr = self.field_address(field, object)?;
        let d = self.dst_opnd(dst)?;
        match field.kind.access_bytes() {
            4 => self.load_word(d, addr),
            n => {
                let ext = if field.kind.sign_extends() {
                    Ext::Sign
                } else {
                    Ext::Zero
                };
                let width = if n == 1 { Width::Byte } else { Width::Word };
                self.load_narrow(ext, width, d, addr);
            }
        }
        Ok(())
    }

    pub(super) fn emit_put_field(
        &mut self,
        field: FieldRef,
        object: &Operand,
        value: &Operand,
    ) -> JitResult<()> {
        check_field_width(field)?;
        let addr = self.field_address(field, object)?;
        let v = self.operand(value)?;
        match field.kind.access_bytes() {
            4 => self.store_word(addr, v),
            n => {
                let width = if n == 1 { Width::Byte } else { Width::Word };
                self.store_narrow(width, addr, v);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Statics
    // =========================================================================

    fn static_storage(&self, field: FieldRef) -> JitResult<u32> {
        match self.meta.field_storage(field)? {
            FieldStorage::Static { slot } => Ok(slot),
            FieldStorage::Instance { .. } => Err(JitError::incompatible_class_change(format!(
                "static access to instance field {field}"
            ))),
        }
    }

    /// Address of a statics-table slot, loading the table pointer first
    /// when the table is only reachable through its cell.
    fn static_slot(&mut self, slot: u32) -> MemRef {
        let disp = slot.wrapping_mul(4) as i32;
        match self.target.statics {
            StaticsAddressing::Direct { base } => MemRef::absolute(base.wrapping_add(disp)),
            StaticsAddressing::ViaRegister { table_cell } => {
                self.emit(Insn::Mov {
                    dst: Opnd::Reg(Gpr::Eax),
                    src: Opnd::Mem(MemRef::absolute(table_cell)),
                });
                MemRef::base_disp(Gpr::Eax, disp)
            }
        }
    }

    pub(super) fn emit_get_static(&mut self, field: FieldRef, dst: VarId) -> JitResult<()> {
        check_field_width(field)?;
        let slot = self.static_storage(field)?;
        let addr = self.static_slot(slot);
        let d = self.dst_opnd(dst)?;
        // Table slots hold full words; sub-int statics are stored
        // widened, so no extension is needed here.
        self.load_word(d, addr);
        Ok(())
    }

    pub(super) fn emit_put_static(&mut self, field: FieldRef, value: &Operand) -> JitResult<()> {
        check_field_width(field)?;
        let slot = self.static_storage(field)?;
        let addr = self.static_slot(slot);
        let v = self.operand(value)?;
        self.store_word(addr, v);
        Ok(())
    }

    // =========================================================================
    // Allocation and monitors
    // =========================================================================

    /// Move an allocation entry's result out of the return register.
    fn take_alloc_result(&mut self, dst: VarId) -> JitResult<()> {
        let d = self.dst_opnd(dst)?;
        self.move_word(d, Opnd::Reg(Gpr::Eax));
        Ok(())
    }

    pub(super) fn emit_new(&mut self, class: ClassRef, dst: VarId) -> JitResult<()> {
        let handle = self.meta.class_handle(class)?;
        self.emit(Insn::Push {
            src: Opnd::Imm(handle),
        });
        self.runtime_call(RuntimeEntry::NewObject);
        self.take_alloc_result(dst)
    }

    /// Arguments go on last-pushed-first, so the length is pushed before
    /// the element tag the entry reads first.
    pub(super) fn emit_new_array(
        &mut self,
        elem: ElemKind,
        dst: VarId,
        length: &Operand,
    ) -> JitResult<()> {
        let len = self.operand(length)?;
        self.emit(Insn::Push { src: len });
        self.emit(Insn::Push {
            src: Opnd::Imm(elem.newarray_tag()),
        });
        self.runtime_call(RuntimeEntry::NewPrimitiveArray);
        self.take_alloc_result(dst)
    }

    pub(super) fn emit_new_object_array(
        &mut self,
        class: ClassRef,
        dst: VarId,
        length: &Operand,
    ) -> JitResult<()> {
        let handle = self.meta.class_handle(class)?;
        let len = self.operand(length)?;
        self.emit(Insn::Push { src: len });
        self.emit(Insn::Push {
            src: Opnd::Imm(handle),
        });
        self.runtime_call(RuntimeEntry::NewObjectArray);
        self.take_alloc_result(dst)
    }

    /// Multi-dimensional allocation first builds an int array holding
    /// the dimension sizes, then hands it to the runtime together with
    /// the class.
    pub(super) fn emit_new_multi_array(
        &mut self,
        class: ClassRef,
        dst: VarId,
        dims: &OperandList,
    ) -> JitResult<()> {
        let handle = self.meta.class_handle(class)?;
        self.emit(Insn::Push {
            src: Opnd::Imm(dims.len() as i32),
        });
        self.emit(Insn::Push {
            src: Opnd::Imm(ElemKind::Int.newarray_tag()),
        });
        self.runtime_call(RuntimeEntry::NewPrimitiveArray);
        let data_off = self.target.object.array_data_off;
        for (i, dim) in dims.iter().enumerate() {
            let v = self.operand(dim)?;
            // The dimension array reference sits in eax; store_word's
            // stack path keeps it intact for memory-resident sizes.
            let slot = MemRef::base_disp(Gpr::Eax, data_off + 4 * i as i32);
            self.store_word(slot, v);
        }
        self.emit(Insn::Push {
            src: Opnd::Reg(Gpr::Eax),
        });
        self.emit(Insn::Push {
            src: Opnd::Imm(handle),
        });
        self.runtime_call(RuntimeEntry::NewMultiArray);
        self.take_alloc_result(dst)
    }

    pub(super) fn emit_monitor(&mut self, entry: RuntimeEntry, object: &Operand) -> JitResult<()> {
        let obj = self.operand(object)?;
        self.emit(Insn::Push { src: obj });
        self.runtime_call(entry);
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
    use crate::ir::{CallKind, Location, MethodIr, MethodRef, QuadKind, VarOrigin};
    use crate::regalloc::{Allocation, AllocatorStats};
    use crate::runtime::{unresolved, MethodSite, ObjectLayout, TargetConfig};
    use garnet_core::{ErrorKind, FieldKind, ValueType};
    use smallvec::smallvec;

    /// Resolves every field to a statics-table slot keyed by its pool
    /// index, for the static-access tests.
    struct StaticsMeta;

    impl MethodMetadata for StaticsMeta {
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
            Ok(FieldStorage::Static {
                slot: u32::from(field.index),
            })
        }
        fn method_site(&self, _kind: CallKind, method: MethodRef) -> JitResult<MethodSite> {
            Err(unresolved(format!("method {method}")))
        }
        fn class_handle(&self, _class: ClassRef) -> JitResult<i32> {
            Ok(0x41)
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

    fn compile_with<M: MethodMetadata>(
        ir: &MethodIr,
        meta: &M,
        target: &TargetConfig,
        spill_words: usize,
    ) -> CodeBuffer {
        let frame = layout(spill_words);
        let (buf, _) = super::super::CodeGenerator::new(ir, meta, target, &frame)
            .run()
            .unwrap();
        buf
    }

    fn compile(ir: &MethodIr, spill_words: usize) -> CodeBuffer {
        compile_with(ir, &NullMeta, &TargetConfig::default(), spill_words)
    }

    fn listing(ir: &MethodIr, spill_words: usize) -> Vec<String> {
        compile(ir, spill_words).insns().map(|i| i.to_string()).collect()
    }

    /// The single block's body: everything between the prologue and the
    /// jump to the shared epilogue. Unlike the arithmetic tests, methods
    /// here may carry bounds-failure blocks past the epilogue, so the
    /// cut is at the jump rather than a fixed tail length.
    fn body(ir: &MethodIr, spill_words: usize) -> Vec<String> {
        let full = listing(ir, spill_words);
        let prologue = if spill_words > 0 { 3 } else { 2 };
        let end = full.iter().position(|s| s == "jmp L0").unwrap();
        full[prologue..end].to_vec()
    }

    fn var(ir: &mut MethodIr, ty: ValueType, loc: Location) -> VarId {
        let v = ir.pool.alloc(ty, VarOrigin::Stack(0));
        ir.pool.set_location(v, loc);
        v
    }

    fn field(index: u16, kind: FieldKind) -> FieldRef {
        FieldRef { index, kind }
    }

    #[test]
    fn test_int_element_load_uses_scaled_addressing() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLoad {
                elem: ElemKind::Int,
                dst: d,
                array: Operand::Var(a),
                index: Operand::Var(i),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let l = listing(&ir, 0);
        let at = l.iter().position(|s| s == "cmp esi, [ebx+8]").unwrap();
        assert!(l[at + 1].starts_with("jae "));
        assert_eq!(l[at + 2], "mov ecx, [ebx+esi*4+12]");
        // The failure block sits past the epilogue and hands the runtime
        // the reference ahead of the index.
        assert_eq!(
            &l[l.len() - 3..],
            &["push esi", "push ebx", "call rt:out_of_bounds"]
        );
    }

    #[test]
    fn test_constant_index_folds_into_the_displacement() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLoad {
                elem: ElemKind::Int,
                dst: d,
                array: Operand::Var(a),
                index: Operand::int(3),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let b = body(&ir, 0);
        assert_eq!(b.len(), 3);
        assert_eq!(b[0], "cmp [ebx+8], 3");
        assert!(b[1].starts_with("jbe "));
        assert_eq!(b[2], "mov ecx, [ebx+24]");
    }

    #[test]
    fn test_bounds_check_is_total_over_the_index_range() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLoad {
                elem: ElemKind::Int,
                dst: d,
                array: Operand::Var(a),
                index: Operand::Var(i),
            },
        );
        ir.push(
            b0,
            Bci::new(2),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );
        let buf = compile(&ir, 0);
        let hdr = ObjectLayout::default();

        for (index, in_bounds) in [(-1, false), (0, true), (3, true), (4, false), (5, false)] {
            let mut m = Machine::new();
            m.set_reg(Gpr::Ebx, 0x400);
            m.set_reg(Gpr::Esi, index);
            m.write_i32(0x400 + hdr.array_len_off, 4).unwrap();
            for k in 0..4 {
                m.write_i32(0x400 + hdr.array_data_off + 4 * k, 10 + k).unwrap();
            }
            let outcome = m.call(&buf, &[]);
            if in_bounds {
                assert_eq!(
                    outcome,
                    RunOutcome::Returned {
                        eax: 10 + index,
                        st0: None
                    }
                );
            } else {
                assert_eq!(
                    outcome,
                    RunOutcome::Trapped {
                        entry: RuntimeEntry::OutOfBounds,
                        args: vec![0x400, index],
                    }
                );
            }
        }
    }

    #[test]
    fn test_spilled_array_and_index_collapse_the_address_into_eax() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Stack(-4));
        let i = var(&mut ir, ValueType::Int, Location::Stack(-8));
        let d = var(&mut ir, ValueType::Int, Location::Stack(-12));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLoad {
                elem: ElemKind::Int,
                dst: d,
                array: Operand::Var(a),
                index: Operand::Var(i),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let b = body(&ir, 3);
        assert_eq!(b[0], "mov eax, [ebp-4]");
        assert_eq!(b[1], "push ecx");
        assert_eq!(b[2], "mov ecx, [ebp-8]");
        assert_eq!(b[3], "cmp ecx, [eax+8]");
        assert!(b[4].starts_with("jae "));
        assert_eq!(b[5], "lea eax, [eax+ecx*4+12]");
        assert_eq!(b[6], "pop ecx");
        assert_eq!(b[7], "mov eax, [eax]");
        assert_eq!(b[8], "mov [ebp-12], eax");
    }

    #[test]
    fn test_byte_store_borrows_ecx_when_eax_holds_the_address() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Stack(-4));
        let v = var(&mut ir, ValueType::Int, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayStore {
                elem: ElemKind::Byte,
                array: Operand::Var(a),
                index: Operand::int(0),
                value: Operand::Var(v),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let b = body(&ir, 2);
        assert_eq!(b[0], "mov eax, [ebp-4]");
        assert_eq!(b[1], "cmp [eax+8], 0");
        assert!(b[2].starts_with("jbe "));
        assert_eq!(
            &b[3..],
            &[
                "lea eax, [eax+12]",
                "push ecx",
                "mov ecx, [ebp-8]",
                "mov byte [eax], cl",
                "pop ecx",
            ]
        );
    }

    #[test]
    fn test_byte_store_value_without_a_byte_form_goes_through_al() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Edx));
        let v = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayStore {
                elem: ElemKind::Byte,
                array: Operand::Var(a),
                index: Operand::Var(i),
                value: Operand::Var(v),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let b = body(&ir, 0);
        assert_eq!(b[0], "cmp edx, [ebx+8]");
        assert!(b[1].starts_with("jae "));
        assert_eq!(b[2], "mov eax, esi");
        assert_eq!(b[3], "mov byte [ebx+edx*1+12], al");
    }

    #[test]
    fn test_reference_store_is_word_identical_to_an_int_store() {
        fn store_listing(elem: ElemKind) -> Vec<String> {
            let mut ir = MethodIr::new();
            let b0 = ir.new_block(Bci::new(0));
            let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
            let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
            let ty = if elem == ElemKind::Reference {
                ValueType::Reference
            } else {
                ValueType::Int
            };
            let v = var(&mut ir, ty, Location::Register(Gpr::Edi));
            ir.push(
                b0,
                Bci::new(0),
                QuadKind::ArrayStore {
                    elem,
                    array: Operand::Var(a),
                    index: Operand::Var(i),
                    value: Operand::Var(v),
                },
            );
            ir.push(b0, Bci::new(2), QuadKind::Return { value: None });
            listing(&ir, 0)
        }

        // No element-type check sequence: the only call in a reference
        // store is the shared bounds-failure thunk.
        let reference = store_listing(ElemKind::Reference);
        assert_eq!(reference, store_listing(ElemKind::Int));
        let calls: Vec<&str> = reference
            .iter()
            .filter(|s| s.starts_with("call "))
            .map(String::as_str)
            .collect();
        assert_eq!(calls, ["call rt:out_of_bounds"]);
    }

    #[test]
    fn test_subword_elements_extend_by_kind() {
        fn load_method(elem: ElemKind) -> MethodIr {
            let mut ir = MethodIr::new();
            let b0 = ir.new_block(Bci::new(0));
            let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
            let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
            let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
            ir.push(
                b0,
                Bci::new(0),
                QuadKind::ArrayLoad {
                    elem,
                    dst: d,
                    array: Operand::Var(a),
                    index: Operand::Var(i),
                },
            );
            ir.push(
                b0,
                Bci::new(2),
                QuadKind::Return {
                    value: Some((ValueType::Int, Operand::Var(d))),
                },
            );
            ir
        }

        let hdr = ObjectLayout::default();
        let run = |elem: ElemKind| {
            let buf = compile(&load_method(elem), 0);
            let mut m = Machine::new();
            m.set_reg(Gpr::Ebx, 0x400);
            m.set_reg(Gpr::Esi, 1);
            m.write_i32(0x400 + hdr.array_len_off, 2).unwrap();
            m.write_u16(0x400 + hdr.array_data_off + 2, 0xFFFF).unwrap();
            m.call(&buf, &[])
        };

        assert_eq!(
            run(ElemKind::Char),
            RunOutcome::Returned { eax: 0xFFFF, st0: None }
        );
        assert_eq!(
            run(ElemKind::Short),
            RunOutcome::Returned { eax: -1, st0: None }
        );
    }

    #[test]
    fn test_double_element_moves_as_a_word_pair() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let i = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        let d = var(&mut ir, ValueType::Double, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLoad {
                elem: ElemKind::Double,
                dst: d,
                array: Operand::Var(a),
                index: Operand::Var(i),
            },
        );
        ir.push(
            b0,
            Bci::new(2),
            QuadKind::Return {
                value: Some((ValueType::Double, Operand::Var(d))),
            },
        );
        let buf = compile(&ir, 2);

        let hdr = ObjectLayout::default();
        let mut m = Machine::new();
        m.set_reg(Gpr::Ebx, 0x400);
        m.set_reg(Gpr::Esi, 1);
        m.write_i32(0x400 + hdr.array_len_off, 2).unwrap();
        m.write_f64(0x400 + hdr.array_data_off + 8, -2.5).unwrap();
        assert_eq!(
            m.call(&buf, &[]),
            RunOutcome::Returned { eax: 0, st0: Some(-2.5) }
        );
    }

    #[test]
    fn test_array_stores_land_in_memory() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let v = var(&mut ir, ValueType::Int, Location::Register(Gpr::Edx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayStore {
                elem: ElemKind::Int,
                array: Operand::Var(a),
                index: Operand::int(0),
                value: Operand::int(99),
            },
        );
        ir.push(
            b0,
            Bci::new(4),
            QuadKind::ArrayStore {
                elem: ElemKind::Int,
                array: Operand::Var(a),
                index: Operand::int(1),
                value: Operand::Var(v),
            },
        );
        ir.push(b0, Bci::new(8), QuadKind::Return { value: None });
        let buf = compile(&ir, 0);

        let hdr = ObjectLayout::default();
        let mut m = Machine::new();
        m.set_reg(Gpr::Ebx, 0x400);
        m.set_reg(Gpr::Edx, 55);
        m.write_i32(0x400 + hdr.array_len_off, 2).unwrap();
        assert_eq!(m.call(&buf, &[]), RunOutcome::Returned { eax: 0, st0: None });
        assert_eq!(m.read_i32(0x400 + hdr.array_data_off).unwrap(), 99);
        assert_eq!(m.read_i32(0x400 + hdr.array_data_off + 4).unwrap(), 55);
    }

    #[test]
    fn test_array_length_reads_the_header_word() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::ArrayLength {
                dst: d,
                array: Operand::Var(a),
            },
        );
        ir.push(b0, Bci::new(1), QuadKind::Return { value: None });

        assert_eq!(body(&ir, 0), vec!["mov ecx, [ebx+8]"]);
    }

    #[test]
    fn test_field_loads_dispatch_on_signature_width() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let d1 = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        let d2 = var(&mut ir, ValueType::Int, Location::Register(Gpr::Edx));
        let d3 = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetField {
                field: field(1, FieldKind::Byte),
                dst: d1,
                object: Operand::Var(o),
            },
        );
        ir.push(
            b0,
            Bci::new(3),
            QuadKind::GetField {
                field: field(2, FieldKind::Char),
                dst: d2,
                object: Operand::Var(o),
            },
        );
        ir.push(
            b0,
            Bci::new(6),
            QuadKind::GetField {
                field: field(3, FieldKind::Int),
                dst: d3,
                object: Operand::Var(o),
            },
        );
        ir.push(b0, Bci::new(9), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, 0),
            vec![
                "movsx ecx, byte [ebx+16]",
                "movzx edx, word [ebx+16]",
                "mov esi, [ebx+16]",
            ]
        );
    }

    #[test]
    fn test_field_store_with_spilled_operands_avoids_registers() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Stack(-4));
        let v = var(&mut ir, ValueType::Int, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::PutField {
                field: field(1, FieldKind::Int),
                object: Operand::Var(o),
                value: Operand::Var(v),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, 2),
            vec![
                "mov eax, [ebp-4]",
                "push dword [ebp-8]",
                "pop dword [eax+16]",
            ]
        );
    }

    #[test]
    fn test_wide_fields_are_declined() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let d = var(&mut ir, ValueType::Double, Location::Stack(-8));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetField {
                field: field(1, FieldKind::Double),
                dst: d,
                object: Operand::Var(o),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let frame = layout(2);
        let err = super::super::CodeGenerator::new(&ir, &NullMeta, &TargetConfig::default(), &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert!(err.is_decline());

        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::PutField {
                field: field(2, FieldKind::Long),
                object: Operand::Var(o),
                value: Operand::int(0),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let frame = layout(0);
        let err = super::super::CodeGenerator::new(&ir, &NullMeta, &TargetConfig::default(), &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[test]
    fn test_static_slots_address_the_table_directly() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetStatic {
                field: field(3, FieldKind::Int),
                dst: d,
            },
        );
        ir.push(
            b0,
            Bci::new(3),
            QuadKind::PutStatic {
                field: field(4, FieldKind::Int),
                value: Operand::int(9),
            },
        );
        ir.push(
            b0,
            Bci::new(6),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );
        let buf = compile_with(&ir, &StaticsMeta, &TargetConfig::default(), 0);

        // Default table base 0x1000, slots 3 and 4.
        let l: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        assert!(l.contains(&"mov ecx, [0x100c]".to_string()));
        assert!(l.contains(&"mov dword [0x1010], 9".to_string()));

        let mut m = Machine::new();
        m.write_i32(0x100C, 31).unwrap();
        assert_eq!(m.call(&buf, &[]), RunOutcome::Returned { eax: 31, st0: None });
        assert_eq!(m.read_i32(0x1010).unwrap(), 9);
    }

    #[test]
    fn test_statics_behind_a_table_pointer_load_it_first() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetStatic {
                field: field(2, FieldKind::Int),
                dst: d,
            },
        );
        ir.push(
            b0,
            Bci::new(3),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );
        let target = TargetConfig {
            statics: StaticsAddressing::ViaRegister { table_cell: 0x800 },
            ..TargetConfig::default()
        };
        let buf = compile_with(&ir, &StaticsMeta, &target, 0);

        let l: Vec<String> = buf.insns().map(|i| i.to_string()).collect();
        assert!(l.contains(&"mov eax, [0x800]".to_string()));
        assert!(l.contains(&"mov ecx, [eax+8]".to_string()));

        let mut m = Machine::new();
        m.write_i32(0x800, 0x7000).unwrap();
        m.write_i32(0x7008, 123).unwrap();
        assert_eq!(m.call(&buf, &[]), RunOutcome::Returned { eax: 123, st0: None });
    }

    #[test]
    fn test_static_instance_mismatch_is_a_class_change() {
        // getstatic resolving to an instance field.
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetStatic {
                field: field(1, FieldKind::Int),
                dst: d,
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let frame = layout(0);
        let err = super::super::CodeGenerator::new(&ir, &NullMeta, &TargetConfig::default(), &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleClassChange);

        // getfield resolving to a static slot.
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        let d = var(&mut ir, ValueType::Int, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::GetField {
                field: field(1, FieldKind::Int),
                dst: d,
                object: Operand::Var(o),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let frame = layout(0);
        let err = super::super::CodeGenerator::new(&ir, &StaticsMeta, &TargetConfig::default(), &frame)
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleClassChange);
    }

    #[test]
    fn test_new_object_calls_the_allocator() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let d = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::New {
                class: ClassRef(7),
                dst: d,
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        // NullMeta hands every class the handle 0x41.
        assert_eq!(
            body(&ir, 0),
            vec!["push 65", "call rt:new_object", "add esp, 4", "mov ecx, eax"]
        );

        let buf = compile(&ir, 0);
        let mut m = Machine::new();
        m.queue_alloc_result(0x4AA0);
        assert_eq!(
            m.call(&buf, &[]),
            RunOutcome::Returned { eax: 0x4AA0, st0: None }
        );
    }

    #[test]
    fn test_new_array_pushes_length_then_tag() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let n = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        let d = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::NewArray {
                elem: ElemKind::Int,
                dst: d,
                length: Operand::Var(n),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, 0),
            vec![
                "push esi",
                "push 10",
                "call rt:new_primitive_array",
                "add esp, 8",
                "mov ecx, eax",
            ]
        );

        let buf = compile(&ir, 0);
        let mut m = Machine::new();
        m.set_reg(Gpr::Esi, 6);
        let outcome = m.call(&buf, &[]);
        assert!(matches!(outcome, RunOutcome::Returned { .. }));
        // First argument is the element tag, then the length.
        assert_eq!(
            m.runtime_calls,
            vec![(RuntimeEntry::NewPrimitiveArray, vec![10, 6])]
        );
    }

    #[test]
    fn test_multi_array_builds_its_dimension_array_first() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let n = var(&mut ir, ValueType::Int, Location::Register(Gpr::Esi));
        let d = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ecx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::NewMultiArray {
                class: ClassRef(2),
                dst: d,
                dims: smallvec![Operand::Var(n), Operand::int(3)],
            },
        );
        ir.push(
            b0,
            Bci::new(4),
            QuadKind::Return {
                value: Some((ValueType::Reference, Operand::Var(d))),
            },
        );
        let buf = compile(&ir, 0);

        let hdr = ObjectLayout::default();
        let mut m = Machine::new();
        m.set_reg(Gpr::Esi, 4);
        m.queue_alloc_result(0x600);
        m.queue_alloc_result(0x700);
        assert_eq!(
            m.call(&buf, &[]),
            RunOutcome::Returned { eax: 0x700, st0: None }
        );
        assert_eq!(m.read_i32(0x600 + hdr.array_data_off).unwrap(), 4);
        assert_eq!(m.read_i32(0x600 + hdr.array_data_off + 4).unwrap(), 3);
        assert_eq!(
            m.runtime_calls,
            vec![
                (RuntimeEntry::NewPrimitiveArray, vec![10, 2]),
                (RuntimeEntry::NewMultiArray, vec![0x41, 0x600]),
            ]
        );
    }

    #[test]
    fn test_monitor_pair_pushes_the_object() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let o = var(&mut ir, ValueType::Reference, Location::Register(Gpr::Ebx));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::MonitorEnter {
                object: Operand::Var(o),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::MonitorExit {
                object: Operand::Var(o),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        assert_eq!(
            body(&ir, 0),
            vec![
                "push ebx",
                "call rt:monitor_enter",
                "add esp, 4",
                "push ebx",
                "call rt:monitor_exit",
                "add esp, 4",
            ]
        );
    }
}
