//! Instruction-level interpreter for the abstract target.
//!
//! Executes a [`CodeBuffer`] against a small flat memory and the eight
//! general-purpose registers, modeling exactly the architectural behavior
//! the lowerings rely on: ALU flag setting, the x87 stack with its
//! condition bits and the `fnstsw`/`sahf` transfer, control-word rounding
//! for float-to-int stores, and the stack discipline of push/pop/call/ret.
//!
//! Runtime entry points are intercepted rather than executed: yieldpoints
//! count and continue, allocation entries return queued results, and the
//! non-returning entries stop the run with the argument words they were
//! passed. Calls through memory (compiled-method dispatch) stop the run;
//! tests assert on the emitted sequence for those.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;

use crate::ir::LabelId;
use crate::runtime::RuntimeEntry;

use super::emitter::{CodeBuffer, Entry};
use super::insn::{
    AluOp, CallTarget, Cond, Ext, ExtSrc, FpOp, FpWidth, Insn, MemRef, Opnd, ShiftCount, ShiftOp,
    Width,
};
use super::registers::Gpr;

/// Memory size. Addresses are interpreted as offsets into this arena.
const MEM_BYTES: usize = 1 << 16;

/// Initial stack pointer, growing down inside the arena.
const STACK_TOP: i32 = 0xF000;

/// Value used as the return address of the simulated outer caller.
const RETURN_SENTINEL: i32 = 0x7EAD_BEEF_u32 as i32;

/// Default allocation result when none is queued.
const DEFAULT_ALLOC: i32 = 0x5000;

// =============================================================================
// Outcome
// =============================================================================

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Execution walked past the last entry.
    Completed,
    /// A `ret` popped the sentinel return address.
    Returned { eax: i32, st0: Option<f64> },
    /// A non-returning runtime entry was reached, with the argument words
    /// that were on the stack for it.
    Trapped {
        entry: RuntimeEntry,
        args: Vec<i32>,
    },
    /// A call through a memory operand was reached.
    HaltedAtCall { target: MemRef },
    /// The step limit ran out.
    StepLimit,
    /// Architecturally invalid execution (bad address, unbound label,
    /// divide error).
    Fault { reason: String },
}

// =============================================================================
// Flags
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    cf: bool,
    zf: bool,
    sf: bool,
    of: bool,
    pf: bool,
}

fn parity(v: i32) -> bool {
    (v as u8).count_ones() % 2 == 0
}

// =============================================================================
// Machine
// =============================================================================

/// One simulated machine instance.
#[derive(Debug)]
pub struct Machine {
    regs: [i32; 8],
    mem: Vec<u8>,
    flags: Flags,
    fpu: Vec<f64>,
    fpu_c0: bool,
    fpu_c2: bool,
    fpu_c3: bool,
    control_word: u16,
    /// Yieldpoint calls seen during the run.
    pub yield_count: u32,
    /// Every intercepted runtime call, with its argument words.
    pub runtime_calls: Vec<(RuntimeEntry, Vec<i32>)>,
    alloc_results: VecDeque<i32>,
    step_limit: usize,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        let mut m = Self {
            regs: [0; 8],
            mem: vec![0; MEM_BYTES],
            flags: Flags::default(),
            fpu: Vec::new(),
            fpu_c0: false,
            fpu_c2: false,
            fpu_c3: false,
            control_word: 0x037F,
            yield_count: 0,
            runtime_calls: Vec::new(),
            alloc_results: VecDeque::new(),
            step_limit: 100_000,
        };
        m.regs[Gpr::Esp.encoding() as usize] = STACK_TOP;
        m
    }

    #[inline]
    #[must_use]
    pub fn reg(&self, r: Gpr) -> i32 {
        self.regs[r.encoding() as usize]
    }

    #[inline]
    pub fn set_reg(&mut self, r: Gpr, v: i32) {
        self.regs[r.encoding() as usize] = v;
    }

    /// Depth of the x87 stack.
    #[must_use]
    pub fn fpu_depth(&self) -> usize {
        self.fpu.len()
    }

    /// Queue the value the next allocation entry returns.
    pub fn queue_alloc_result(&mut self, addr: i32) {
        self.alloc_results.push_back(addr);
    }

    pub fn set_step_limit(&mut self, limit: usize) {
        self.step_limit = limit;
    }

    // -------------------------------------------------------------------------
    // Memory access
    // -------------------------------------------------------------------------

    fn check(&self, addr: i32, len: usize) -> Result<usize, String> {
        let a = addr as usize;
        if addr < 0 || a + len > self.mem.len() {
            return Err(format!("address {addr:#x} out of range"));
        }
        Ok(a)
    }

    pub fn read_i32(&self, addr: i32) -> Result<i32, String> {
        let a = self.check(addr, 4)?;
        let bytes: [u8; 4] = self.mem[a..a + 4].try_into().map_err(|_| "short read")?;
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn write_i32(&mut self, addr: i32, v: i32) -> Result<(), String> {
        let a = self.check(addr, 4)?;
        self.mem[a..a + 4].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn read_u16(&self, addr: i32) -> Result<u16, String> {
        let a = self.check(addr, 2)?;
        Ok(u16::from_le_bytes([self.mem[a], self.mem[a + 1]]))
    }

    pub fn write_u16(&mut self, addr: i32, v: u16) -> Result<(), String> {
        let a = self.check(addr, 2)?;
        self.mem[a..a + 2].copy_from_slice(&v.to_le_bytes());
        Ok(())
    }

    pub fn read_u8(&self, addr: i32) -> Result<u8, String> {
        let a = self.check(addr, 1)?;
        Ok(self.mem[a])
    }

    pub fn write_u8(&mut self, addr: i32, v: u8) -> Result<(), String> {
        let a = self.check(addr, 1)?;
        self.mem[a] = v;
        Ok(())
    }

    pub fn read_f32(&self, addr: i32) -> Result<f32, String> {
        Ok(f32::from_bits(self.read_i32(addr)? as u32))
    }

    pub fn write_f32(&mut self, addr: i32, v: f32) -> Result<(), String> {
        self.write_i32(addr, v.to_bits() as i32)
    }

    pub fn read_f64(&self, addr: i32) -> Result<f64, String> {
        let lo = self.read_i32(addr)? as u32 as u64;
        let hi = self.read_i32(addr + 4)? as u32 as u64;
        Ok(f64::from_bits(hi << 32 | lo))
    }

    pub fn write_f64(&mut self, addr: i32, v: f64) -> Result<(), String> {
        let bits = v.to_bits();
        self.write_i32(addr, bits as u32 as i32)?;
        self.write_i32(addr + 4, (bits >> 32) as u32 as i32)
    }

    fn effective(&self, m: MemRef) -> i32 {
        let mut addr = m.disp;
        if let Some(base) = m.base {
            addr = addr.wrapping_add(self.reg(base));
        }
        if let Some((index, scale)) = m.index {
            addr = addr.wrapping_add(self.reg(index).wrapping_mul(scale.factor() as i32));
        }
        addr
    }

    fn read_opnd(&self, o: Opnd) -> Result<i32, String> {
        match o {
            Opnd::Reg(r) => Ok(self.reg(r)),
            Opnd::Imm(v) => Ok(v),
            Opnd::Mem(m) => self.read_i32(self.effective(m)),
        }
    }

    fn write_opnd(&mut self, o: Opnd, v: i32) -> Result<(), String> {
        match o {
            Opnd::Reg(r) => {
                self.set_reg(r, v);
                Ok(())
            }
            Opnd::Mem(m) => self.write_i32(self.effective(m), v),
            Opnd::Imm(_) => Err("write to immediate".to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Stack
    // -------------------------------------------------------------------------

    fn push(&mut self, v: i32) -> Result<(), String> {
        let esp = self.reg(Gpr::Esp) - 4;
        self.set_reg(Gpr::Esp, esp);
        self.write_i32(esp, v)
    }

    fn pop(&mut self) -> Result<i32, String> {
        let esp = self.reg(Gpr::Esp);
        let v = self.read_i32(esp)?;
        self.set_reg(Gpr::Esp, esp + 4);
        Ok(v)
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    fn set_logic_flags(&mut self, r: i32) {
        self.flags = Flags {
            cf: false,
            of: false,
            zf: r == 0,
            sf: r < 0,
            pf: parity(r),
        };
    }

    fn set_add_flags(&mut self, a: i32, b: i32, r: i32) {
        self.flags = Flags {
            cf: (a as u32).checked_add(b as u32).is_none(),
            of: (a >= 0) == (b >= 0) && (r >= 0) != (a >= 0),
            zf: r == 0,
            sf: r < 0,
            pf: parity(r),
        };
    }

    fn set_sub_flags(&mut self, a: i32, b: i32, r: i32) {
        self.flags = Flags {
            cf: (a as u32) < (b as u32),
            of: (a >= 0) != (b >= 0) && (r >= 0) != (a >= 0),
            zf: r == 0,
            sf: r < 0,
            pf: parity(r),
        };
    }

    fn cond_holds(&self, c: Cond) -> bool {
        let f = self.flags;
        match c {
            Cond::E => f.zf,
            Cond::Ne => !f.zf,
            Cond::L => f.sf != f.of,
            Cond::Ge => f.sf == f.of,
            Cond::G => !f.zf && f.sf == f.of,
            Cond::Le => f.zf || f.sf != f.of,
            Cond::B => f.cf,
            Cond::Ae => !f.cf,
            Cond::A => !f.cf && !f.zf,
            Cond::Be => f.cf || f.zf,
            Cond::P => f.pf,
        }
    }

    // -------------------------------------------------------------------------
    // x87
    // -------------------------------------------------------------------------

    fn fpu_push(&mut self, v: f64) {
        self.fpu.push(v);
    }

    fn fpu_pop(&mut self) -> Result<f64, String> {
        self.fpu.pop().ok_or_else(|| "x87 stack underflow".to_string())
    }

    fn fpu_status_word(&self) -> u16 {
        let mut sw = 0u16;
        if self.fpu_c0 {
            sw |= 1 << 8;
        }
        if self.fpu_c2 {
            sw |= 1 << 10;
        }
        if self.fpu_c3 {
            sw |= 1 << 14;
        }
        sw
    }

    fn fistp_round(&self, v: f64) -> i32 {
        // Rounding-control field of the control word; 0b11 truncates.
        let rc = (self.control_word >> 10) & 0b11;
        let rounded = if rc == 0b11 {
            v.trunc()
        } else {
            // Round half to even, the x87 default.
            let floor = v.floor();
            let diff = v - floor;
            if diff > 0.5 {
                floor + 1.0
            } else if diff < 0.5 {
                floor
            } else if (floor as i64) % 2 == 0 {
                floor
            } else {
                floor + 1.0
            }
        };
        if rounded.is_nan() || rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
            // Out-of-range stores produce the integer indefinite value.
            i32::MIN
        } else {
            rounded as i32
        }
    }

    // -------------------------------------------------------------------------
    // Execution
    // -------------------------------------------------------------------------

    /// Push call arguments and the sentinel return address, then run the
    /// buffer from its first entry. `args` are in declaration order, so
    /// the first argument ends up closest to the return address.
    pub fn call(&mut self, buf: &CodeBuffer, args: &[i32]) -> RunOutcome {
        for &a in args.iter().rev() {
            if let Err(reason) = self.push(a) {
                return RunOutcome::Fault { reason };
            }
        }
        if let Err(reason) = self.push(RETURN_SENTINEL) {
            return RunOutcome::Fault { reason };
        }
        self.run(buf)
    }

    /// Run the buffer from its first entry with the stack as-is.
    pub fn run(&mut self, buf: &CodeBuffer) -> RunOutcome {
        let entries = buf.entries();
        let mut labels: FxHashMap<LabelId, usize> = FxHashMap::default();
        for (i, entry) in entries.iter().enumerate() {
            if let Entry::Label(l) = entry {
                labels.insert(*l, i);
            }
        }

        let mut pc = 0usize;
        let mut steps = 0usize;
        while pc < entries.len() {
            steps += 1;
            if steps > self.step_limit {
                return RunOutcome::StepLimit;
            }
            let insn = match entries[pc] {
                Entry::Label(_) => {
                    pc += 1;
                    continue;
                }
                Entry::Insn(i) => i,
            };
            pc += 1;
            match self.step(insn, &labels, &mut pc) {
                Ok(None) => {}
                Ok(Some(outcome)) => return outcome,
                Err(reason) => return RunOutcome::Fault { reason },
            }
        }
        RunOutcome::Completed
    }

    fn step(
        &mut self,
        insn: Insn,
        labels: &FxHashMap<LabelId, usize>,
        pc: &mut usize,
    ) -> Result<Option<RunOutcome>, String> {
        match insn {
            Insn::Mov { dst, src } => {
                if dst.as_mem().is_some() && src.as_mem().is_some() {
                    return Err("mov memory to memory".to_string());
                }
                let v = self.read_opnd(src)?;
                self.write_opnd(dst, v)?;
            }
            Insn::MovExt { ext, width, dst, src } => {
                let raw: u32 = match src {
                    ExtSrc::Reg(r) => self.reg(r) as u32,
                    ExtSrc::Mem(m) => {
                        let addr = self.effective(m);
                        match width {
                            Width::Byte => u32::from(self.read_u8(addr)?),
                            Width::Word => u32::from(self.read_u16(addr)?),
                            Width::Dword => self.read_i32(addr)? as u32,
                        }
                    }
                };
                let v = match (width, ext) {
                    (Width::Byte, Ext::Zero) => i32::from(raw as u8),
                    (Width::Byte, Ext::Sign) => i32::from(raw as u8 as i8),
                    (Width::Word, Ext::Zero) => i32::from(raw as u16),
                    (Width::Word, Ext::Sign) => i32::from(raw as u16 as i16),
                    (Width::Dword, _) => raw as i32,
                };
                self.set_reg(dst, v);
            }
            Insn::Store { width, dst, src } => {
                let addr = self.effective(dst);
                let v = self.reg(src);
                match width {
                    Width::Byte => self.write_u8(addr, v as u8)?,
                    Width::Word => self.write_u16(addr, v as u16)?,
                    Width::Dword => self.write_i32(addr, v)?,
                }
            }
            Insn::StoreImm { width, dst, imm } => {
                let addr = self.effective(dst);
                match width {
                    Width::Byte => self.write_u8(addr, imm as u8)?,
                    Width::Word => self.write_u16(addr, imm as u16)?,
                    Width::Dword => self.write_i32(addr, imm)?,
                }
            }
            Insn::Lea { dst, src } => {
                let addr = self.effective(src);
                self.set_reg(dst, addr);
            }
            Insn::Push { src } => {
                let v = self.read_opnd(src)?;
                self.push(v)?;
            }
            Insn::Pop { dst } => {
                let v = self.pop()?;
                self.write_opnd(dst, v)?;
            }
            Insn::Alu { op, dst, src } => {
                let a = self.read_opnd(dst)?;
                let b = self.read_opnd(src)?;
                match op {
                    AluOp::Add => {
                        let r = a.wrapping_add(b);
                        self.set_add_flags(a, b, r);
                        self.write_opnd(dst, r)?;
                    }
                    AluOp::Sub => {
                        let r = a.wrapping_sub(b);
                        self.set_sub_flags(a, b, r);
                        self.write_opnd(dst, r)?;
                    }
                    AluOp::Cmp => {
                        let r = a.wrapping_sub(b);
                        self.set_sub_flags(a, b, r);
                    }
                    AluOp::And => {
                        let r = a & b;
                        self.set_logic_flags(r);
                        self.write_opnd(dst, r)?;
                    }
                    AluOp::Or => {
                        let r = a | b;
                        self.set_logic_flags(r);
                        self.write_opnd(dst, r)?;
                    }
                    AluOp::Xor => {
                        let r = a ^ b;
                        self.set_logic_flags(r);
                        self.write_opnd(dst, r)?;
                    }
                }
            }
            Insn::Imul { dst, src } => {
                let a = self.reg(dst);
                let b = self.read_opnd(src)?;
                let wide = i64::from(a) * i64::from(b);
                let r = a.wrapping_mul(b);
                self.flags.cf = wide != i64::from(r);
                self.flags.of = self.flags.cf;
                self.set_reg(dst, r);
            }
            Insn::Idiv { src } => {
                let divisor = self.read_i32(self.effective(src))?;
                let dividend =
                    (i64::from(self.reg(Gpr::Edx)) << 32) | i64::from(self.reg(Gpr::Eax) as u32);
                if divisor == 0 {
                    return Err("divide error".to_string());
                }
                let quot = dividend / i64::from(divisor);
                if quot > i64::from(i32::MAX) || quot < i64::from(i32::MIN) {
                    return Err("divide overflow".to_string());
                }
                let rem = dividend % i64::from(divisor);
                self.set_reg(Gpr::Eax, quot as i32);
                self.set_reg(Gpr::Edx, rem as i32);
            }
            Insn::Cdq => {
                let sign = if self.reg(Gpr::Eax) < 0 { -1 } else { 0 };
                self.set_reg(Gpr::Edx, sign);
            }
            Insn::Neg { dst } => {
                let a = self.read_opnd(dst)?;
                let r = 0i32.wrapping_sub(a);
                self.set_sub_flags(0, a, r);
                self.write_opnd(dst, r)?;
            }
            Insn::Inc { dst } => {
                let a = self.read_opnd(dst)?;
                let r = a.wrapping_add(1);
                let cf = self.flags.cf;
                self.set_add_flags(a, 1, r);
                self.flags.cf = cf;
                self.write_opnd(dst, r)?;
            }
            Insn::Dec { dst } => {
                let a = self.read_opnd(dst)?;
                let r = a.wrapping_sub(1);
                let cf = self.flags.cf;
                self.set_sub_flags(a, 1, r);
                self.flags.cf = cf;
                self.write_opnd(dst, r)?;
            }
            Insn::Shift { op, dst, count } => {
                let n = match count {
                    ShiftCount::Imm(k) => u32::from(k) & 31,
                    ShiftCount::Cl => (self.reg(Gpr::Ecx) as u32) & 31,
                };
                if n != 0 {
                    let a = self.read_opnd(dst)?;
                    let r = match op {
                        ShiftOp::Shl => a.wrapping_shl(n),
                        ShiftOp::Sar => a.wrapping_shr(n),
                        ShiftOp::Shr => ((a as u32).wrapping_shr(n)) as i32,
                    };
                    let last_out = match op {
                        ShiftOp::Shl => (a as u32 >> (32 - n)) & 1 == 1,
                        ShiftOp::Sar | ShiftOp::Shr => (a as u32 >> (n - 1)) & 1 == 1,
                    };
                    self.flags.cf = last_out;
                    self.flags.zf = r == 0;
                    self.flags.sf = r < 0;
                    self.flags.pf = parity(r);
                    self.write_opnd(dst, r)?;
                }
            }
            Insn::Jmp { target } => {
                let Some(&at) = labels.get(&target) else {
                    return Err(format!("jump to unbound label {target}"));
                };
                *pc = at;
            }
            Insn::Jcc { cond, target } => {
                if self.cond_holds(cond) {
                    let Some(&at) = labels.get(&target) else {
                        return Err(format!("jump to unbound label {target}"));
                    };
                    *pc = at;
                }
            }
            Insn::Call { target } => match target {
                CallTarget::Runtime(entry) => {
                    let mut args = Vec::new();
                    let esp = self.reg(Gpr::Esp);
                    for i in 0..entry.arg_words() {
                        args.push(self.read_i32(esp + 4 * i32::from(i))?);
                    }
                    self.runtime_calls.push((entry, args.clone()));
                    if !entry.returns_normally() {
                        return Ok(Some(RunOutcome::Trapped { entry, args }));
                    }
                    if entry == RuntimeEntry::YieldPoint {
                        self.yield_count += 1;
                    }
                    if entry.returns_value() {
                        let result = self.alloc_results.pop_front().unwrap_or(DEFAULT_ALLOC);
                        self.set_reg(Gpr::Eax, result);
                    }
                }
                CallTarget::Mem(m) => {
                    return Ok(Some(RunOutcome::HaltedAtCall { target: m }));
                }
            },
            Insn::Ret { pop_bytes } => {
                let ret_addr = self.pop()?;
                let esp = self.reg(Gpr::Esp);
                self.set_reg(Gpr::Esp, esp + i32::from(pop_bytes));
                if ret_addr == RETURN_SENTINEL {
                    return Ok(Some(RunOutcome::Returned {
                        eax: self.reg(Gpr::Eax),
                        st0: self.fpu.last().copied(),
                    }));
                }
                return Err(format!("ret to unexpected address {ret_addr:#x}"));
            }
            Insn::Fld { width, src } => {
                let addr = self.effective(src);
                let v = match width {
                    FpWidth::Single => f64::from(self.read_f32(addr)?),
                    FpWidth::Double => self.read_f64(addr)?,
                };
                self.fpu_push(v);
            }
            Insn::Fstp { width, dst } => {
                let v = self.fpu_pop()?;
                let addr = self.effective(dst);
                match width {
                    FpWidth::Single => self.write_f32(addr, v as f32)?,
                    FpWidth::Double => self.write_f64(addr, v)?,
                }
            }
            Insn::FstpSt0 => {
                self.fpu_pop()?;
            }
            Insn::Fild { src } => {
                let v = self.read_i32(self.effective(src))?;
                self.fpu_push(f64::from(v));
            }
            Insn::Fistp { dst } => {
                let v = self.fpu_pop()?;
                let r = self.fistp_round(v);
                self.write_i32(self.effective(dst), r)?;
            }
            Insn::Fchs => {
                let v = self.fpu_pop()?;
                self.fpu_push(-v);
            }
            Insn::FpArith { op } => {
                let st0 = self.fpu_pop()?;
                let st1 = self.fpu_pop()?;
                let r = match op {
                    FpOp::Add => st1 + st0,
                    FpOp::Sub => st1 - st0,
                    FpOp::Mul => st1 * st0,
                    FpOp::Div => st1 / st0,
                };
                self.fpu_push(r);
            }
            Insn::Fprem => {
                let st0 = self.fpu_pop()?;
                let st1 = *self
                    .fpu
                    .last()
                    .ok_or_else(|| "x87 stack underflow".to_string())?;
                self.fpu_push(st0 % st1);
                // Full reduction in one step.
                self.fpu_c2 = false;
            }
            Insn::Fucompp => {
                let st0 = self.fpu_pop()?;
                let st1 = self.fpu_pop()?;
                if st0.is_nan() || st1.is_nan() {
                    self.fpu_c0 = true;
                    self.fpu_c2 = true;
                    self.fpu_c3 = true;
                } else {
                    self.fpu_c0 = st0 < st1;
                    self.fpu_c2 = false;
                    self.fpu_c3 = st0 == st1;
                }
            }
            Insn::FnstswAx => {
                let sw = self.fpu_status_word();
                let eax = self.reg(Gpr::Eax);
                self.set_reg(Gpr::Eax, (eax & !0xFFFF) | i32::from(sw));
            }
            Insn::Sahf => {
                let ah = (self.reg(Gpr::Eax) >> 8) as u8;
                self.flags.cf = ah & 0x01 != 0;
                self.flags.pf = ah & 0x04 != 0;
                self.flags.zf = ah & 0x40 != 0;
                self.flags.sf = ah & 0x80 != 0;
            }
            Insn::Fnstcw { dst } => {
                let addr = self.effective(dst);
                self.write_u16(addr, self.control_word)?;
            }
            Insn::Fldcw { src } => {
                let addr = self.effective(src);
                self.control_word = self.read_u16(addr)?;
            }
        }
        Ok(None)
    }
}

// =============================================================================
// Tests
// =============================================================================
