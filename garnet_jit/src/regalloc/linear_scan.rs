//! Linear-scan register allocation over single-interval live ranges.
//!
//! The allocatable pool is five general-purpose registers: ecx and edx
//! are caller-saved, ebx, esi, and edi survive runtime calls. eax is the
//! code generator's scratch register and never allocated. Ranges live
//! across a runtime-escape position are restricted to the callee-saved
//! half so nothing needs saving around calls.
//!
//! Floating-point values never get a register: the x87 stack protocol
//! keeps at most one value loaded at a time, so floats and doubles are
//! always frame-resident. 64-bit integers are not handled by this tier
//! at all and are declined here.
//!
//! When the pool is exhausted the active range with the furthest end is
//! evicted to a frame slot if it ends after the current one, keeping
//! shorter ranges in registers. Parameters assigned to the stack keep
//! their incoming argument slot instead of a new spill slot.

use smallvec::SmallVec;

use crate::backend::x86::{Gpr, GprSet};
use crate::ir::{Location, MethodIr, VarId};
use garnet_core::{JitError, JitResult, ValueType};

use super::liveness::{LiveRange, Liveness};

/// Incoming argument words start here, above the saved ebp and the
/// return address.
pub const ARG_BASE_DISP: i32 = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct AllocatorStats {
    pub ranges: usize,
    pub registers_assigned: usize,
    pub stack_assigned: usize,
    pub evictions: usize,
    pub call_crossing: usize,
}

/// Allocation summary the frame builder consumes.
#[derive(Debug)]
pub struct Allocation {
    /// Callee-saved registers handed out at least once.
    pub used_callee_saved: GprSet,
    /// Frame words consumed by spilled and float values.
    pub spill_words: usize,
    pub stats: AllocatorStats,
}

#[derive(Debug, Clone, Copy)]
struct Active {
    range: LiveRange,
    reg: Gpr,
}

/// Assign a [`Location`] to every live-range variable, writing the
/// results into the variable pool.
pub fn allocate(ir: &mut MethodIr, liveness: &Liveness) -> JitResult<Allocation> {
    let calls = liveness.call_positions();

    let mut free = GprSet::ALLOCATABLE;
    // Small fixed pool, so the active list stays tiny.
    let mut active: SmallVec<[Active; 8]> = SmallVec::new();
    let mut next_spill_word = 0usize;
    let mut used_callee_saved = GprSet::EMPTY;
    let mut stats = AllocatorStats {
        ranges: liveness.ranges().len(),
        ..AllocatorStats::default()
    };

    for &range in liveness.ranges() {
        let var = range.var;
        let ty = ir.pool.ty(var);

        if ty == ValueType::Long {
            return Err(JitError::not_supported("64-bit integer locals"));
        }

        // Expire ranges that ended before this one starts.
        let mut i = 0;
        while i < active.len() {
            if active[i].range.end < range.start {
                free.insert(active[i].reg);
                active.swap_remove(i);
            } else {
                i += 1;
            }
        }

        if ty.is_float() {
            assign_stack(ir, var, ty, &mut next_spill_word);
            stats.stack_assigned += 1;
            continue;
        }

        let crosses = range.crosses_any(calls);
        if crosses {
            stats.call_crossing += 1;
        }
        let allowed = if crosses {
            GprSet::CALLEE_SAVED
        } else {
            GprSet::ALLOCATABLE
        };

        if let Some(reg) = pick_register(free, crosses) {
            ir.pool.set_location(var, Location::Register(reg));
            if reg.is_callee_saved() {
                used_callee_saved.insert(reg);
            }
            free.remove(reg);
            active.push(Active { range, reg });
            stats.registers_assigned += 1;
            continue;
        }

        // Pool exhausted for this class: evict the compatible active
        // range that ends furthest away, if it outlives the current one.
        let victim = active
            .iter()
            .enumerate()
            .filter(|(_, a)| allowed.contains(a.reg))
            .max_by_key(|(_, a)| a.range.end)
            .map(|(i, _)| i);
        match victim {
            Some(vi) if active[vi].range.end > range.end => {
                let evicted = active[vi];
                let evicted_ty = ir.pool.ty(evicted.range.var);
                assign_stack(ir, evicted.range.var, evicted_ty, &mut next_spill_word);
                ir.pool.set_location(var, Location::Register(evicted.reg));
                active[vi] = Active {
                    range,
                    reg: evicted.reg,
                };
                stats.evictions += 1;
                stats.registers_assigned += 1;
                stats.stack_assigned += 1;
            }
            _ => {
                assign_stack(ir, var, ty, &mut next_spill_word);
                stats.stack_assigned += 1;
            }
        }
    }

    Ok(Allocation {
        used_callee_saved,
        spill_words: next_spill_word,
        stats,
    })
}

/// Prefer caller-saved registers for short ranges so the callee-saved
/// half stays free for call-crossing ones.
fn pick_register(free: GprSet, must_survive_calls: bool) -> Option<Gpr> {
    if must_survive_calls {
        return free
            .iter()
            .find(|r| GprSet::CALLEE_SAVED.contains(*r));
    }
    free.iter()
        .find(|r| GprSet::CALLER_SAVED.contains(*r))
        .or_else(|| free.iter().next())
}

/// Stack assignment: parameters reuse their incoming argument slot,
/// everything else gets a fresh frame word below ebp. Doubles take two
/// words with the location naming the low one.
fn assign_stack(ir: &mut MethodIr, var: VarId, ty: ValueType, next_word: &mut usize) {
    let disp = match ir.pool.var(var).param_index {
        Some(word) => ARG_BASE_DISP + 4 * i32::from(word),
        None => {
            *next_word += ty.word_count() as usize;
            -4 * (*next_word as i32)
        }
    };
    ir.pool.set_location(var, Location::Stack(disp));
}

// =============================================================================
// Tests
// =============================================================================
