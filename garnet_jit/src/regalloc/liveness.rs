//! Live-range computation over the finished quad stream.
//!
//! Runs after the pipeline, so quad addresses are contiguous in block
//! layout order. Classic backward dataflow produces per-block live-in
//! and live-out sets; each variable is then summarized as one interval
//! from its first definition or entry to its last use, widened across
//! blocks it is live through. One interval per variable overstates
//! lifetimes around loops but keeps the allocator simple and safe.
//!
//! The analysis also records every address where machine state escapes
//! to the runtime, which the allocator uses to steer call-crossing
//! values into callee-saved registers.

use crate::cfg::Cfg;
use crate::ir::{MethodIr, VarId};

// =============================================================================
// Variable bitsets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarSet {
    words: Vec<u64>,
}

impl VarSet {
    fn new(n_vars: usize) -> Self {
        Self {
            words: vec![0; n_vars.div_ceil(64)],
        }
    }

    fn insert(&mut self, v: VarId) {
        self.words[v.index() / 64] |= 1 << (v.index() % 64);
    }

    fn remove(&mut self, v: VarId) {
        self.words[v.index() / 64] &= !(1 << (v.index() % 64));
    }

    fn contains(&self, v: VarId) -> bool {
        self.words[v.index() / 64] & (1 << (v.index() % 64)) != 0
    }

    /// Union `other` in, reporting whether anything was added.
    fn union_with(&mut self, other: &VarSet) -> bool {
        let mut changed = false;
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            let before = *w;
            *w |= o;
            changed |= *w != before;
        }
        changed
    }

    fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..64)
                .filter(move |bit| w & (1 << bit) != 0)
                .map(move |bit| VarId::new((wi * 64 + bit) as u32))
        })
    }
}

// =============================================================================
// Ranges
// =============================================================================

/// Closed interval of quad addresses over which a variable is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRange {
    pub var: VarId,
    pub start: u32,
    pub end: u32,
}

impl LiveRange {
    /// Whether the range is live across any of the given positions. A
    /// range starting or ending exactly at a call does not cross it: a
    /// result defined by the call materializes after it returns, and an
    /// argument is consumed before control leaves.
    #[must_use]
    pub fn crosses_any(&self, positions: &[u32]) -> bool {
        positions.iter().any(|&p| self.start < p && p < self.end)
    }
}

/// Liveness summary for one method.
#[derive(Debug)]
pub struct Liveness {
    ranges: Vec<LiveRange>,
    call_positions: Vec<u32>,
}

impl Liveness {
    /// Ranges sorted by ascending start address.
    #[must_use]
    pub fn ranges(&self) -> &[LiveRange] {
        &self.ranges
    }

    /// Addresses of quads where control can escape to the runtime,
    /// ascending.
    #[must_use]
    pub fn call_positions(&self) -> &[u32] {
        &self.call_positions
    }

    #[must_use]
    pub fn range_of(&self, v: VarId) -> Option<&LiveRange> {
        self.ranges.iter().find(|r| r.var == v)
    }
}

/// Compute per-variable live ranges and runtime-escape positions.
#[must_use]
pub fn compute(ir: &MethodIr, cfg: &Cfg) -> Liveness {
    let n_vars = ir.pool.len();
    let n_blocks = ir.block_count();

    // Per-block upward-exposed uses and definitions.
    let mut upward = vec![VarSet::new(n_vars); n_blocks];
    let mut def = vec![VarSet::new(n_vars); n_blocks];
    for b in ir.block_ids() {
        let bi = b.index();
        for quad in ir.block(b).live_quads() {
            quad.for_each_use(|v| {
                if !def[bi].contains(v) {
                    upward[bi].insert(v);
                }
            });
            if let Some(d) = quad.defined() {
                def[bi].insert(d);
            }
        }
    }

    // Backward fixpoint: out[b] = U in[succ], in[b] = upward[b] | (out[b] - def[b]).
    let mut live_in = vec![VarSet::new(n_vars); n_blocks];
    let mut live_out = vec![VarSet::new(n_vars); n_blocks];
    let mut changed = true;
    while changed {
        changed = false;
        for &b in cfg.rpo().iter().rev() {
            let bi = b.index();
            let mut out = live_out[bi].clone();
            for &s in cfg.succs(b) {
                out.union_with(&live_in[s.index()]);
            }
            let mut inn = out.clone();
            for v in def[bi].iter() {
                inn.remove(v);
            }
            inn.union_with(&upward[bi]);

            changed |= live_out[bi].union_with(&out);
            changed |= live_in[bi].union_with(&inn);
        }
    }

    // Collapse to one interval per variable over the layout-order
    // address line, and collect runtime-escape positions on the way.
    let mut starts: Vec<Option<u32>> = vec![None; n_vars];
    let mut ends: Vec<u32> = vec![0; n_vars];
    let mut call_positions = Vec::new();

    let mut touch = |starts: &mut Vec<Option<u32>>, ends: &mut Vec<u32>, v: VarId, at: u32| {
        let s = &mut starts[v.index()];
        match s {
            Some(cur) => *cur = (*cur).min(at),
            None => *s = Some(at),
        }
        ends[v.index()] = ends[v.index()].max(at);
    };

    for b in ir.block_ids() {
        let bi = b.index();
        let mut block_span: Option<(u32, u32)> = None;
        for quad in ir.block(b).live_quads() {
            let at = quad.addr;
            block_span = Some(match block_span {
                Some((lo, hi)) => (lo.min(at), hi.max(at)),
                None => (at, at),
            });
            quad.for_each_use(|v| touch(&mut starts, &mut ends, v, at));
            if let Some(d) = quad.defined() {
                touch(&mut starts, &mut ends, d, at);
            }
            if quad.is_call_point() {
                call_positions.push(at);
            }
        }
        // Widen through-block liveness to the block's extremes.
        if let Some((lo, hi)) = block_span {
            for v in live_in[bi].iter() {
                touch(&mut starts, &mut ends, v, lo);
            }
            for v in live_out[bi].iter() {
                touch(&mut starts, &mut ends, v, hi);
            }
        }
    }

    // Parameters are homed by the prologue, so their interval begins at
    // method entry no matter where the first use sits.
    let mut ranges = Vec::new();
    for (v, var) in ir.pool.iter() {
        if var.retired {
            continue;
        }
        if let Some(mut start) = starts[v.index()] {
            if var.is_param() {
                start = 0;
            }
            ranges.push(LiveRange {
                var: v,
                start,
                end: ends[v.index()],
            });
        }
    }
    ranges.sort_by_key(|r| (r.start, r.var.index()));
    call_positions.sort_unstable();

    Liveness {
        ranges,
        call_positions,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Bci, BinOp, BranchCond, MethodRef, Operand, QuadKind, VarOrigin};
    use crate::ir::CallKind;
    use garnet_core::ValueType;
    use smallvec::smallvec;

    fn finish(ir: &mut MethodIr) -> Cfg {
        let layout: Vec<_> = ir.block_ids().collect();
        ir.fixup_addresses(&layout);
        Cfg::build(ir).unwrap()
    }

    #[test]
    fn test_straight_line_range() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let d = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: a,
                src: Operand::int(1),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: d,
                lhs: Operand::Var(a),
                rhs: Operand::int(2),
            },
        );
        ir.push(
            b0,
            Bci::new(3),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(d))),
            },
        );
        let cfg = finish(&mut ir);
        let live = compute(&ir, &cfg);

        assert_eq!(live.range_of(a), Some(&LiveRange { var: a, start: 0, end: 1 }));
        assert_eq!(live.range_of(d), Some(&LiveRange { var: d, start: 1, end: 2 }));
        assert!(live.call_positions().is_empty());
    }

    #[test]
    fn test_param_range_starts_at_entry() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let p = ir.pool.alloc_param(ValueType::Int, VarOrigin::Local(0), 0);
        let d = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: d,
                src: Operand::int(9),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: d,
                lhs: Operand::Var(d),
                rhs: Operand::Var(p),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });
        let cfg = finish(&mut ir);
        let live = compute(&ir, &cfg);

        assert_eq!(live.range_of(p).unwrap().start, 0);
        assert_eq!(live.range_of(p).unwrap().end, 1);
    }

    #[test]
    fn test_widens_across_branch_arms() {
        // v defined in b0, used only in b2; live through b1.
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(4));
        let b2 = ir.new_block(Bci::new(8));
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let w = ir.pool.alloc(ValueType::Int, VarOrigin::Local(1));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(3),
            },
        );
        ir.push(
            b1,
            Bci::new(4),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: w,
                src: Operand::int(4),
            },
        );
        ir.push(
            b2,
            Bci::new(8),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(v))),
            },
        );
        let cfg = finish(&mut ir);
        let live = compute(&ir, &cfg);

        let r = live.range_of(v).unwrap();
        assert_eq!(r.start, 0);
        assert_eq!(r.end, 2);
        // w is born and dies inside b1.
        assert_eq!(live.range_of(w), Some(&LiveRange { var: w, start: 1, end: 1 }));
    }

    #[test]
    fn test_call_and_backward_branch_positions() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(4));
        let r = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Call {
                kind: CallKind::Static,
                method: MethodRef(7),
                dst: Some(r),
                args: smallvec![],
            },
        );
        ir.push(
            b1,
            Bci::new(4),
            QuadKind::Branch {
                cond: BranchCond::Ne,
                lhs: Operand::Var(r),
                rhs: Operand::int(0),
                target: Bci::new(0),
            },
        );
        ir.push(b1, Bci::new(8), QuadKind::Return { value: None });
        let cfg = finish(&mut ir);
        let live = compute(&ir, &cfg);

        assert_eq!(live.call_positions(), &[0, 1]);
        // r is defined at the call and used at the branch; it does not
        // cross its own defining call.
        let range = live.range_of(r).unwrap();
        assert!(!range.crosses_any(&[0]));
    }

    #[test]
    fn test_loop_carried_value_crosses_backward_branch() {
        // b0: i = 0; b1: i = i + 1; if (i < 10) goto b1; b2: return i
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(2));
        let b2 = ir.new_block(Bci::new(10));
        let i = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
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
            b1,
            Bci::new(2),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: i,
                lhs: Operand::Var(i),
                rhs: Operand::int(1),
            },
        );
        ir.push(
            b1,
            Bci::new(4),
            QuadKind::Branch {
                cond: BranchCond::Lt,
                lhs: Operand::Var(i),
                rhs: Operand::int(10),
                target: Bci::new(2),
            },
        );
        ir.push(
            b2,
            Bci::new(10),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(i))),
            },
        );
        let cfg = finish(&mut ir);
        let live = compute(&ir, &cfg);

        assert_eq!(live.call_positions(), &[2]);
        let range = live.range_of(i).unwrap();
        assert_eq!((range.start, range.end), (0, 3));
        assert!(range.crosses_any(live.call_positions()));
    }
}
