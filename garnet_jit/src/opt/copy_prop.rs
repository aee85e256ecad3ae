//! Copy and constant propagation.
//!
//! Collects `Assign` quads whose destination has a single definition and
//! forwards the source into every use, resolving copy-of-copy chains up
//! front. Constant sources propagate the same way, which feeds the
//! folding pass on the next pipeline iteration. The assigns themselves
//! are left in place for dead-code elimination to reap.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::cfg::Cfg;
use crate::ir::{MethodIr, Operand, QuadKind, VarId};

use super::defuse::DefUse;
use super::QuadPass;

/// Follow a copy chain to its final operand. Stops on the last stable
/// variable if the chain loops back on itself.
fn resolve_chain(copies: &FxHashMap<VarId, Operand>, start: VarId) -> Operand {
    let mut cur = start;
    let mut seen: SmallVec<[VarId; 8]> = SmallVec::new();
    seen.push(start);
    loop {
        match copies.get(&cur) {
            Some(Operand::Var(next)) => {
                if seen.contains(next) {
                    return Operand::Var(cur);
                }
                seen.push(*next);
                cur = *next;
            }
            Some(c @ Operand::Const(_)) => return c.clone(),
            None => return Operand::Var(cur),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CopyPropStats {
    pub copies_found: usize,
    pub uses_rewritten: usize,
}

#[derive(Debug, Default)]
pub struct CopyProp {
    pub stats: CopyPropStats,
}

impl CopyProp {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuadPass for CopyProp {
    fn name(&self) -> &'static str {
        "copy-prop"
    }

    fn run(&mut self, ir: &mut MethodIr, cfg: &Cfg) -> usize {
        let defuse = DefUse::build(ir, cfg);

        let mut copies: FxHashMap<VarId, Operand> = FxHashMap::default();
        for &b in cfg.rpo() {
            for quad in &ir.block(b).quads {
                if quad.dead {
                    continue;
                }
                if let QuadKind::Assign { dst, src, .. } = &quad.kind {
                    if defuse.single_def(*dst).is_none() {
                        continue;
                    }
                    if matches!(src, Operand::Var(s) if s == dst) {
                        continue;
                    }
                    copies.insert(*dst, src.clone());
                }
            }
        }
        if copies.is_empty() {
            return 0;
        }
        self.stats.copies_found += copies.len();

        let mut rewritten = 0;
        for &b in cfg.rpo() {
            for quad in &mut ir.block_mut(b).quads {
                if quad.dead {
                    continue;
                }
                quad.for_each_operand_mut(|op| {
                    if let Operand::Var(v) = op {
                        if copies.contains_key(v) {
                            let replacement = resolve_chain(&copies, *v);
                            if replacement != Operand::Var(*v) {
                                *op = replacement;
                                rewritten += 1;
                            }
                        }
                    }
                });
            }
        }
        self.stats.uses_rewritten += rewritten;
        rewritten
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Bci, BinOp, QuadKind, VarOrigin};
    use garnet_core::ValueType;

    fn run_pass(ir: &mut MethodIr) -> usize {
        let cfg = Cfg::build(ir).unwrap();
        CopyProp::new().run(ir, &cfg)
    }

    #[test]
    fn test_forwards_through_copy_chain() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let b = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        let c = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(1));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: b,
                src: Operand::Var(a),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: c,
                src: Operand::Var(b),
            },
        );
        ir.push(
            b0,
            Bci::new(2),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(c))),
            },
        );

        assert!(run_pass(&mut ir) > 0);
        match &ir.block(b0).quads[2].kind {
            QuadKind::Return { value: Some((_, v)) } => assert_eq!(*v, Operand::Var(a)),
            other => panic!("unexpected return {other:?}"),
        }
    }

    #[test]
    fn test_propagates_constants_into_operands() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        let x = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let d = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(1));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: a,
                src: Operand::int(5),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: d,
                lhs: Operand::Var(x),
                rhs: Operand::Var(a),
            },
        );
        ir.push(b0, Bci::new(3), QuadKind::Return { value: None });

        assert_eq!(run_pass(&mut ir), 1);
        match &ir.block(b0).quads[1].kind {
            QuadKind::Binary { rhs, .. } => assert_eq!(*rhs, Operand::int(5)),
            other => panic!("unexpected quad {other:?}"),
        }
    }

    #[test]
    fn test_multiply_defined_dst_is_not_forwarded() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let b = ir.pool.alloc(ValueType::Int, VarOrigin::Local(1));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: b,
                src: Operand::Var(a),
            },
        );
        ir.push(
            b0,
            Bci::new(1),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: b,
                src: Operand::int(9),
            },
        );
        ir.push(
            b0,
            Bci::new(2),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(b))),
            },
        );

        assert_eq!(run_pass(&mut ir), 0);
        match &ir.block(b0).quads[2].kind {
            QuadKind::Return { value: Some((_, v)) } => assert_eq!(*v, Operand::Var(b)),
            other => panic!("unexpected return {other:?}"),
        }
    }
}
