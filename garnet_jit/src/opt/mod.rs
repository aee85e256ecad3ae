//! Quad optimization pipeline.
//!
//! The pipeline brackets a classic scalar cleanup with the SSA phases:
//!
//! 1. SSA construction (phi placement and renaming)
//! 2. Constant folding, copy propagation, and conservative dead-code
//!    elimination, iterated to a fixpoint under a small cap
//! 3. Retirement of variables no live quad mentions
//! 4. SSA deconstruction (phis become edge copies)
//! 5. Quad address fixup over the final block layout
//!
//! Passes communicate only through the method IR. Each records its own
//! statistics, rolled up into [`PipelineStats`] for the driver.

pub mod copy_prop;
pub mod dce;
pub mod defuse;
pub mod fold;

pub use copy_prop::{CopyProp, CopyPropStats};
pub use dce::{Dce, DceStats};
pub use defuse::{DefUse, QuadPos};
pub use fold::{Fold, FoldStats};

use crate::cfg::ssa::{self, ConstructStats, DeconstructStats};
use crate::cfg::{Cfg, DomTree};
use crate::ir::{BlockId, MethodIr, VarId};
use garnet_core::JitResult;

/// One rewriting sweep over the quads.
pub trait QuadPass {
    fn name(&self) -> &'static str;

    /// Runs the pass once and returns the number of quads it changed.
    fn run(&mut self, ir: &mut MethodIr, cfg: &Cfg) -> usize;
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub enable_fold: bool,
    pub enable_copy_prop: bool,
    pub enable_dce: bool,
    /// Cap on fold/prop/dce rounds. The fixpoint usually lands in two.
    pub max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_fold: true,
            enable_copy_prop: true,
            enable_dce: true,
            max_iterations: 4,
        }
    }
}

impl PipelineConfig {
    /// Everything on.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// SSA round-trip only, no rewriting in between.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            enable_fold: false,
            enable_copy_prop: false,
            enable_dce: false,
            max_iterations: 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub iterations: usize,
    pub construct: ConstructStats,
    pub fold: FoldStats,
    pub copy_prop: CopyPropStats,
    pub dce: DceStats,
    pub vars_retired: usize,
    pub deconstruct: DeconstructStats,
    pub live_quads_out: usize,
}

// =============================================================================
// Driver
// =============================================================================

/// Run the full pipeline over `ir`, leaving it out of SSA form with
/// contiguous quad addresses in block layout order.
pub fn optimize(ir: &mut MethodIr, config: &PipelineConfig) -> JitResult<PipelineStats> {
    let cfg = Cfg::build(ir)?;
    let dom = DomTree::compute(&cfg);

    let mut stats = PipelineStats {
        construct: ssa::construct(ir, &cfg, &dom),
        ..PipelineStats::default()
    };

    let mut fold = Fold::new();
    let mut copy_prop = CopyProp::new();
    let mut dce = Dce::new();
    for _ in 0..config.max_iterations {
        let mut changed = 0;
        if config.enable_fold {
            changed += fold.run(ir, &cfg);
        }
        if config.enable_copy_prop {
            changed += copy_prop.run(ir, &cfg);
        }
        if config.enable_dce {
            changed += dce.run(ir, &cfg);
        }
        stats.iterations += 1;
        if changed == 0 {
            break;
        }
    }
    stats.fold = fold.stats;
    stats.copy_prop = copy_prop.stats;
    stats.dce = dce.stats;

    stats.vars_retired = retire_unused_vars(ir);
    stats.deconstruct = ssa::deconstruct(ir, &cfg);

    let layout: Vec<BlockId> = ir.block_ids().collect();
    ir.fixup_addresses(&layout);
    stats.live_quads_out = ir.live_quad_count();
    Ok(stats)
}

/// Retire every variable no live quad defines or uses. Retired variables
/// are skipped by liveness and never get a location.
fn retire_unused_vars(ir: &mut MethodIr) -> usize {
    let mut referenced = vec![false; ir.pool.len()];
    for b in ir.block_ids() {
        for quad in ir.block(b).live_quads() {
            if let Some(d) = quad.defined() {
                referenced[d.index()] = true;
            }
            quad.for_each_use(|v| referenced[v.index()] = true);
        }
    }
    let mut retired = 0;
    for (i, seen) in referenced.iter().enumerate() {
        let v = VarId::new(i as u32);
        if !seen && !ir.pool.is_retired(v) {
            ir.pool.retire(v);
            retired += 1;
        }
    }
    retired
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Bci, BinOp, BranchCond, Operand, QuadKind, VarOrigin};
    use garnet_core::ValueType;

    // if (c) x = 40 + 2; else x = 6 * 7; return x;
    fn diamond_with_const_arms() -> (MethodIr, VarId) {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(4));
        let b2 = ir.new_block(Bci::new(8));
        let b3 = ir.new_block(Bci::new(12));
        let c = ir.pool.alloc_param(ValueType::Int, VarOrigin::Local(0), 0);
        let x = ir.pool.alloc(ValueType::Int, VarOrigin::Local(1));

        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Branch {
                cond: BranchCond::Eq,
                lhs: Operand::Var(c),
                rhs: Operand::int(0),
                target: Bci::new(8),
            },
        );
        ir.push(
            b1,
            Bci::new(4),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: x,
                lhs: Operand::int(40),
                rhs: Operand::int(2),
            },
        );
        ir.push(b1, Bci::new(6), QuadKind::Goto { target: Bci::new(12) });
        ir.push(
            b2,
            Bci::new(8),
            QuadKind::Binary {
                op: BinOp::Mul,
                ty: ValueType::Int,
                dst: x,
                lhs: Operand::int(6),
                rhs: Operand::int(7),
            },
        );
        ir.push(
            b3,
            Bci::new(12),
            QuadKind::Return {
                value: Some((ValueType::Int, Operand::Var(x))),
            },
        );
        (ir, x)
    }

    #[test]
    fn test_full_pipeline_folds_both_arms() {
        let (mut ir, _) = diamond_with_const_arms();
        let stats = optimize(&mut ir, &PipelineConfig::full()).unwrap();

        assert!(stats.fold.folded >= 2);
        assert_eq!(stats.construct.phis_inserted, 1);
        assert_eq!(stats.deconstruct.phis_removed, 1);

        // Both arms now assign a folded constant.
        let arm = |b: usize| {
            ir.block(BlockId::new(b as u32))
                .live_quads()
                .find_map(|q| match &q.kind {
                    QuadKind::Assign { src, .. } => Some(src.clone()),
                    _ => None,
                })
        };
        assert_eq!(arm(1), Some(Operand::int(42)));
        assert_eq!(arm(2), Some(Operand::int(42)));
    }

    #[test]
    fn test_pipeline_leaves_contiguous_addresses() {
        let (mut ir, _) = diamond_with_const_arms();
        optimize(&mut ir, &PipelineConfig::full()).unwrap();

        let mut expected = 0;
        for b in ir.block_ids() {
            for quad in &ir.block(b).quads {
                assert_eq!(quad.addr, expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn test_minimal_config_round_trips_ssa() {
        let (mut ir, _) = diamond_with_const_arms();
        let before = ir.live_quad_count();
        let stats = optimize(&mut ir, &PipelineConfig::minimal()).unwrap();

        assert_eq!(stats.fold.folded, 0);
        assert_eq!(stats.dce.removed, 0);
        // Phi round-trip adds the edge copies.
        assert_eq!(
            stats.live_quads_out,
            before + stats.deconstruct.copies_inserted
        );
    }

    #[test]
    fn test_retires_vars_stranded_by_dce() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let a = ir.pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Binary {
                op: BinOp::Add,
                ty: ValueType::Int,
                dst: a,
                lhs: Operand::int(1),
                rhs: Operand::int(2),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });

        let stats = optimize(&mut ir, &PipelineConfig::full()).unwrap();
        assert!(stats.vars_retired >= 1);
        assert!(ir.pool.is_retired(a));
    }
}
