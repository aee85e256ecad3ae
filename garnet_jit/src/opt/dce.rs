//! Conservative dead-code elimination.
//!
//! Kills quads whose result is never used, restricted to quads with no
//! observable side effect: pure binaries, unaries, copies, and phis.
//! Division stays even when dead because of the zero-divisor exception,
//! and loads, stores, calls, and allocations are never touched. Removal
//! cascades: killing a quad can strand its operands' definitions, which
//! are then reaped in the same run.

use smallvec::SmallVec;

use crate::cfg::Cfg;
use crate::ir::{MethodIr, VarId};

use super::defuse::{DefUse, QuadPos};
use super::QuadPass;

#[derive(Debug, Default, Clone, Copy)]
pub struct DceStats {
    pub removed: usize,
}

#[derive(Debug, Default)]
pub struct Dce {
    pub stats: DceStats,
}

impl Dce {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuadPass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, ir: &mut MethodIr, cfg: &Cfg) -> usize {
        let defuse = DefUse::build(ir, cfg);
        let mut use_counts: Vec<u32> = (0..ir.pool.len())
            .map(|i| defuse.use_count(VarId::new(i as u32)))
            .collect();

        let mut worklist: Vec<QuadPos> = Vec::new();
        for &b in cfg.rpo() {
            for (i, quad) in ir.block(b).quads.iter().enumerate() {
                if quad.dead || !quad.removable_if_unused() {
                    continue;
                }
                if let Some(d) = quad.defined() {
                    if use_counts[d.index()] == 0 {
                        worklist.push(QuadPos { block: b, index: i });
                    }
                }
            }
        }

        let mut removed = 0;
        while let Some(pos) = worklist.pop() {
            {
                let quad = &ir.block(pos.block).quads[pos.index];
                if quad.dead {
                    continue;
                }
                match quad.defined() {
                    Some(d) if use_counts[d.index()] == 0 => {}
                    _ => continue,
                }
            }
            let mut freed: SmallVec<[VarId; 4]> = SmallVec::new();
            ir.block(pos.block).quads[pos.index].for_each_use(|v| freed.push(v));
            ir.block_mut(pos.block).quads[pos.index].kill();
            removed += 1;

            for v in freed {
                let count = &mut use_counts[v.index()];
                *count = count.saturating_sub(1);
                if *count == 0 {
                    if let Some(def) = defuse.single_def(v) {
                        let quad = &ir.block(def.block).quads[def.index];
                        if !quad.dead && quad.removable_if_unused() {
                            worklist.push(def);
                        }
                    }
                }
            }
        }
        self.stats.removed += removed;
        removed
    }
}

// =============================================================================
// Tests
// =============================================================================
