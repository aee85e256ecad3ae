//! Definition and use index over the live quads.
//!
//! A throwaway side table the optimization passes rebuild as needed and
//! drop when the pipeline finishes. Positions identify quads by block and
//! in-block index, which stay stable while passes only mutate quads in
//! place or dead-mark them.

use rustc_hash::FxHashMap;

use crate::cfg::Cfg;
use crate::ir::{BlockId, MethodIr, VarId};

/// Position of one quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadPos {
    pub block: BlockId,
    pub index: usize,
}

/// Definition state of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DefState {
    #[default]
    None,
    One(QuadPos),
    Many,
}

/// Def and use sites for every variable, over reachable live quads.
#[derive(Debug, Default)]
pub struct DefUse {
    defs: Vec<DefState>,
    uses: FxHashMap<VarId, Vec<QuadPos>>,
    use_counts: Vec<u32>,
}

impl DefUse {
    #[must_use]
    pub fn build(ir: &MethodIr, cfg: &Cfg) -> Self {
        let n = ir.pool.len();
        let mut this = Self {
            defs: vec![DefState::None; n],
            uses: FxHashMap::default(),
            use_counts: vec![0; n],
        };
        for &b in cfg.rpo() {
            for (i, quad) in ir.block(b).quads.iter().enumerate() {
                if quad.dead {
                    continue;
                }
                let pos = QuadPos { block: b, index: i };
                quad.for_each_use(|v| {
                    this.use_counts[v.index()] += 1;
                    this.uses.entry(v).or_default().push(pos);
                });
                if let Some(d) = quad.defined() {
                    this.defs[d.index()] = match this.defs[d.index()] {
                        DefState::None => DefState::One(pos),
                        _ => DefState::Many,
                    };
                }
            }
        }
        this
    }

    /// The single definition site, when there is exactly one.
    #[must_use]
    pub fn single_def(&self, v: VarId) -> Option<QuadPos> {
        match self.defs.get(v.index()) {
            Some(DefState::One(pos)) => Some(*pos),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn use_count(&self, v: VarId) -> u32 {
        self.use_counts.get(v.index()).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn uses_of(&self, v: VarId) -> &[QuadPos] {
        self.uses.get(&v).map_or(&[], Vec::as_slice)
    }

    #[inline]
    #[must_use]
    pub fn is_unused(&self, v: VarId) -> bool {
        self.use_count(v) == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
