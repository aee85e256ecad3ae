//! Dominator tree and dominance frontiers.
//!
//! The iterative RPO scheme of Cooper, Harvey, and Kennedy: intersect
//! predecessors' immediate dominators walking up the tree by reverse
//! postorder number until a fixpoint. Frontiers come from the standard
//! two-predecessor walk afterwards. Only reachable blocks participate;
//! the entry is its own immediate dominator.

use crate::ir::BlockId;

use super::Cfg;

#[derive(Debug)]
pub struct DomTree {
    idom: Vec<Option<BlockId>>,
    children: Vec<Vec<BlockId>>,
    frontier: Vec<Vec<BlockId>>,
}

impl DomTree {
    #[must_use]
    pub fn compute(cfg: &Cfg) -> Self {
        let n = cfg.block_count();
        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        let rpo = cfg.rpo();
        if rpo.is_empty() {
            return Self {
                idom,
                children: vec![Vec::new(); n],
                frontier: vec![Vec::new(); n],
            };
        }

        let entry = rpo[0];
        idom[entry.index()] = Some(entry);

        let number = |b: BlockId| cfg.rpo_number(b);
        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| {
            while a != b {
                // Walk whichever finger sits later in reverse postorder up
                // the tree. Unwraps cannot fire: both fingers are
                // processed, reachable blocks.
                while number(a) > number(b) {
                    a = idom[a.index()].unwrap_or(a);
                }
                while number(b) > number(a) {
                    b = idom[b.index()].unwrap_or(b);
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in &rpo[1..] {
                let mut new_idom: Option<BlockId> = None;
                for &p in cfg.preds(b) {
                    if idom[p.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b.index()] != new_idom {
                    idom[b.index()] = new_idom;
                    changed = true;
                }
            }
        }

        let mut children: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for &b in &rpo[1..] {
            if let Some(d) = idom[b.index()] {
                children[d.index()].push(b);
            }
        }

        let mut frontier: Vec<Vec<BlockId>> = vec![Vec::new(); n];
        for &b in rpo {
            let preds = cfg.preds(b);
            if preds.len() < 2 {
                continue;
            }
            let Some(b_idom) = idom[b.index()] else {
                continue;
            };
            for &p in preds {
                let mut runner = p;
                while cfg.is_reachable(runner) && runner != b_idom {
                    if !frontier[runner.index()].contains(&b) {
                        frontier[runner.index()].push(b);
                    }
                    match idom[runner.index()] {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }

        Self {
            idom,
            children,
            frontier,
        }
    }

    /// Immediate dominator. The entry returns itself; unreachable blocks
    /// return `None`.
    #[inline]
    #[must_use]
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom[b.index()]
    }

    /// Dominator-tree children of `b`.
    #[inline]
    #[must_use]
    pub fn children(&self, b: BlockId) -> &[BlockId] {
        &self.children[b.index()]
    }

    /// Dominance frontier of `b`.
    #[inline]
    #[must_use]
    pub fn frontier(&self, b: BlockId) -> &[BlockId] {
        &self.frontier[b.index()]
    }

    /// Whether `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            match self.idom[runner.index()] {
                Some(up) if up != runner => runner = up,
                _ => return false,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
