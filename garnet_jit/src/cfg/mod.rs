//! Control-flow analysis over the quad IR.
//!
//! The translator delivers blocks in bytecode order and that order is
//! also the final emission layout; a block without an explicit terminator
//! falls through to the next block in the vector. [`Cfg::build`] derives
//! predecessor/successor edges and a reverse postorder from that layout.
//! Blocks created by [`split_edge`] are appended at the end with
//! synthetic bytecode indices past the real ones, and always end in an
//! explicit goto, so layout order stays valid.

pub mod dom;
pub mod ssa;

pub use dom::DomTree;

use garnet_core::{JitError, JitResult};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{Bci, BlockId, MethodIr, QuadKind};

type EdgeList = SmallVec<[BlockId; 2]>;

/// Derived control-flow edges and traversal orders for one method.
#[derive(Debug)]
pub struct Cfg {
    preds: Vec<EdgeList>,
    succs: Vec<EdgeList>,
    rpo: Vec<BlockId>,
    rpo_number: Vec<Option<u32>>,
}

impl Cfg {
    /// Derive edges from terminators and layout. Fails with an internal
    /// error when a branch targets a bytecode index that is not a block
    /// leader.
    pub fn build(ir: &MethodIr) -> JitResult<Self> {
        let n = ir.block_count();
        let mut leaders: FxHashMap<Bci, BlockId> = FxHashMap::default();
        for id in ir.block_ids() {
            leaders.insert(ir.block(id).start_bci, id);
        }

        let mut succs: Vec<EdgeList> = vec![EdgeList::new(); n];
        for id in ir.block_ids() {
            let block = ir.block(id);
            let list = &mut succs[id.index()];
            let mut push = |b: BlockId| {
                if !list.contains(&b) {
                    list.push(b);
                }
            };
            for quad in block.live_quads() {
                if let Some(target) = quad.branch_target() {
                    let Some(&tb) = leaders.get(&target) else {
                        return Err(JitError::internal(format!(
                            "branch target {target} is not a block leader"
                        )));
                    };
                    push(tb);
                }
            }
            if block.falls_through() {
                let next = BlockId::new(id.index() as u32 + 1);
                if next.index() < n {
                    push(next);
                } else if block
                    .live_quads()
                    .next()
                    .is_some()
                {
                    return Err(JitError::internal(
                        "control falls off the end of the method",
                    ));
                }
            }
        }

        let mut preds: Vec<EdgeList> = vec![EdgeList::new(); n];
        for id in ir.block_ids() {
            for &s in &succs[id.index()] {
                if !preds[s.index()].contains(&id) {
                    preds[s.index()].push(id);
                }
            }
        }

        // Reverse postorder from the entry; unreachable blocks get no
        // number and are skipped by every analysis.
        let mut rpo_number = vec![None; n];
        let mut postorder = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        // Iterative DFS with an explicit next-successor cursor.
        let mut stack: Vec<(BlockId, usize)> = Vec::new();
        if n > 0 {
            visited[0] = true;
            stack.push((BlockId::new(0), 0));
        }
        while let Some(&mut (b, ref mut next)) = stack.last_mut() {
            if *next < succs[b.index()].len() {
                let s = succs[b.index()][*next];
                *next += 1;
                if !visited[s.index()] {
                    visited[s.index()] = true;
                    stack.push((s, 0));
                }
            } else {
                stack.pop();
                postorder.push(b);
            }
        }
        let rpo: Vec<BlockId> = postorder.into_iter().rev().collect();
        for (i, &b) in rpo.iter().enumerate() {
            rpo_number[b.index()] = Some(i as u32);
        }

        Ok(Self {
            preds,
            succs,
            rpo,
            rpo_number,
        })
    }

    #[inline]
    #[must_use]
    pub fn preds(&self, b: BlockId) -> &[BlockId] {
        &self.preds[b.index()]
    }

    #[inline]
    #[must_use]
    pub fn succs(&self, b: BlockId) -> &[BlockId] {
        &self.succs[b.index()]
    }

    /// Reachable blocks in reverse postorder.
    #[inline]
    #[must_use]
    pub fn rpo(&self) -> &[BlockId] {
        &self.rpo
    }

    /// Position of `b` in reverse postorder, if reachable.
    #[inline]
    #[must_use]
    pub fn rpo_number(&self, b: BlockId) -> Option<u32> {
        self.rpo_number[b.index()]
    }

    #[inline]
    #[must_use]
    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_number[b.index()].is_some()
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.preds.len()
    }
}

/// Insert a forwarding block on the `pred -> succ` edge and return it.
///
/// The new block starts at a synthetic bytecode index past every real
/// one and ends in an explicit goto to `succ`, so it can sit anywhere in
/// layout. The caller is expected to rebuild or stop using the [`Cfg`]
/// afterwards.
pub fn split_edge(ir: &mut MethodIr, pred: BlockId, succ: BlockId) -> BlockId {
    let mut max_bci = 0u32;
    for id in ir.block_ids() {
        let block = ir.block(id);
        max_bci = max_bci.max(block.start_bci.value());
        for quad in &block.quads {
            max_bci = max_bci.max(quad.bci.value());
        }
    }
    let synth = Bci::new(max_bci + 1);
    let succ_start = ir.block(succ).start_bci;

    let mid = ir.new_block(synth);
    ir.push(mid, synth, QuadKind::Goto { target: succ_start });

    // Retarget explicit jumps from pred to succ.
    let mut had_explicit = false;
    for quad in &mut ir.block_mut(pred).quads {
        if quad.dead {
            continue;
        }
        match &mut quad.kind {
            QuadKind::Goto { target } | QuadKind::Branch { target, .. }
                if *target == succ_start =>
            {
                *target = synth;
                had_explicit = true;
            }
            _ => {}
        }
    }

    // A fallthrough edge needs an explicit jump once the forwarding block
    // sits elsewhere in layout.
    let fell_through =
        pred.index() + 1 == succ.index() && ir.block(pred).falls_through();
    if fell_through {
        let bci = ir.block(pred).start_bci;
        ir.push(pred, bci, QuadKind::Goto { target: synth });
    } else {
        debug_assert!(had_explicit, "split edge is not an edge");
    }

    mid
}

// =============================================================================
// Tests
// =============================================================================
