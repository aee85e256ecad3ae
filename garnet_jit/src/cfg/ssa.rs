//! SSA construction and deconstruction.
//!
//! Construction is semi-pruned: only variables live across a block
//! boundary get phis, placed at iterated dominance frontiers of their
//! definition blocks, then every definition gets a fresh version through
//! a dominator-tree walk. A use with no version on its stack resolves to
//! the original variable, which therefore acts as the incoming (entry or
//! parameter) version.
//!
//! Deconstruction replaces each phi-bearing edge with a batch of
//! parallel copies: inserted before the predecessor's terminator when the
//! predecessor has a single successor, otherwise on a freshly split
//! forwarding block. Copy batches are sequentialized with a temporary
//! when versions form a swap cycle. Phis are then dead-marked in place;
//! they keep their slots like every other dead quad.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use garnet_core::ValueType;

use crate::ir::{BlockId, MethodIr, Operand, PhiArgList, QuadKind, VarId};

use super::dom::DomTree;
use super::{split_edge, Cfg};

// =============================================================================
// Construction
// =============================================================================

/// Counters from one SSA construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstructStats {
    pub globals: usize,
    pub phis_inserted: usize,
    pub versions_created: usize,
}

/// Rewrite the method into SSA form.
pub fn construct(ir: &mut MethodIr, cfg: &Cfg, dom: &DomTree) -> ConstructStats {
    let mut stats = ConstructStats::default();
    let original_vars = ir.pool.len();

    // Cross-block variables and their definition blocks.
    let mut globals: FxHashSet<VarId> = FxHashSet::default();
    let mut def_blocks: Vec<SmallVec<[BlockId; 4]>> =
        vec![SmallVec::new(); original_vars];
    for &b in cfg.rpo() {
        let mut killed: FxHashSet<VarId> = FxHashSet::default();
        for quad in ir.block(b).live_quads() {
            quad.for_each_use(|v| {
                if !killed.contains(&v) {
                    globals.insert(v);
                }
            });
            if let Some(d) = quad.defined() {
                killed.insert(d);
                let defs = &mut def_blocks[d.index()];
                if !defs.contains(&b) {
                    defs.push(b);
                }
            }
        }
    }
    stats.globals = globals.len();

    // Phi placement at iterated dominance frontiers. The side table keeps
    // each phi's pre-rename variable keyed by quad address, since the
    // walk below may rename a phi's destination before filling its
    // arguments from a later-visited predecessor.
    let mut phi_orig: FxHashMap<u32, VarId> = FxHashMap::default();
    for raw in 0..original_vars as u32 {
        let v = VarId::new(raw);
        if !globals.contains(&v) {
            continue;
        }
        let mut worklist: Vec<BlockId> = def_blocks[v.index()].to_vec();
        let mut placed: FxHashSet<BlockId> = FxHashSet::default();
        let mut enqueued: FxHashSet<BlockId> = worklist.iter().copied().collect();
        while let Some(b) = worklist.pop() {
            for &d in dom.frontier(b) {
                if !placed.insert(d) {
                    continue;
                }
                let args: PhiArgList = cfg
                    .preds(d)
                    .iter()
                    .filter(|p| cfg.is_reachable(**p))
                    .map(|&p| (p, Operand::Var(v)))
                    .collect();
                let bci = ir.block(d).start_bci;
                ir.insert_at(d, 0, bci, QuadKind::Phi { dst: v, args });
                let addr = ir.block(d).quads[0].addr;
                phi_orig.insert(addr, v);
                stats.phis_inserted += 1;
                // The phi is itself a definition of v.
                if enqueued.insert(d) {
                    worklist.push(d);
                }
            }
        }
    }

    // Renaming over the dominator tree.
    let mut stacks: Vec<Vec<VarId>> = vec![Vec::new(); original_vars];
    let top = |stacks: &[Vec<VarId>], v: VarId| -> VarId {
        if v.index() < stacks.len() {
            stacks[v.index()].last().copied().unwrap_or(v)
        } else {
            v
        }
    };

    enum Walk {
        Visit(BlockId),
        Leave(Vec<VarId>),
    }

    let mut work = Vec::new();
    if !cfg.rpo().is_empty() {
        work.push(Walk::Visit(cfg.rpo()[0]));
    }
    while let Some(item) = work.pop() {
        match item {
            Walk::Leave(pushed) => {
                for v in pushed {
                    stacks[v.index()].pop();
                }
            }
            Walk::Visit(b) => {
                let mut pushed: Vec<VarId> = Vec::new();

                for qi in 0..ir.block(b).quads.len() {
                    let quad = &ir.block(b).quads[qi];
                    if quad.dead {
                        continue;
                    }
                    let is_phi = matches!(quad.kind, QuadKind::Phi { .. });
                    let addr = quad.addr;
                    let defined = quad.defined();

                    if !is_phi {
                        let stacks_ref = &stacks;
                        ir.block_mut(b).quads[qi].for_each_operand_mut(|opnd| {
                            if let Operand::Var(u) = opnd {
                                *opnd = Operand::Var(top(stacks_ref, *u));
                            }
                        });
                    }
                    if let Some(dst) = defined {
                        let orig = if is_phi {
                            phi_orig.get(&addr).copied().unwrap_or(dst)
                        } else {
                            dst
                        };
                        let (ty, origin) = {
                            let var = ir.pool.var(orig);
                            (var.ty, var.origin)
                        };
                        let fresh = ir.pool.alloc(ty, origin);
                        stats.versions_created += 1;
                        stacks[orig.index()].push(fresh);
                        pushed.push(orig);
                        if let Some(d) = ir.block_mut(b).quads[qi].defined_mut() {
                            *d = fresh;
                        }
                    }
                }

                // Feed this block's outgoing values into successor phis.
                for &s in cfg.succs(b) {
                    for quad in &mut ir.block_mut(s).quads {
                        if quad.dead {
                            continue;
                        }
                        if let QuadKind::Phi { args, .. } = &mut quad.kind {
                            let orig = phi_orig.get(&quad.addr).copied();
                            if let Some(orig) = orig {
                                for (p, arg) in args.iter_mut() {
                                    if *p == b {
                                        *arg = Operand::Var(top(&stacks, orig));
                                    }
                                }
                            }
                        }
                    }
                }

                work.push(Walk::Leave(pushed));
                for &c in dom.children(b) {
                    work.push(Walk::Visit(c));
                }
            }
        }
    }

    stats
}

// =============================================================================
// Deconstruction
// =============================================================================

/// Counters from one SSA deconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeconstructStats {
    pub copies_inserted: usize,
    pub temps_created: usize,
    pub edges_split: usize,
    pub phis_removed: usize,
}

/// Replace phis with edge copies and dead-mark them.
pub fn deconstruct(ir: &mut MethodIr, cfg: &Cfg) -> DeconstructStats {
    let mut stats = DeconstructStats::default();
    let original_blocks = ir.block_count();

    for raw in 0..original_blocks as u32 {
        let s = BlockId::new(raw);

        // Capture this block's phis: destination, per-edge sources, type.
        let mut phis: Vec<(VarId, PhiArgList, ValueType)> = Vec::new();
        for quad in ir.block(s).live_quads() {
            if let QuadKind::Phi { dst, args } = &quad.kind {
                phis.push((*dst, args.clone(), ir.pool.ty(*dst)));
            }
        }
        if phis.is_empty() {
            continue;
        }

        // Every phi in a block carries the same edge keys.
        let mut edge_preds: Vec<BlockId> = Vec::new();
        for (_, args, _) in &phis {
            for (p, _) in args {
                if !edge_preds.contains(p) {
                    edge_preds.push(*p);
                }
            }
        }

        for p in edge_preds {
            let mut copies: Vec<(VarId, Operand, ValueType)> = Vec::new();
            for (dst, args, ty) in &phis {
                for (ap, src) in args {
                    if *ap == p && *src != Operand::Var(*dst) {
                        copies.push((*dst, *src, *ty));
                    }
                }
            }
            if copies.is_empty() {
                continue;
            }

            let target = if cfg.succs(p).len() <= 1 {
                p
            } else {
                stats.edges_split += 1;
                split_edge(ir, p, s)
            };

            let schedule = sequentialize(ir, &mut copies, &mut stats);
            let bci = ir.block(target).start_bci;
            for (dst, src, ty) in schedule {
                ir.insert_before_terminator(target, bci, QuadKind::Assign { ty, dst, src });
                stats.copies_inserted += 1;
            }
        }

        for quad in &mut ir.block_mut(s).quads {
            if !quad.dead && matches!(quad.kind, QuadKind::Phi { .. }) {
                quad.kill();
                stats.phis_removed += 1;
            }
        }
    }

    stats
}

/// Order one edge's parallel copies so earlier writes never clobber a
/// value a later copy still reads, introducing a temporary per cycle.
fn sequentialize(
    ir: &mut MethodIr,
    pending: &mut Vec<(VarId, Operand, ValueType)>,
    stats: &mut DeconstructStats,
) -> Vec<(VarId, Operand, ValueType)> {
    let mut out = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let free = pending.iter().position(|&(dst, _, _)| {
            !pending
                .iter()
                .any(|&(_, src, _)| src == Operand::Var(dst))
        });
        match free {
            Some(i) => out.push(pending.remove(i)),
            None => {
                // Every destination is still read: a cycle. Park one
                // destination's current value in a temporary and redirect
                // its readers there.
                let (dst, _, _) = pending[0];
                let ty = ir.pool.ty(dst);
                let tmp = ir.pool.temp(ty);
                stats.temps_created += 1;
                out.push((tmp, Operand::Var(dst), ty));
                for (_, src, _) in pending.iter_mut() {
                    if *src == Operand::Var(dst) {
                        *src = Operand::Var(tmp);
                    }
                }
            }
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
