//! The quad intermediate representation.
//!
//! A [`MethodIr`] is the unit the whole tier operates on: a variable pool
//! plus basic blocks of three-address quads, produced by the upstream
//! bytecode translator, mutated in place by the optimizer and register
//! allocator, then read out by the code generator. Quad addresses order
//! the method linearly; [`MethodIr::fixup_addresses`] renumbers them
//! contiguously after optimization so liveness can use them as positions.

pub mod block;
pub mod label;
pub mod operand;
pub mod quad;

pub use block::{BasicBlock, BlockId};
pub use label::{AuxKind, Bci, LabelId, LabelKey, LabelTable};
pub use operand::{Const, Location, Operand, VarId, VarOrigin, VarPool, Variable};
pub use quad::{
    BinOp, BranchCond, CallKind, ClassRef, CmpBias, FieldRef, MethodRef, OperandList, PhiArgList,
    Quad, QuadKind, UnOp,
};

use std::fmt;

/// The complete IR for one method compilation.
#[derive(Debug, Default)]
pub struct MethodIr {
    pub pool: VarPool,
    pub blocks: Vec<BasicBlock>,
    next_addr: u32,
}

impl MethodIr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry block. Block 0 by construction.
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    /// Append an empty block starting at `start_bci`.
    pub fn new_block(&mut self, start_bci: Bci) -> BlockId {
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(start_bci));
        id
    }

    #[inline]
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// All block handles in index order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId::new)
    }

    /// Append a quad to a block, assigning it the next free address.
    pub fn push(&mut self, block: BlockId, bci: Bci, kind: QuadKind) {
        let addr = self.next_addr;
        self.next_addr += 1;
        self.blocks[block.index()].quads.push(Quad::new(addr, bci, kind));
    }

    /// Insert a quad ahead of the block's terminator (at the end when the
    /// block has none). Used for the copies SSA deconstruction places on
    /// edges.
    pub fn insert_before_terminator(&mut self, block: BlockId, bci: Bci, kind: QuadKind) {
        let at = self.blocks[block.index()].copy_insertion_index();
        self.insert_at(block, at, bci, kind);
    }

    /// Insert a quad at an explicit position within a block.
    pub fn insert_at(&mut self, block: BlockId, index: usize, bci: Bci, kind: QuadKind) {
        let addr = self.next_addr;
        self.next_addr += 1;
        self.blocks[block.index()]
            .quads
            .insert(index, Quad::new(addr, bci, kind));
    }

    /// Total quads, dead ones included.
    #[must_use]
    pub fn quad_count(&self) -> usize {
        self.blocks.iter().map(|b| b.quads.len()).sum()
    }

    /// Quads that survive to code generation.
    #[must_use]
    pub fn live_quad_count(&self) -> usize {
        self.blocks.iter().map(|b| b.live_quads().count()).sum()
    }

    /// Renumber every quad contiguously following `order` (the final block
    /// layout). After this, addresses are monotonic within and across
    /// blocks in layout order, which the liveness builder relies on.
    /// Returns the number of addresses assigned.
    pub fn fixup_addresses(&mut self, order: &[BlockId]) -> u32 {
        let mut addr = 0;
        for &id in order {
            for quad in &mut self.blocks[id.index()].quads {
                quad.addr = addr;
                addr += 1;
            }
        }
        self.next_addr = addr;
        addr
    }
}

impl fmt::Display for MethodIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "{} (bci {}):", BlockId::new(i as u32), block.start_bci)?;
            for quad in &block.quads {
                writeln!(f, "  {quad}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garnet_core::ValueType;

    #[test]
    fn test_push_assigns_unique_addresses() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(8));
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(1),
            },
        );
        ir.push(b1, Bci::new(8), QuadKind::Return { value: None });
        assert_eq!(ir.block(b0).quads[0].addr, 0);
        assert_eq!(ir.block(b1).quads[0].addr, 1);
        assert_eq!(ir.quad_count(), 2);
    }

    #[test]
    fn test_fixup_renumbers_in_layout_order() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let b1 = ir.new_block(Bci::new(4));
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        // Interleave pushes so initial addresses straddle blocks.
        ir.push(
            b1,
            Bci::new(4),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(2),
            },
        );
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(1),
            },
        );
        ir.push(b1, Bci::new(6), QuadKind::Return { value: None });

        let assigned = ir.fixup_addresses(&[b0, b1]);
        assert_eq!(assigned, 3);
        assert_eq!(ir.block(b0).quads[0].addr, 0);
        assert_eq!(ir.block(b1).quads[0].addr, 1);
        assert_eq!(ir.block(b1).quads[1].addr, 2);
    }

    #[test]
    fn test_fixup_numbers_dead_quads_too() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        ir.push(
            b0,
            Bci::new(0),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(1),
            },
        );
        ir.push(b0, Bci::new(2), QuadKind::Return { value: None });
        ir.block_mut(b0).quads[0].kill();

        ir.fixup_addresses(&[b0]);
        assert_eq!(ir.block(b0).quads[0].addr, 0);
        assert_eq!(ir.block(b0).quads[1].addr, 1);
        assert_eq!(ir.live_quad_count(), 1);
    }

    #[test]
    fn test_insert_before_terminator() {
        let mut ir = MethodIr::new();
        let b0 = ir.new_block(Bci::new(0));
        let v = ir.pool.alloc(ValueType::Int, VarOrigin::Local(0));
        ir.push(b0, Bci::new(4), QuadKind::Return { value: None });
        ir.insert_before_terminator(
            b0,
            Bci::new(4),
            QuadKind::Assign {
                ty: ValueType::Int,
                dst: v,
                src: Operand::int(9),
            },
        );
        let kinds: Vec<bool> = ir.block(b0).quads.iter().map(Quad::is_terminator).collect();
        assert_eq!(kinds, vec![false, true]);
    }
}
