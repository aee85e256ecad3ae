//! Basic blocks.
//!
//! Blocks hold the quad sequence between leaders. A block need not end in
//! an explicit terminator: when its last live quad is not a goto, branch,
//! return, or throw, control falls through to the next block in layout
//! order. Edges are not stored here; the control-flow module derives them
//! on demand from terminators and layout.

use std::fmt;

use super::label::Bci;
use super::quad::Quad;

/// Dense handle for one basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// One basic block: a leader bytecode index and its quads.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    /// Bytecode index of the block's first instruction.
    pub start_bci: Bci,
    pub quads: Vec<Quad>,
}

impl BasicBlock {
    #[must_use]
    pub fn new(start_bci: Bci) -> Self {
        Self {
            start_bci,
            quads: Vec::new(),
        }
    }

    /// The block's live quads in order.
    pub fn live_quads(&self) -> impl Iterator<Item = &Quad> {
        self.quads.iter().filter(|q| !q.dead)
    }

    /// The last live quad, if it is a terminator.
    #[must_use]
    pub fn terminator(&self) -> Option<&Quad> {
        self.quads
            .iter()
            .rev()
            .find(|q| !q.dead)
            .filter(|q| q.is_terminator())
    }

    /// Whether control can fall through past the end of this block.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        match self.terminator() {
            None => true,
            // A conditional branch falls through when not taken.
            Some(q) => matches!(q.kind, super::quad::QuadKind::Branch { .. }),
        }
    }

    /// Position at which edge copies belong: before the terminator if the
    /// block has one, else at the end.
    #[must_use]
    pub fn copy_insertion_index(&self) -> usize {
        match self.quads.iter().rposition(|q| !q.dead && q.is_terminator()) {
            Some(i) => i,
            None => self.quads.len(),
        }
    }
}
