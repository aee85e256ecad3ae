//! Instruction buffer and emission sink.
//!
//! Code generation appends [`Insn`]s and label bindings to a
//! [`CodeBuffer`]; the downstream assembler turns the finished buffer
//! into bytes. Keeping the buffer symbolic is what lets the test suite
//! assert on exact instruction sequences and run them in the interpreter
//! without an encoder.
//!
//! Label discipline is strict: binding a label twice is an internal
//! error, and [`CodeBuffer::finish`] rejects any buffer that still jumps
//! to an unbound label.

use garnet_core::{JitError, JitResult};
use rustc_hash::FxHashSet;
use std::fmt;

use crate::ir::LabelId;

use super::insn::Insn;

/// One buffer element: a label landing site or an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Label(LabelId),
    Insn(Insn),
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Label(l) => write!(f, "{l}:"),
            Entry::Insn(i) => write!(f, "  {i}"),
        }
    }
}

/// Sink for generated instructions.
pub trait CodeSink {
    /// Append one instruction.
    fn emit(&mut self, insn: Insn);

    /// Bind `label` at the current position.
    fn bind(&mut self, label: LabelId) -> JitResult<()>;

    /// Number of entries appended so far.
    fn position(&self) -> usize;
}

/// Growable symbolic instruction buffer.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    entries: Vec<Entry>,
    bound: FxHashSet<LabelId>,
}

impl CodeBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `label` has been bound.
    #[must_use]
    pub fn is_bound(&self, label: LabelId) -> bool {
        self.bound.contains(&label)
    }

    /// All entries in emission order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Just the instructions, labels skipped.
    pub fn insns(&self) -> impl Iterator<Item = &Insn> {
        self.entries.iter().filter_map(|e| match e {
            Entry::Insn(i) => Some(i),
            Entry::Label(_) => None,
        })
    }

    #[must_use]
    pub fn insn_count(&self) -> usize {
        self.insns().count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate the finished buffer: every branch target must be bound.
    pub fn finish(&self) -> JitResult<()> {
        for entry in &self.entries {
            if let Entry::Insn(insn) = entry {
                if let Some(target) = insn.branch_target() {
                    if !self.bound.contains(&target) {
                        return Err(JitError::internal(format!(
                            "branch to unbound label {target}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl CodeSink for CodeBuffer {
    fn emit(&mut self, insn: Insn) {
        self.entries.push(Entry::Insn(insn));
    }

    fn bind(&mut self, label: LabelId) -> JitResult<()> {
        if !self.bound.insert(label) {
            return Err(JitError::internal(format!("label {label} bound twice")));
        }
        self.entries.push(Entry::Label(label));
        Ok(())
    }

    fn position(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for CodeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
