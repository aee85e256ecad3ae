//! Label keys and the per-method label table.
//!
//! Machine labels are keyed three ways: by bytecode index (branch targets),
//! by an auxiliary site within one bytecode (the short internal jumps the
//! float-compare and bounds-check sequences need), and by the shared
//! epilogue. The table interns keys to dense [`LabelId`]s on first request,
//! so a forward branch and the later instruction at its target agree on the
//! same label without any pre-pass over the quads.

use rustc_hash::FxHashMap;
use std::fmt;

// =============================================================================
// Bytecode index
// =============================================================================

/// A bytecode index: the offset of an instruction from the start of the
/// method's code array. Branch targets are expressed in this space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bci(u32);

impl Bci {
    #[inline]
    #[must_use]
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Bci {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

// =============================================================================
// Label identity
// =============================================================================

/// Dense handle for one machine label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(u32);

impl LabelId {
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

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Which auxiliary site within a bytecode a label belongs to. Several
/// lowering sequences branch within themselves; each such internal target
/// gets its own key so two sequences at the same bytecode never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxKind {
    /// Float-compare path that writes +1.
    FcmpInc,
    /// Float-compare path that writes -1.
    FcmpDec,
    /// Join point after a float-compare.
    FcmpDone,
    /// Back edge of the partial-remainder loop.
    FremLoop,
    /// Out-of-line bounds-check failure block.
    BoundsFail,
}

/// Key identifying one label within a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKey {
    /// The instruction at a bytecode index.
    Bci(Bci),
    /// An auxiliary site inside the lowering of the bytecode at `bci`.
    Aux { bci: Bci, kind: AuxKind },
    /// The method's shared epilogue.
    Epilogue,
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKey::Bci(bci) => write!(f, "bci{bci}"),
            LabelKey::Aux { bci, kind } => write!(f, "aux{bci}:{kind:?}"),
            LabelKey::Epilogue => write!(f, "epilogue"),
        }
    }
}

// =============================================================================
// Label table
// =============================================================================

/// Interns [`LabelKey`]s to [`LabelId`]s for one method compilation.
#[derive(Debug, Default)]
pub struct LabelTable {
    ids: FxHashMap<LabelKey, LabelId>,
    keys: Vec<LabelKey>,
}

impl LabelTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The label for `key`, allocating one on first request.
    pub fn intern(&mut self, key: LabelKey) -> LabelId {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = LabelId::new(self.keys.len() as u32);
        self.keys.push(key);
        self.ids.insert(key, id);
        id
    }

    /// The label for `key`, if one was ever requested.
    #[must_use]
    pub fn get(&self, key: LabelKey) -> Option<LabelId> {
        self.ids.get(&key).copied()
    }

    /// The key a label was interned under.
    #[must_use]
    pub fn key_of(&self, id: LabelId) -> LabelKey {
        self.keys[id.index()]
    }

    /// Number of labels allocated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// All labels in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, LabelKey)> + '_ {
        self.keys
            .iter()
            .enumerate()
            .map(|(i, &key)| (LabelId::new(i as u32), key))
    }
}

// =============================================================================
// Tests
// =============================================================================
