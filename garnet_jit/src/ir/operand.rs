//! Variables, constants, and operand storage.
//!
//! A quad operand is either a compile-time constant or a variable drawn
//! from the method's [`VarPool`]. Variables start with no assigned storage;
//! the register allocator fills in a [`Location`] (a register or an
//! `ebp`-relative stack slot) before code generation begins, and the code
//! generator treats a still-missing location as an internal error.

use garnet_core::ValueType;
use std::fmt;

use crate::backend::x86::Gpr;

// =============================================================================
// Constants
// =============================================================================

/// A compile-time constant operand.
///
/// Equality is bitwise for the float kinds, so two NaN constants with the
/// same payload compare equal and folding stays deterministic.
#[derive(Debug, Clone, Copy)]
pub enum Const {
    Int(i32),
    Float(f32),
    Double(f64),
    Null,
}

impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Float(a), Const::Float(b)) => a.to_bits() == b.to_bits(),
            (Const::Double(a), Const::Double(b)) => a.to_bits() == b.to_bits(),
            (Const::Null, Const::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Const {}

impl Const {
    /// The value type this constant carries.
    #[must_use]
    pub const fn value_type(self) -> ValueType {
        match self {
            Const::Int(_) => ValueType::Int,
            Const::Float(_) => ValueType::Float,
            Const::Double(_) => ValueType::Double,
            Const::Null => ValueType::Reference,
        }
    }

    /// The 32-bit raw image of a single-word constant. `None` for doubles.
    #[must_use]
    pub fn word_bits(self) -> Option<i32> {
        match self {
            Const::Int(v) => Some(v),
            Const::Float(v) => Some(v.to_bits() as i32),
            Const::Null => Some(0),
            Const::Double(_) => None,
        }
    }

    /// The 64-bit raw image of a double constant.
    #[must_use]
    pub fn double_bits(self) -> Option<u64> {
        match self {
            Const::Double(v) => Some(v.to_bits()),
            _ => None,
        }
    }

    /// The integer value, if this is an int constant.
    #[inline]
    #[must_use]
    pub const fn as_int(self) -> Option<i32> {
        match self {
            Const::Int(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{v}"),
            Const::Float(v) => write!(f, "{v}f"),
            Const::Double(v) => write!(f, "{v}d"),
            Const::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Variables
// =============================================================================

/// Dense handle for one variable in the method's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u32);

impl VarId {
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

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a variable came from in the source method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOrigin {
    /// A local-variable slot.
    Local(u16),
    /// An operand-stack slot.
    Stack(u16),
    /// Compiler-introduced temporary (phi-copy cycle breaking etc).
    Temp,
}

impl fmt::Display for VarOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarOrigin::Local(n) => write!(f, "l{n}"),
            VarOrigin::Stack(n) => write!(f, "s{n}"),
            VarOrigin::Temp => write!(f, "t"),
        }
    }
}

/// Assigned storage for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// A general-purpose register.
    Register(Gpr),
    /// A stack word at the given `ebp`-relative displacement. Negative
    /// displacements are frame slots, positive ones incoming arguments.
    Stack(i32),
}

impl Location {
    #[inline]
    #[must_use]
    pub const fn is_register(self) -> bool {
        matches!(self, Location::Register(_))
    }

    #[inline]
    #[must_use]
    pub const fn as_register(self) -> Option<Gpr> {
        match self {
            Location::Register(r) => Some(r),
            Location::Stack(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(r) => write!(f, "{r}"),
            Location::Stack(disp) if *disp < 0 => write!(f, "[ebp{disp}]"),
            Location::Stack(disp) => write!(f, "[ebp+{disp}]"),
        }
    }
}

/// One variable: its type, provenance, and (eventually) storage.
#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: ValueType,
    pub origin: VarOrigin,
    /// Index into the flat argument-word list, for incoming parameters.
    pub param_index: Option<u16>,
    /// Storage assigned by the register allocator.
    pub location: Option<Location>,
    /// Set when the cleanup pass finds the variable referenced by no
    /// remaining quad. Retired variables get no live range or storage.
    pub retired: bool,
}

impl Variable {
    #[inline]
    #[must_use]
    pub const fn is_param(&self) -> bool {
        self.param_index.is_some()
    }
}

// =============================================================================
// Variable pool
// =============================================================================

/// The per-method variable pool. Handles are dense and stable for the
/// whole compilation; cleanup retires entries in place instead of
/// renumbering.
#[derive(Debug, Default)]
pub struct VarPool {
    vars: Vec<Variable>,
}

impl VarPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh variable.
    pub fn alloc(&mut self, ty: ValueType, origin: VarOrigin) -> VarId {
        let id = VarId::new(self.vars.len() as u32);
        self.vars.push(Variable {
            ty,
            origin,
            param_index: None,
            location: None,
            retired: false,
        });
        id
    }

    /// Allocate an incoming-parameter variable. `param_index` counts
    /// argument words from the first argument.
    pub fn alloc_param(&mut self, ty: ValueType, origin: VarOrigin, param_index: u16) -> VarId {
        let id = self.alloc(ty, origin);
        self.vars[id.index()].param_index = Some(param_index);
        id
    }

    /// Allocate a compiler temporary.
    pub fn temp(&mut self, ty: ValueType) -> VarId {
        self.alloc(ty, VarOrigin::Temp)
    }

    #[inline]
    #[must_use]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    #[inline]
    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn ty(&self, id: VarId) -> ValueType {
        self.vars[id.index()].ty
    }

    #[inline]
    #[must_use]
    pub fn location(&self, id: VarId) -> Option<Location> {
        self.vars[id.index()].location
    }

    pub fn set_location(&mut self, id: VarId, location: Location) {
        self.vars[id.index()].location = Some(location);
    }

    /// Mark a variable as referenced by no quad. Its handle stays valid
    /// but it will receive no live range and no storage.
    pub fn retire(&mut self, id: VarId) {
        let v = &mut self.vars[id.index()];
        v.retired = true;
        v.location = None;
    }

    #[inline]
    #[must_use]
    pub fn is_retired(&self, id: VarId) -> bool {
        self.vars[id.index()].retired
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables still in play (never retired).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.vars.iter().filter(|v| !v.retired).count()
    }

    /// All variables, retired ones included.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId::new(i as u32), v))
    }
}

// =============================================================================
// Operands
// =============================================================================

/// A quad operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Const(Const),
    Var(VarId),
}

impl Operand {
    #[inline]
    #[must_use]
    pub const fn as_var(self) -> Option<VarId> {
        match self {
            Operand::Var(id) => Some(id),
            Operand::Const(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_const(self) -> Option<Const> {
        match self {
            Operand::Const(c) => Some(c),
            Operand::Var(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_const(self) -> bool {
        matches!(self, Operand::Const(_))
    }

    /// Convenience constructor for int constants.
    #[inline]
    #[must_use]
    pub const fn int(v: i32) -> Self {
        Operand::Const(Const::Int(v))
    }
}

impl From<VarId> for Operand {
    fn from(id: VarId) -> Self {
        Operand::Var(id)
    }
}

impl From<Const> for Operand {
    fn from(c: Const) -> Self {
        Operand::Const(c)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Var(v) => write!(f, "{v}"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_const_equality_is_bitwise() {
        assert_eq!(Const::Float(f32::NAN), Const::Float(f32::NAN));
        assert_eq!(Const::Double(-0.0), Const::Double(-0.0));
        assert_ne!(Const::Double(0.0), Const::Double(-0.0));
        assert_ne!(Const::Int(0), Const::Null);
    }

    #[test]
    fn test_const_word_bits() {
        assert_eq!(Const::Int(-7).word_bits(), Some(-7));
        assert_eq!(Const::Null.word_bits(), Some(0));
        assert_eq!(Const::Float(1.0).word_bits(), Some(0x3f80_0000_u32 as i32));
        assert_eq!(Const::Double(1.0).word_bits(), None);
        assert_eq!(
            Const::Double(1.0).double_bits(),
            Some(0x3ff0_0000_0000_0000)
        );
    }

    #[test]
    fn test_pool_allocation_and_location() {
        let mut pool = VarPool::new();
        let a = pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let b = pool.alloc(ValueType::Float, VarOrigin::Stack(1));
        assert_ne!(a, b);
        assert_eq!(pool.ty(a), ValueType::Int);
        assert_eq!(pool.location(a), None);

        pool.set_location(a, Location::Register(Gpr::Esi));
        assert_eq!(pool.location(a), Some(Location::Register(Gpr::Esi)));
        assert_eq!(pool.location(b), None);
    }

    #[test]
    fn test_params() {
        let mut pool = VarPool::new();
        let p0 = pool.alloc_param(ValueType::Reference, VarOrigin::Local(0), 0);
        let t = pool.temp(ValueType::Int);
        assert!(pool.var(p0).is_param());
        assert_eq!(pool.var(p0).param_index, Some(0));
        assert!(!pool.var(t).is_param());
        assert_eq!(pool.var(t).origin, VarOrigin::Temp);
    }

    #[test]
    fn test_retire_keeps_handles_valid() {
        let mut pool = VarPool::new();
        let a = pool.alloc(ValueType::Int, VarOrigin::Local(0));
        let b = pool.alloc(ValueType::Int, VarOrigin::Stack(0));
        pool.set_location(b, Location::Stack(-4));
        pool.retire(b);
        assert!(pool.is_retired(b));
        assert!(!pool.is_retired(a));
        assert_eq!(pool.location(b), None);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.active_count(), 1);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::Register(Gpr::Edi).to_string(), "edi");
        assert_eq!(Location::Stack(-8).to_string(), "[ebp-8]");
        assert_eq!(Location::Stack(12).to_string(), "[ebp+12]");
    }

    #[test]
    fn test_operand_display() {
        let mut pool = VarPool::new();
        let v = pool.alloc(ValueType::Int, VarOrigin::Local(2));
        assert_eq!(Operand::Var(v).to_string(), "v0");
        assert_eq!(Operand::int(42).to_string(), "42");
        assert_eq!(Operand::Const(Const::Null).to_string(), "null");
    }
}
