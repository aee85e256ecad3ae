//! Runtime interface: entry points, object layout, and class metadata.
//!
//! The generated code talks to the wider VM through three narrow
//! surfaces, all collected here so the code generator never hardcodes a
//! runtime detail:
//!
//! - [`RuntimeEntry`]: the named out-of-line routines compiled code calls
//!   (allocation, monitors, throw, the yieldpoint). These use the
//!   caller-pops convention, unlike compiled-to-compiled calls.
//! - [`ObjectLayout`] and [`StaticsAddressing`] inside [`TargetConfig`]:
//!   the header offsets and statics-table addressing the memory lowerings
//!   bake into instructions.
//! - [`MethodMetadata`]: the resolution trait the driver is handed per
//!   method, answering field, method, and class questions. Resolution
//!   failures surface as incompatible-class-change errors, distinct from
//!   internal compiler errors.

use garnet_core::{JitError, JitResult, ValueType};

use crate::ir::{CallKind, ClassRef, FieldRef, MethodRef};

// =============================================================================
// Runtime entry points
// =============================================================================

/// Out-of-line runtime routines callable from generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeEntry {
    /// Thread-switch test. Taken backward branches call this before the
    /// jump so every loop polls.
    YieldPoint,
    /// Allocate a scalar object. Args: class handle. Returns the
    /// reference.
    NewObject,
    /// Allocate a primitive array. Args: element tag, length. Returns the
    /// reference.
    NewPrimitiveArray,
    /// Allocate a reference array. Args: class handle, length. Returns
    /// the reference.
    NewObjectArray,
    /// Allocate a multi-dimensional array. Args: class handle, reference
    /// to an int array of dimensions. Returns the reference.
    NewMultiArray,
    /// Acquire an object's monitor. Args: reference.
    MonitorEnter,
    /// Release an object's monitor. Args: reference.
    MonitorExit,
    /// Raise an exception object. Args: reference. Does not return.
    Throw,
    /// Raise the array-index failure. Args: reference, index. Does not
    /// return.
    OutOfBounds,
}

impl RuntimeEntry {
    /// Argument words pushed before the call.
    #[must_use]
    pub const fn arg_words(self) -> u16 {
        match self {
            RuntimeEntry::YieldPoint => 0,
            RuntimeEntry::NewObject => 1,
            RuntimeEntry::NewPrimitiveArray => 2,
            RuntimeEntry::NewObjectArray => 2,
            RuntimeEntry::NewMultiArray => 2,
            RuntimeEntry::MonitorEnter => 1,
            RuntimeEntry::MonitorExit => 1,
            RuntimeEntry::Throw => 1,
            RuntimeEntry::OutOfBounds => 2,
        }
    }

    /// Whether the entry produces a value in the return register.
    #[inline]
    #[must_use]
    pub const fn returns_value(self) -> bool {
        matches!(
            self,
            RuntimeEntry::NewObject
                | RuntimeEntry::NewPrimitiveArray
                | RuntimeEntry::NewObjectArray
                | RuntimeEntry::NewMultiArray
        )
    }

    /// Whether control comes back to the call site.
    #[inline]
    #[must_use]
    pub const fn returns_normally(self) -> bool {
        !matches!(self, RuntimeEntry::Throw | RuntimeEntry::OutOfBounds)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            RuntimeEntry::YieldPoint => "yieldpoint",
            RuntimeEntry::NewObject => "new_object",
            RuntimeEntry::NewPrimitiveArray => "new_primitive_array",
            RuntimeEntry::NewObjectArray => "new_object_array",
            RuntimeEntry::NewMultiArray => "new_multi_array",
            RuntimeEntry::MonitorEnter => "monitor_enter",
            RuntimeEntry::MonitorExit => "monitor_exit",
            RuntimeEntry::Throw => "throw",
            RuntimeEntry::OutOfBounds => "out_of_bounds",
        }
    }
}

// =============================================================================
// Target layout
// =============================================================================

/// Header offsets the memory and call lowerings depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLayout {
    /// Offset of the type-information pointer in every object header.
    pub type_word_off: i32,
    /// Offset of the length word in an array header.
    pub array_len_off: i32,
    /// Offset of element 0 in an array.
    pub array_data_off: i32,
    /// Offset of the virtual-dispatch table within the type information.
    pub vtable_base_off: i32,
    /// Offset of the machine-code entry within a dispatch-table entry.
    pub code_ptr_off: i32,
}

impl Default for ObjectLayout {
    fn default() -> Self {
        // Header: type word, lock word, then (for arrays) the length.
        Self {
            type_word_off: 0,
            array_len_off: 8,
            array_data_off: 12,
            vtable_base_off: 16,
            code_ptr_off: 4,
        }
    }
}

/// How generated code reaches the statics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticsAddressing {
    /// The table sits at a fixed address; slot `n` is one absolute memory
    /// operand away.
    Direct { base: i32 },
    /// The table pointer itself lives in a fixed cell and must be loaded
    /// into a register first.
    ViaRegister { table_cell: i32 },
}

impl Default for StaticsAddressing {
    fn default() -> Self {
        StaticsAddressing::Direct { base: 0x1000 }
    }
}

/// Everything about the target the code generator parameterizes over.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetConfig {
    pub object: ObjectLayout,
    pub statics: StaticsAddressing,
}

// =============================================================================
// Resolution results
// =============================================================================

/// Where a resolved field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStorage {
    /// Instance field at a byte offset from the object reference.
    Instance { offset: i32 },
    /// Static field in the given word slot of the statics table.
    Static { slot: u32 },
}

/// How a resolved call site dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Target known at compile time. The cell holds the code pointer, so
    /// the call goes through it as an absolute memory operand. Static,
    /// special, and final-virtual calls land here.
    Direct { entry_cell: i32 },
    /// Target found in the receiver's dispatch table at the given slot.
    Vtable { slot: u32 },
}

/// A resolved call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSite {
    /// Argument words the callee pops on return, receiver included.
    pub arg_words: u16,
    pub return_type: Option<ValueType>,
    pub dispatch: Dispatch,
}

// =============================================================================
// Metadata collaborator
// =============================================================================

/// Per-method compilation input: the bytecode, the signature, and the
/// resolved view of everything the constant pool references.
pub trait MethodMetadata {
    /// The method's bytecode, as verified by the class loader.
    fn bytecode(&self) -> &[u8];

    /// Incoming argument words (receiver included for instance methods).
    fn arg_words(&self) -> u16;

    fn return_type(&self) -> Option<ValueType>;

    /// Resolve a field reference to its storage.
    fn field_storage(&self, field: FieldRef) -> JitResult<FieldStorage>;

    /// Resolve a call site. `kind` is the dispatch the bytecode asked
    /// for; the resolved answer may strengthen virtual to direct when
    /// the target cannot be overridden.
    fn method_site(&self, kind: CallKind, method: MethodRef) -> JitResult<MethodSite>;

    /// Resolve a class reference to the handle pushed at allocation
    /// sites.
    fn class_handle(&self, class: ClassRef) -> JitResult<i32>;
}

/// Standard resolution-failure error for metadata implementations.
#[must_use]
pub fn unresolved(what: impl Into<String>) -> JitError {
    JitError::incompatible_class_change(what)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_arg_words() {
        assert_eq!(RuntimeEntry::YieldPoint.arg_words(), 0);
        assert_eq!(RuntimeEntry::NewObject.arg_words(), 1);
        assert_eq!(RuntimeEntry::NewPrimitiveArray.arg_words(), 2);
        assert_eq!(RuntimeEntry::OutOfBounds.arg_words(), 2);
    }

    #[test]
    fn test_entry_returns() {
        assert!(RuntimeEntry::NewObject.returns_value());
        assert!(!RuntimeEntry::MonitorEnter.returns_value());
        assert!(!RuntimeEntry::Throw.returns_normally());
        assert!(!RuntimeEntry::OutOfBounds.returns_normally());
        assert!(RuntimeEntry::YieldPoint.returns_normally());
    }

    #[test]
    fn test_default_layout_is_coherent() {
        let layout = ObjectLayout::default();
        assert!(layout.array_data_off > layout.array_len_off);
        assert_eq!(layout.type_word_off, 0);
    }

    #[test]
    fn test_unresolved_is_class_change() {
        let err = unresolved("field #3");
        assert_eq!(err.kind(), garnet_core::ErrorKind::IncompatibleClassChange);
    }
}
