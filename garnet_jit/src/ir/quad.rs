//! Three-address quads.
//!
//! Each quad is one operation with at most one defined variable and a
//! small set of operand uses. The operation itself is a closed sum,
//! [`QuadKind`], so every pass dispatches with an exhaustive match and a
//! new operation cannot be added without the compiler pointing at every
//! place that must handle it.
//!
//! Quads carry two coordinates: `bci`, the source bytecode index (branch
//! targets are expressed in this space and it never changes), and `addr`,
//! the linear position used by liveness and register allocation, rewritten
//! by address fixup after the optimizer has reordered and dead-marked.
//! "Deleting" a quad means setting its dead flag; dead quads stay in their
//! block so bytecode indices remain anchored for label binding.

use garnet_core::{ElemKind, FieldKind, ValueType};
use smallvec::SmallVec;
use std::fmt;

use super::block::BlockId;
use super::label::Bci;
use super::operand::{Operand, VarId};

/// Argument-list storage for calls and multi-array dimensions.
pub type OperandList = SmallVec<[Operand; 4]>;

/// Phi inputs, one per predecessor edge.
pub type PhiArgList = SmallVec<[(BlockId, Operand); 2]>;

// =============================================================================
// Operation codes
// =============================================================================

/// Two-operand arithmetic and logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl BinOp {
    /// Whether `a op b == b op a`.
    #[inline]
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
        )
    }

    /// Whether evaluating the operation can fault. Integer division and
    /// remainder trap on a zero divisor, so they are never removable even
    /// when the result is unused.
    #[inline]
    #[must_use]
    pub const fn may_fault(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Rem)
    }

    /// Whether this is one of the three shifts.
    #[inline]
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }

    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Ushr => "ushr",
        }
    }
}

/// One-operand operations: negation and the primitive conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    NegInt,
    NegFloat,
    NegDouble,
    /// Truncate int to byte and sign-extend back.
    I2B,
    /// Truncate int to char (zero-extend).
    I2C,
    /// Truncate int to short and sign-extend back.
    I2S,
    I2F,
    I2D,
    F2I,
    F2D,
    D2I,
    D2F,
}

impl UnOp {
    /// The type of the defined variable.
    #[must_use]
    pub const fn result_type(self) -> ValueType {
        match self {
            UnOp::NegInt | UnOp::I2B | UnOp::I2C | UnOp::I2S | UnOp::F2I | UnOp::D2I => {
                ValueType::Int
            }
            UnOp::NegFloat | UnOp::I2F | UnOp::D2F => ValueType::Float,
            UnOp::NegDouble | UnOp::I2D | UnOp::F2D => ValueType::Double,
        }
    }

    /// Whether the lowering runs through the floating-point unit.
    #[inline]
    #[must_use]
    pub const fn uses_fpu(self) -> bool {
        matches!(
            self,
            UnOp::NegFloat
                | UnOp::NegDouble
                | UnOp::I2F
                | UnOp::I2D
                | UnOp::F2I
                | UnOp::F2D
                | UnOp::D2I
                | UnOp::D2F
        )
    }

    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            UnOp::NegInt => "neg.int",
            UnOp::NegFloat => "neg.float",
            UnOp::NegDouble => "neg.double",
            UnOp::I2B => "i2b",
            UnOp::I2C => "i2c",
            UnOp::I2S => "i2s",
            UnOp::I2F => "i2f",
            UnOp::I2D => "i2d",
            UnOp::F2I => "f2i",
            UnOp::F2D => "f2d",
            UnOp::D2I => "d2i",
            UnOp::D2F => "d2f",
        }
    }
}

/// Conditions for two-operand conditional branches. Integer compares are
/// signed; reference compares only ever use `Eq`/`Ne`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl BranchCond {
    /// The condition that holds after swapping the compared operands.
    #[must_use]
    pub const fn swapped(self) -> Self {
        match self {
            BranchCond::Eq => BranchCond::Eq,
            BranchCond::Ne => BranchCond::Ne,
            BranchCond::Lt => BranchCond::Gt,
            BranchCond::Ge => BranchCond::Le,
            BranchCond::Gt => BranchCond::Lt,
            BranchCond::Le => BranchCond::Ge,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            BranchCond::Eq => "==",
            BranchCond::Ne => "!=",
            BranchCond::Lt => "<",
            BranchCond::Ge => ">=",
            BranchCond::Gt => ">",
            BranchCond::Le => "<=",
        }
    }
}

/// NaN bias of a float/double three-way compare. The two compare forms
/// differ only in which way an unordered result resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpBias {
    /// Unordered compares as "less" (result -1).
    Less,
    /// Unordered compares as "greater" (result +1).
    Greater,
}

/// Call dispatch requested by the bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// No receiver; target known statically.
    Static,
    /// Receiver present; target known statically (constructors, private
    /// and super calls).
    Special,
    /// Receiver present; target through the receiver's dispatch table
    /// unless the resolved method is final.
    Virtual,
}

impl CallKind {
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            CallKind::Static => "static",
            CallKind::Special => "special",
            CallKind::Virtual => "virtual",
        }
    }

    /// Whether an object reference rides in front of the declared args.
    #[inline]
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !matches!(self, CallKind::Static)
    }
}

// =============================================================================
// Symbolic references
// =============================================================================

/// Constant-pool reference to a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(pub u16);

/// Constant-pool reference to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef(pub u16);

/// Constant-pool reference to a field, with its resolved signature kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub index: u16,
    pub kind: FieldKind,
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Quad kinds
// =============================================================================

/// The operation a quad performs.
#[derive(Debug, Clone, PartialEq)]
pub enum QuadKind {
    Binary {
        op: BinOp,
        ty: ValueType,
        dst: VarId,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnOp,
        dst: VarId,
        src: Operand,
    },
    Assign {
        ty: ValueType,
        dst: VarId,
        src: Operand,
    },
    Goto {
        target: Bci,
    },
    Branch {
        cond: BranchCond,
        lhs: Operand,
        rhs: Operand,
        target: Bci,
    },
    /// Three-way float/double compare producing -1, 0, or +1.
    FCmp {
        bias: CmpBias,
        ty: ValueType,
        dst: VarId,
        lhs: Operand,
        rhs: Operand,
    },
    ArrayLoad {
        elem: ElemKind,
        dst: VarId,
        array: Operand,
        index: Operand,
    },
    ArrayStore {
        elem: ElemKind,
        array: Operand,
        index: Operand,
        value: Operand,
    },
    ArrayLength {
        dst: VarId,
        array: Operand,
    },
    GetField {
        field: FieldRef,
        dst: VarId,
        object: Operand,
    },
    PutField {
        field: FieldRef,
        object: Operand,
        value: Operand,
    },
    GetStatic {
        field: FieldRef,
        dst: VarId,
    },
    PutStatic {
        field: FieldRef,
        value: Operand,
    },
    New {
        class: ClassRef,
        dst: VarId,
    },
    NewArray {
        elem: ElemKind,
        dst: VarId,
        length: Operand,
    },
    NewObjectArray {
        class: ClassRef,
        dst: VarId,
        length: Operand,
    },
    NewMultiArray {
        class: ClassRef,
        dst: VarId,
        dims: OperandList,
    },
    MonitorEnter {
        object: Operand,
    },
    MonitorExit {
        object: Operand,
    },
    Call {
        kind: CallKind,
        method: MethodRef,
        dst: Option<VarId>,
        args: OperandList,
    },
    Return {
        value: Option<(ValueType, Operand)>,
    },
    Throw {
        exception: Operand,
    },
    /// SSA join. Inputs are keyed by predecessor block; deconstruction
    /// dead-marks the phi in place after inserting edge copies.
    Phi {
        dst: VarId,
        args: PhiArgList,
    },
}

// =============================================================================
// Quad
// =============================================================================

/// One IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Quad {
    /// Linear position. Unique before fixup; contiguous in layout order
    /// after fixup.
    pub addr: u32,
    /// Bytecode index this quad was translated from.
    pub bci: Bci,
    /// Dead quads are skipped by every downstream pass but keep their
    /// slot in the block.
    pub dead: bool,
    pub kind: QuadKind,
}

impl Quad {
    #[must_use]
    pub fn new(addr: u32, bci: Bci, kind: QuadKind) -> Self {
        Self {
            addr,
            bci,
            dead: false,
            kind,
        }
    }

    /// The variable this quad defines, if any.
    #[must_use]
    pub fn defined(&self) -> Option<VarId> {
        match &self.kind {
            QuadKind::Binary { dst, .. }
            | QuadKind::Unary { dst, .. }
            | QuadKind::Assign { dst, .. }
            | QuadKind::FCmp { dst, .. }
            | QuadKind::ArrayLoad { dst, .. }
            | QuadKind::ArrayLength { dst, .. }
            | QuadKind::GetField { dst, .. }
            | QuadKind::GetStatic { dst, .. }
            | QuadKind::New { dst, .. }
            | QuadKind::NewArray { dst, .. }
            | QuadKind::NewObjectArray { dst, .. }
            | QuadKind::NewMultiArray { dst, .. }
            | QuadKind::Phi { dst, .. } => Some(*dst),
            QuadKind::Call { dst, .. } => *dst,
            QuadKind::Goto { .. }
            | QuadKind::Branch { .. }
            | QuadKind::ArrayStore { .. }
            | QuadKind::PutField { .. }
            | QuadKind::PutStatic { .. }
            | QuadKind::MonitorEnter { .. }
            | QuadKind::MonitorExit { .. }
            | QuadKind::Return { .. }
            | QuadKind::Throw { .. } => None,
        }
    }

    /// Mutable access to the defined variable, for renaming.
    pub fn defined_mut(&mut self) -> Option<&mut VarId> {
        match &mut self.kind {
            QuadKind::Binary { dst, .. }
            | QuadKind::Unary { dst, .. }
            | QuadKind::Assign { dst, .. }
            | QuadKind::FCmp { dst, .. }
            | QuadKind::ArrayLoad { dst, .. }
            | QuadKind::ArrayLength { dst, .. }
            | QuadKind::GetField { dst, .. }
            | QuadKind::GetStatic { dst, .. }
            | QuadKind::New { dst, .. }
            | QuadKind::NewArray { dst, .. }
            | QuadKind::NewObjectArray { dst, .. }
            | QuadKind::NewMultiArray { dst, .. }
            | QuadKind::Phi { dst, .. } => Some(dst),
            QuadKind::Call { dst, .. } => dst.as_mut(),
            _ => None,
        }
    }

    /// Visit every variable this quad uses. Constants are skipped, and
    /// the defined variable is not a use.
    pub fn for_each_use<F: FnMut(VarId)>(&self, mut f: F) {
        self.for_each_operand(|opnd| {
            if let Operand::Var(id) = opnd {
                f(id);
            }
        });
    }

    /// Visit every source operand.
    pub fn for_each_operand<F: FnMut(Operand)>(&self, mut f: F) {
        match &self.kind {
            QuadKind::Binary { lhs, rhs, .. }
            | QuadKind::Branch { lhs, rhs, .. }
            | QuadKind::FCmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            QuadKind::Unary { src, .. } | QuadKind::Assign { src, .. } => f(*src),
            QuadKind::ArrayLoad { array, index, .. } => {
                f(*array);
                f(*index);
            }
            QuadKind::ArrayStore {
                array,
                index,
                value,
                ..
            } => {
                f(*array);
                f(*index);
                f(*value);
            }
            QuadKind::ArrayLength { array, .. } => f(*array),
            QuadKind::GetField { object, .. } => f(*object),
            QuadKind::PutField { object, value, .. } => {
                f(*object);
                f(*value);
            }
            QuadKind::PutStatic { value, .. } => f(*value),
            QuadKind::NewArray { length, .. } | QuadKind::NewObjectArray { length, .. } => {
                f(*length)
            }
            QuadKind::NewMultiArray { dims, .. } => {
                for &d in dims {
                    f(d);
                }
            }
            QuadKind::MonitorEnter { object } | QuadKind::MonitorExit { object } => f(*object),
            QuadKind::Call { args, .. } => {
                for &a in args {
                    f(a);
                }
            }
            QuadKind::Return { value } => {
                if let Some((_, v)) = value {
                    f(*v);
                }
            }
            QuadKind::Throw { exception } => f(*exception),
            QuadKind::Phi { args, .. } => {
                for &(_, a) in args {
                    f(a);
                }
            }
            QuadKind::Goto { .. }
            | QuadKind::GetStatic { .. }
            | QuadKind::New { .. } => {}
        }
    }

    /// Visit every source operand mutably, for renaming and propagation.
    pub fn for_each_operand_mut<F: FnMut(&mut Operand)>(&mut self, mut f: F) {
        match &mut self.kind {
            QuadKind::Binary { lhs, rhs, .. }
            | QuadKind::Branch { lhs, rhs, .. }
            | QuadKind::FCmp { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            QuadKind::Unary { src, .. } | QuadKind::Assign { src, .. } => f(src),
            QuadKind::ArrayLoad { array, index, .. } => {
                f(array);
                f(index);
            }
            QuadKind::ArrayStore {
                array,
                index,
                value,
                ..
            } => {
                f(array);
                f(index);
                f(value);
            }
            QuadKind::ArrayLength { array, .. } => f(array),
            QuadKind::GetField { object, .. } => f(object),
            QuadKind::PutField { object, value, .. } => {
                f(object);
                f(value);
            }
            QuadKind::PutStatic { value, .. } => f(value),
            QuadKind::NewArray { length, .. } | QuadKind::NewObjectArray { length, .. } => {
                f(length)
            }
            QuadKind::NewMultiArray { dims, .. } => {
                for d in dims {
                    f(d);
                }
            }
            QuadKind::MonitorEnter { object } | QuadKind::MonitorExit { object } => f(object),
            QuadKind::Call { args, .. } => {
                for a in args {
                    f(a);
                }
            }
            QuadKind::Return { value } => {
                if let Some((_, v)) = value {
                    f(v);
                }
            }
            QuadKind::Throw { exception } => f(exception),
            QuadKind::Phi { args, .. } => {
                for (_, a) in args {
                    f(a);
                }
            }
            QuadKind::Goto { .. }
            | QuadKind::GetStatic { .. }
            | QuadKind::New { .. } => {}
        }
    }

    /// Whether this quad ends its basic block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            QuadKind::Goto { .. }
                | QuadKind::Branch { .. }
                | QuadKind::Return { .. }
                | QuadKind::Throw { .. }
        )
    }

    /// The bytecode index this quad branches to, if it branches.
    #[must_use]
    pub fn branch_target(&self) -> Option<Bci> {
        match self.kind {
            QuadKind::Goto { target } | QuadKind::Branch { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether this is a branch whose target does not lie ahead of it.
    #[must_use]
    pub fn is_backward_branch(&self) -> bool {
        self.branch_target().is_some_and(|t| t <= self.bci)
    }

    /// Whether machine state can escape to the runtime here. These
    /// positions pin call-crossing live ranges to callee-saved registers:
    /// explicit calls, allocations, monitor operations, throws, and the
    /// yieldpoint a backward branch carries.
    #[must_use]
    pub fn is_call_point(&self) -> bool {
        match self.kind {
            QuadKind::Call { .. }
            | QuadKind::New { .. }
            | QuadKind::NewArray { .. }
            | QuadKind::NewObjectArray { .. }
            | QuadKind::NewMultiArray { .. }
            | QuadKind::MonitorEnter { .. }
            | QuadKind::MonitorExit { .. }
            | QuadKind::Throw { .. } => true,
            _ => self.is_backward_branch(),
        }
    }

    /// Whether dead-code elimination may remove this quad once its result
    /// is unused. Only pure value computations qualify; faulting division,
    /// heap access, allocation, and control flow always stay.
    #[must_use]
    pub fn removable_if_unused(&self) -> bool {
        match self.kind {
            QuadKind::Binary { op, .. } => !op.may_fault(),
            QuadKind::Unary { .. } | QuadKind::Assign { .. } | QuadKind::Phi { .. } => true,
            _ => false,
        }
    }

    /// Mark this quad dead.
    pub fn kill(&mut self) {
        self.dead = true;
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.addr, self.kind)?;
        if self.dead {
            write!(f, "  [dead]")?;
        }
        Ok(())
    }
}

impl fmt::Display for QuadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuadKind::Binary {
                op,
                ty,
                dst,
                lhs,
                rhs,
            } => write!(f, "{dst} = {}.{} {lhs}, {rhs}", op.mnemonic(), ty.name()),
            QuadKind::Unary { op, dst, src } => write!(f, "{dst} = {} {src}", op.mnemonic()),
            QuadKind::Assign { dst, src, .. } => write!(f, "{dst} = {src}"),
            QuadKind::Goto { target } => write!(f, "goto {target}"),
            QuadKind::Branch {
                cond,
                lhs,
                rhs,
                target,
            } => write!(f, "if {lhs} {} {rhs} goto {target}", cond.symbol()),
            QuadKind::FCmp {
                bias,
                ty,
                dst,
                lhs,
                rhs,
            } => {
                let prefix = if *ty == ValueType::Double { "d" } else { "f" };
                let suffix = match bias {
                    CmpBias::Less => "l",
                    CmpBias::Greater => "g",
                };
                write!(f, "{dst} = {prefix}cmp{suffix} {lhs}, {rhs}")
            }
            QuadKind::ArrayLoad {
                elem,
                dst,
                array,
                index,
            } => write!(f, "{dst} = aload.{} {array}[{index}]", elem.name()),
            QuadKind::ArrayStore {
                elem,
                array,
                index,
                value,
            } => write!(f, "astore.{} {array}[{index}] = {value}", elem.name()),
            QuadKind::ArrayLength { dst, array } => write!(f, "{dst} = arraylength {array}"),
            QuadKind::GetField { field, dst, object } => {
                write!(f, "{dst} = getfield {field} {object}")
            }
            QuadKind::PutField {
                field,
                object,
                value,
            } => write!(f, "putfield {field} {object} = {value}"),
            QuadKind::GetStatic { field, dst } => write!(f, "{dst} = getstatic {field}"),
            QuadKind::PutStatic { field, value } => write!(f, "putstatic {field} = {value}"),
            QuadKind::New { class, dst } => write!(f, "{dst} = new {class}"),
            QuadKind::NewArray { elem, dst, length } => {
                write!(f, "{dst} = newarray.{} {length}", elem.name())
            }
            QuadKind::NewObjectArray { class, dst, length } => {
                write!(f, "{dst} = anewarray {class} {length}")
            }
            QuadKind::NewMultiArray { class, dst, dims } => {
                write!(f, "{dst} = multianewarray {class} [")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
            QuadKind::MonitorEnter { object } => write!(f, "monitorenter {object}"),
            QuadKind::MonitorExit { object } => write!(f, "monitorexit {object}"),
            QuadKind::Call {
                kind,
                method,
                dst,
                args,
            } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call.{} {method}(", kind.mnemonic())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            QuadKind::Return { value: None } => write!(f, "return"),
            QuadKind::Return {
                value: Some((_, v)),
            } => write!(f, "return {v}"),
            QuadKind::Throw { exception } => write!(f, "throw {exception}"),
            QuadKind::Phi { dst, args } => {
                write!(f, "{dst} = phi [")?;
                for (i, (block, a)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{block}:{a}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
