//! Constant folding over int quads.
//!
//! Folds `Binary` and `Unary` quads whose operands are all integer
//! constants, rewriting them into constant assignments with Java
//! evaluation rules: wrapping arithmetic, shift counts masked to five
//! bits, `MIN_VALUE / -1` wrapping back to `MIN_VALUE`. Division and
//! remainder by a constant zero are left alone so the runtime exception
//! still fires. Floating-point quads are never folded; the backend
//! materializes those constants instead.
//!
//! Commutative int ops with a constant on the left are also normalized
//! to put the constant on the right, which shrinks the operand shapes
//! the backend has to handle.

use crate::cfg::Cfg;
use crate::ir::{BinOp, MethodIr, Operand, QuadKind, UnOp};
use garnet_core::ValueType;

use super::QuadPass;

/// Evaluate an int binary op with Java semantics. `None` means the op
/// cannot be folded (division by zero).
pub(crate) fn eval_int_binary(op: BinOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinOp::And => a & b,
        BinOp::Or => a | b,
        BinOp::Xor => a ^ b,
        BinOp::Shl => a.wrapping_shl(b as u32),
        BinOp::Shr => a >> (b & 31),
        BinOp::Ushr => ((a as u32) >> (b as u32 & 31)) as i32,
    })
}

/// Evaluate an int unary op, or `None` when the op is not an int-to-int
/// operation and stays for the backend.
pub(crate) fn eval_int_unary(op: UnOp, a: i32) -> Option<i32> {
    Some(match op {
        UnOp::NegInt => a.wrapping_neg(),
        UnOp::I2B => a as i8 as i32,
        UnOp::I2C => a as u16 as i32,
        UnOp::I2S => a as i16 as i32,
        _ => return None,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FoldStats {
    /// Quads rewritten into constant assignments.
    pub folded: usize,
    /// Commutative quads whose constant moved to the right-hand side.
    pub normalized: usize,
}

/// The folding pass. Stats accumulate across runs.
#[derive(Debug, Default)]
pub struct Fold {
    pub stats: FoldStats,
}

impl Fold {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuadPass for Fold {
    fn name(&self) -> &'static str {
        "const-fold"
    }

    fn run(&mut self, ir: &mut MethodIr, cfg: &Cfg) -> usize {
        let mut changes = 0;
        for &b in cfg.rpo() {
            for quad in &mut ir.block_mut(b).quads {
                if quad.dead {
                    continue;
                }
                let rewrite = match &quad.kind {
                    QuadKind::Binary {
                        op,
                        ty: ValueType::Int,
                        dst,
                        lhs: Operand::Const(a),
                        rhs: Operand::Const(b),
                    } => match (a.as_int(), b.as_int()) {
                        (Some(a), Some(b)) => {
                            eval_int_binary(*op, a, b).map(|v| {
                                self.stats.folded += 1;
                                QuadKind::Assign {
                                    ty: ValueType::Int,
                                    dst: *dst,
                                    src: Operand::int(v),
                                }
                            })
                        }
                        _ => None,
                    },
                    QuadKind::Binary {
                        op,
                        ty: ValueType::Int,
                        dst,
                        lhs: Operand::Const(c),
                        rhs: rhs @ Operand::Var(_),
                    } if op.is_commutative() => {
                        self.stats.normalized += 1;
                        Some(QuadKind::Binary {
                            op: *op,
                            ty: ValueType::Int,
                            dst: *dst,
                            lhs: rhs.clone(),
                            rhs: Operand::Const(*c),
                        })
                    }
                    QuadKind::Unary {
                        op,
                        dst,
                        src: Operand::Const(c),
                    } => c.as_int().and_then(|a| eval_int_unary(*op, a)).map(|v| {
                        self.stats.folded += 1;
                        QuadKind::Assign {
                            ty: ValueType::Int,
                            dst: *dst,
                            src: Operand::int(v),
                        }
                    }),
                    _ => None,
                };
                if let Some(kind) = rewrite {
                    quad.kind = kind;
                    changes += 1;
                }
            }
        }
        changes
    }
}

// =============================================================================
// Tests
// =============================================================================
