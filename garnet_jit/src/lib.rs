//! Baseline JIT tier for the Garnet VM.
//!
//! Lowers a three-address quad IR (built from verified bytecode by the
//! front end) into native instructions for a 32-bit x86-style target:
//! - SSA construction, optimization, and deconstruction over a CFG
//! - Live-range analysis and linear-scan register allocation
//! - Frame layout and calling-convention handling
//! - Per-opcode instruction selection across all operand storage kinds,
//!   including the x87 evaluation-stack protocol, fixed div/shift
//!   register constraints, array bounds checks, and call dispatch
//!
//! The tier compiles one method at a time; a compatibility pre-check
//! rejects methods using bytecode this tier does not lower before any IR
//! is built. Emission targets an abstract instruction sink; byte encoding
//! lives behind it.

pub mod backend;
pub mod cache;
pub mod cfg;
pub mod codegen;
pub mod driver;
pub mod frame;
pub mod ir;
pub mod opt;
pub mod precheck;
pub mod regalloc;
pub mod runtime;

pub use driver::{CompiledMethod, MethodCompiler};
