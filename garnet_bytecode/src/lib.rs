//! Stack bytecode model for the Garnet VM.
//!
//! The compiler tier never interprets bytecode; it only needs to walk a
//! method's code once to decide whether every opcode is one it can lower.
//! This crate provides exactly that surface:
//! - [`Opcode`]: the opcode table with explicit discriminants and
//!   operand-length metadata
//! - [`reader::BytecodeReader`]: a bounds-checked `(offset, opcode)`
//!   iterator that skips operand bytes
//! - [`visitor::OpcodeVisitor`] and [`visitor::walk`]: the single-pass
//!   visitor used by the compatibility pre-checker

pub mod opcode;
pub mod reader;
pub mod visitor;

pub use opcode::Opcode;
pub use reader::BytecodeReader;
pub use visitor::{walk, OpcodeVisitor};
