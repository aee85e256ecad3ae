//! Shared core types for the Garnet VM.
//!
//! This crate is a leaf dependency of every other Garnet crate. It holds:
//! - The unified compiler error type and result alias
//! - The primitive type model (value types, field descriptors, array
//!   element kinds)

pub mod error;
pub mod types;

pub use error::{ErrorKind, JitError, JitResult};
pub use types::{ElemKind, FieldKind, ValueType};
