//! Target backends.
//!
//! Only the 32-bit x86-style target is implemented; the IR and allocator
//! layers above this module are the portable part of the tier.

pub mod x86;
