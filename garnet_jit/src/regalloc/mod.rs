//! Storage assignment for quad variables.
//!
//! Two stages: [`liveness`] summarizes every variable as a single
//! interval over the final quad addresses, then [`linear_scan`] walks
//! the intervals once and hands out the five allocatable registers,
//! falling back to frame slots. Results land directly in the method's
//! variable pool as [`crate::ir::Location`] values; the frame builder
//! sizes the prologue from the returned [`Allocation`].

pub mod linear_scan;
pub mod liveness;

pub use linear_scan::{allocate, Allocation, AllocatorStats, ARG_BASE_DISP};
pub use liveness::{compute as compute_liveness, LiveRange, Liveness};
