//! The self-consistent partitioning solver.
//!
//! `HirshfeldESolver` drives the fixed-point iteration, `SolverOptions`
//! configures it, and `DensityMode` selects how basis functions are
//! materialized on the grid.

mod implementation;
mod options;
mod store;
mod system;

pub use implementation::HirshfeldESolver;
pub use options::{DensityMode, SolverOptions};
