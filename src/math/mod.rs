//! Numerical building blocks for the radial side of the partitioning.
//!
//! The proatom densities live on per-element logarithmic radial grids; this
//! module provides the grid description, the composite Simpson quadrature
//! used to integrate over it, and the cubic spline form in which densities
//! are exchanged between the database, the grid engine, and the solver.

/// Composite Simpson weights and radial volume weights.
pub mod quadrature;

/// Exponential (logarithmic) radial grid description.
pub mod rtransform;

/// Natural cubic splines over radial knots.
pub mod spline;
