//! Extended Hirshfeld (Hirshfeld-E) atoms-in-molecules charge partitioning.
//!
//! Given a molecular electron density on a numerical grid and a database of
//! reference isolated-atom densities, the solver iteratively determines, per
//! atom, a constrained linear combination of deformation densities and the
//! resulting partial charges that reproduce the molecular density as a sum
//! of atomic contributions.

pub mod basis;
pub mod error;
pub mod grid;
pub mod history;
pub mod math;
pub mod padb;
pub mod qp;
pub mod report;
pub mod solver;
pub mod types;

pub use crate::basis::{BasisInfo, BasisSpec, DeformationBasis};
pub use crate::error::HepartError;
pub use crate::grid::{AtomCenteredGrid, GridView};
pub use crate::history::{History, IterationSnapshot};
pub use crate::math::spline::CubicSpline;
pub use crate::padb::{Lico, ProatomRecord, ProatomSource, TomlProatomDb};
pub use crate::qp::{ActiveSetQp, LinearConstraint, QuadraticSolver};
pub use crate::report::{CapturingReporter, NullReporter, Reporter, TracingReporter};
pub use crate::solver::{DensityMode, HirshfeldESolver, SolverOptions};
pub use crate::types::{Atom, AtomView, PartitionResult};

use std::sync::OnceLock;

static DEFAULT_PROATOMS: OnceLock<TomlProatomDb> = OnceLock::new();

/// Returns the embedded default proatom table (H, C, N, O).
///
/// The table ships with the crate for reference calculations and tests;
/// production work should load element parameters fitted to the level of
/// theory that produced the molecular density.
pub fn get_default_proatoms() -> &'static TomlProatomDb {
    DEFAULT_PROATOMS.get_or_init(|| {
        const DEFAULT_PROATOMS_TOML: &str = include_str!("../resources/proatoms.toml");
        TomlProatomDb::load_from_str(DEFAULT_PROATOMS_TOML)
            .expect("Failed to parse embedded default proatom table. This is a library bug.")
    })
}
