//! Configuration options for the partitioning solver.

/// How basis and reference functions are evaluated on the molecular grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DensityMode {
    /// Re-evaluate splines on demand into a scratch buffer. Lowest memory
    /// footprint; every use pays the evaluation cost again.
    Direct,
    /// Evaluate each basis and constant function once and keep the grid
    /// arrays for the rest of the run. Faster for more than a couple of
    /// iterations at the cost of one grid-sized array per function.
    #[default]
    Cached,
}

/// Numerical settings of the self-consistency loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// Convergence threshold on the coefficient update.
    ///
    /// The iteration stops once the largest absolute change of any
    /// deformation coefficient falls below this value. The coefficient delta
    /// is the canonical convergence metric; charges are recomputed from the
    /// final coefficients at finalization so both are always consistent.
    pub threshold: f64,
    /// Maximum number of self-consistency iterations.
    ///
    /// Exhausting the cap is reported as a warning and flagged on the
    /// result, not raised as an error; the best available iterate is
    /// returned.
    pub max_iterations: u32,
    /// Rank/feasibility tolerance handed to the quadratic solver.
    ///
    /// Zero requests the solver's default.
    pub rcond: f64,
    /// Grid-function evaluation strategy.
    pub mode: DensityMode,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            threshold: 1.0e-4,
            max_iterations: 500,
            rcond: 0.0,
            mode: DensityMode::Cached,
        }
    }
}
