use crate::history::History;
use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all fallible operations in the `hepart` library.
///
/// Variants fall into three families. Configuration problems (missing proatom
/// data, malformed parameter files, empty input) are raised before any
/// iteration work starts. Numerical problems (degenerate radial grids,
/// non-positive overlap diagonals, singular solves) are terminal for the run;
/// the underlying basis or grid is structurally broken and retrying cannot
/// help. Feasibility problems are raised per atom before the quadratic
/// solver is invoked. Failure to converge is deliberately *not* an error:
/// the driver completes with the best available iterate and flags the result.
#[derive(Error, Debug)]
pub enum HepartError {
    /// The proatom database has no usable charge states for a required
    /// element. Raised at basis-build time, before any iteration work.
    #[error("Proatom database has no charge states for element with atomic number: {number}")]
    MissingProatomData {
        /// The atomic number that could not be resolved.
        number: u8,
    },

    /// A specific (element, charge) record or spline was requested but is
    /// absent from the proatom database.
    #[error("Proatom database has no record for element {number} at charge {charge:+}")]
    ProatomLookup {
        /// The atomic number of the failed lookup.
        number: u8,
        /// The charge state of the failed lookup.
        charge: i32,
    },

    /// The available charge states for an element yield zero deformation
    /// basis functions, so no charge rearrangement can be represented.
    #[error("Element {number} yields an empty deformation basis; at least two charge states (or one fully ionized state) are required")]
    DegenerateBasis {
        /// The atomic number with the degenerate basis.
        number: u8,
    },

    /// A radial quadrature weight came out non-positive or non-finite,
    /// indicating a degenerate radial grid for the element.
    #[error("Radial quadrature weights for element {number} are not strictly positive; the radial grid is degenerate")]
    NonPositiveQuadratureWeight {
        /// The atomic number whose radial grid is degenerate.
        number: u8,
    },

    /// The basis overlap matrix has a zero or negative diagonal entry, which
    /// means the deformation basis is degenerate or linearly dependent.
    #[error("Basis overlap matrix for element {number} has a non-positive diagonal entry at index {index}")]
    NonPositiveOverlapDiagonal {
        /// The atomic number whose overlap matrix is degenerate.
        number: u8,
        /// The offending diagonal index.
        index: usize,
    },

    /// The target charge of an atom exceeds what its deformation basis can
    /// represent. Detected before the quadratic solver is invoked.
    #[error("The charge on atom {atom} is too positive to represent: {target} > {nbasis} basis functions (infeasible)")]
    InfeasibleCharge {
        /// Index of the atom within the molecule.
        atom: usize,
        /// The equality-constraint target charge.
        target: f64,
        /// The number of deformation basis functions for this atom.
        nbasis: usize,
    },

    /// A failure within the underlying linear algebra, for example a
    /// singular KKT system or a non-finite solution.
    #[error("Failed to solve the linear matrix system: {0}")]
    LinalgError(String),

    /// Spline construction was given inconsistent knot data.
    #[error("Invalid spline knots: {0}")]
    InvalidSpline(String),

    /// The molecular density array does not match the grid point count.
    #[error("Density array length {actual} does not match grid size {expected}")]
    GridSizeMismatch {
        /// Number of points the grid exposes.
        expected: usize,
        /// Length of the supplied density array.
        actual: usize,
    },

    /// An I/O error while reading a proatom parameter file.
    #[error("I/O error at path '{path}': {source}")]
    IoError {
        /// The path of the file that caused the I/O error.
        path: PathBuf,
        /// The underlying `std::io::Error`.
        #[source]
        source: std::io::Error,
    },

    /// A parse error in a proatom parameter file.
    #[error("Failed to deserialize TOML proatom parameters: {0}")]
    DeserializationError(#[from] toml::de::Error),

    /// The input slice of atoms was empty.
    #[error("Input validation failed: at least one atom is required for a partitioning")]
    NoAtoms,

    /// A numerical or feasibility failure aborted the iteration loop.
    ///
    /// The snapshots recorded before the failure stay accessible here for
    /// post-mortem inspection.
    #[error("Partitioning aborted after {n} recorded iteration snapshots: {source}", n = .history.len())]
    Aborted {
        /// The failure that ended the run.
        #[source]
        source: Box<HepartError>,
        /// Everything recorded before the failure.
        history: History,
    },
}
