//! Molecular integration grid contract.
//!
//! The partitioning core never builds grids itself; it consumes them through
//! the [`GridView`] trait: a point count, a weighted product integral, and
//! spline evaluation around a center. [`AtomCenteredGrid`] is the bundled
//! reference implementation for isolated atoms and well-separated systems.

use crate::error::HepartError;
use crate::math::quadrature;
use crate::math::spline::CubicSpline;
use crate::padb::ProatomSource;
use crate::types::AtomView;
use rayon::prelude::*;

/// Numerical integration grid over molecular space.
pub trait GridView {
    /// Number of grid points.
    fn size(&self) -> usize;

    /// Integral of the elementwise product of the given arrays against the
    /// grid weights. Every array must have [`size`](GridView::size) entries.
    fn integrate(&self, factors: &[&[f64]]) -> f64;

    /// Evaluates a radial spline centered at `center` on every grid point,
    /// overwriting `out`.
    fn eval_spline(&self, spline: &CubicSpline, center: [f64; 3], out: &mut [f64]);
}

/// Octahedral angular directions; exact for spherically symmetric functions
/// around the shell center.
const DIRECTIONS: [[f64; 3]; 6] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
];

/// Union of per-atom radial shell grids with octahedral angular sampling.
///
/// Each atom contributes its database radial grid as a set of shells; every
/// shell is represented by six points sharing the shell's Simpson volume
/// weight. Spherical densities around each center integrate exactly, so the
/// grid is adequate for isolated atoms and for molecules whose atomic
/// densities do not overlap appreciably. Production work on compact
/// molecules should substitute a proper molecular quadrature behind
/// [`GridView`].
#[derive(Debug, Clone)]
pub struct AtomCenteredGrid {
    points: Vec<[f64; 3]>,
    weights: Vec<f64>,
}

impl AtomCenteredGrid {
    /// Builds the union grid for a molecule from each element's radial grid.
    ///
    /// # Errors
    ///
    /// Returns [`HepartError::NonPositiveQuadratureWeight`] when an
    /// element's radial grid yields degenerate weights, and the database
    /// lookup errors when an element is absent.
    pub fn build<P: ProatomSource, A: AtomView>(
        proatoms: &P,
        atoms: &[A],
    ) -> Result<Self, HepartError> {
        let mut points = Vec::new();
        let mut weights = Vec::new();
        for atom in atoms {
            let number = atom.atomic_number();
            let center = atom.position();
            let rtf = proatoms.rtransform(number)?;
            let radial = quadrature::radial_weights(&rtf);
            if !radial.iter().all(|w| *w > 0.0) {
                return Err(HepartError::NonPositiveQuadratureWeight { number });
            }
            for (r, w) in rtf.radii().into_iter().zip(radial) {
                for direction in DIRECTIONS {
                    points.push([
                        center[0] + r * direction[0],
                        center[1] + r * direction[1],
                        center[2] + r * direction[2],
                    ]);
                    weights.push(w / DIRECTIONS.len() as f64);
                }
            }
        }
        Ok(Self { points, weights })
    }
}

impl GridView for AtomCenteredGrid {
    fn size(&self) -> usize {
        self.points.len()
    }

    fn integrate(&self, factors: &[&[f64]]) -> f64 {
        debug_assert!(factors.iter().all(|f| f.len() == self.weights.len()));
        self.weights
            .par_iter()
            .enumerate()
            .map(|(k, w)| w * factors.iter().map(|f| f[k]).product::<f64>())
            .sum()
    }

    fn eval_spline(&self, spline: &CubicSpline, center: [f64; 3], out: &mut [f64]) {
        out.par_iter_mut()
            .zip(self.points.par_iter())
            .for_each(|(value, point)| {
                let dx = point[0] - center[0];
                let dy = point[1] - center[1];
                let dz = point[2] - center[2];
                *value = spline.eval((dx * dx + dy * dy + dz * dz).sqrt());
            });
    }
}
