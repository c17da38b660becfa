//! Grid-function evaluation strategies.
//!
//! The driver and assembler need basis and constant reference functions as
//! arrays over the molecular grid. The [`FunctionStore`] capability trait
//! hides whether those arrays are recomputed on demand ([`DirectStore`]) or
//! evaluated once and kept ([`CachedStore`]); the strategy is picked at
//! construction from [`DensityMode`](super::options::DensityMode).

use crate::basis::DeformationBasis;
use crate::error::HepartError;
use crate::grid::GridView;
use crate::padb::ProatomSource;
use std::collections::HashMap;

/// Access to per-atom grid arrays of the deformation basis.
pub(crate) trait FunctionStore {
    /// The neutral reference density of atom `i` on every grid point.
    fn constant_fn(&mut self, i: usize) -> Result<&[f64], HepartError>;

    /// Deformation function `j` of atom `i` on every grid point.
    fn basis_fn(&mut self, i: usize, j: usize) -> Result<&[f64], HepartError>;
}

fn eval_on_grid<P: ProatomSource, G: GridView>(
    basis: &DeformationBasis<'_, P>,
    grid: &G,
    positions: &[[f64; 3]],
    i: usize,
    j: Option<usize>,
    out: &mut [f64],
) -> Result<(), HepartError> {
    let spline = match j {
        Some(j) => basis.basis_spline(i, j)?,
        None => basis.constant_spline(i)?,
    };
    grid.eval_spline(&spline, positions[i], out);
    Ok(())
}

/// Strategy that re-evaluates splines into one scratch buffer per call.
pub(crate) struct DirectStore<'r, P: ProatomSource, G: GridView> {
    basis: &'r DeformationBasis<'r, P>,
    grid: &'r G,
    positions: &'r [[f64; 3]],
    scratch: Vec<f64>,
}

impl<'r, P: ProatomSource, G: GridView> DirectStore<'r, P, G> {
    pub(crate) fn new(
        basis: &'r DeformationBasis<'r, P>,
        grid: &'r G,
        positions: &'r [[f64; 3]],
    ) -> Self {
        Self {
            basis,
            grid,
            positions,
            scratch: vec![0.0; grid.size()],
        }
    }
}

impl<P: ProatomSource, G: GridView> FunctionStore for DirectStore<'_, P, G> {
    fn constant_fn(&mut self, i: usize) -> Result<&[f64], HepartError> {
        eval_on_grid(self.basis, self.grid, self.positions, i, None, &mut self.scratch)?;
        Ok(&self.scratch)
    }

    fn basis_fn(&mut self, i: usize, j: usize) -> Result<&[f64], HepartError> {
        eval_on_grid(self.basis, self.grid, self.positions, i, Some(j), &mut self.scratch)?;
        Ok(&self.scratch)
    }
}

/// Strategy that evaluates every function once and keeps the grid arrays.
pub(crate) struct CachedStore<'r, P: ProatomSource, G: GridView> {
    basis: &'r DeformationBasis<'r, P>,
    grid: &'r G,
    positions: &'r [[f64; 3]],
    constants: HashMap<usize, Vec<f64>>,
    functions: HashMap<(usize, usize), Vec<f64>>,
}

impl<'r, P: ProatomSource, G: GridView> CachedStore<'r, P, G> {
    pub(crate) fn new(
        basis: &'r DeformationBasis<'r, P>,
        grid: &'r G,
        positions: &'r [[f64; 3]],
    ) -> Self {
        Self {
            basis,
            grid,
            positions,
            constants: HashMap::new(),
            functions: HashMap::new(),
        }
    }
}

impl<P: ProatomSource, G: GridView> FunctionStore for CachedStore<'_, P, G> {
    fn constant_fn(&mut self, i: usize) -> Result<&[f64], HepartError> {
        if !self.constants.contains_key(&i) {
            let mut values = vec![0.0; self.grid.size()];
            eval_on_grid(self.basis, self.grid, self.positions, i, None, &mut values)?;
            self.constants.insert(i, values);
        }
        Ok(self
            .constants
            .get(&i)
            .expect("constant function inserted above"))
    }

    fn basis_fn(&mut self, i: usize, j: usize) -> Result<&[f64], HepartError> {
        let key = (i, j);
        if !self.functions.contains_key(&key) {
            let mut values = vec![0.0; self.grid.size()];
            eval_on_grid(self.basis, self.grid, self.positions, i, Some(j), &mut values)?;
            self.functions.insert(key, values);
        }
        Ok(self
            .functions
            .get(&key)
            .expect("basis function inserted above"))
    }
}
