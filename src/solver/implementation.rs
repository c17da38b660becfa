//! The self-consistent Hirshfeld-E driver.
//!
//! One fixed-point iteration couples all atomic subproblems through the
//! shared pro-molecule density: each pass rebuilds the pro-molecule from the
//! current coefficients, re-partitions the molecular density into atomic
//! weights and charges, then solves every atom's constrained minimization
//! for new coefficients, until the coefficient update drops below the
//! threshold or the iteration cap is reached.

use super::options::{DensityMode, SolverOptions};
use super::store::{CachedStore, DirectStore, FunctionStore};
use super::system::{solve_coefficients, SystemAssembler};
use crate::basis::DeformationBasis;
use crate::error::HepartError;
use crate::grid::GridView;
use crate::history::History;
use crate::padb::ProatomSource;
use crate::qp::{ActiveSetQp, QuadraticSolver};
use crate::report::{NullReporter, Reporter};
use crate::types::{AtomView, PartitionResult};
use rayon::prelude::*;

/// Floor added to every proatom density so the pro-molecule denominator
/// never vanishes where all reference densities decay to zero.
const PROATOM_FLOOR: f64 = 1e-100;

/// Mutable state of one partitioning run.
///
/// Replaces the string-keyed array cache of older partitioning codes with
/// named fields: what the driver, assembler, and recorder exchange is
/// visible in the type.
struct RunContext {
    promolecule: Vec<f64>,
    at_weights: Vec<Vec<f64>>,
    charges: Vec<f64>,
    procoeffs: Vec<f64>,
    history: History,
}

impl RunContext {
    fn new(natom: usize, grid_size: usize, nbasis: usize) -> Self {
        Self {
            promolecule: vec![0.0; grid_size],
            at_weights: vec![vec![0.0; grid_size]; natom],
            charges: vec![0.0; natom],
            procoeffs: vec![0.0; nbasis],
            history: History::new(),
        }
    }
}

/// The extended Hirshfeld partitioning solver.
///
/// Holds the proatom database, a quadratic-programming backend, solver
/// options, and a diagnostics reporter. The generic quadratic solver
/// defaults to the bundled [`ActiveSetQp`].
///
/// # Examples
///
/// ```
/// use hepart::{
///     get_default_proatoms, Atom, AtomCenteredGrid, GridView, HirshfeldESolver, ProatomSource,
/// };
///
/// let proatoms = get_default_proatoms();
/// let atoms = vec![Atom { atomic_number: 1, position: [0.0; 3] }];
/// let grid = AtomCenteredGrid::build(proatoms, &atoms).unwrap();
///
/// // A neutral hydrogen density; the partitioning recovers a zero charge.
/// let spline = proatoms.spline(1, None).unwrap();
/// let mut moldens = vec![0.0; grid.size()];
/// grid.eval_spline(&spline, [0.0; 3], &mut moldens);
///
/// let solver = HirshfeldESolver::new(proatoms);
/// let result = solver.partition(&atoms, &grid, &moldens).unwrap();
/// assert!(result.converged);
/// assert!(result.charges[0].abs() < 1.0e-3);
/// ```
pub struct HirshfeldESolver<'p, P: ProatomSource, Q: QuadraticSolver = ActiveSetQp> {
    proatoms: &'p P,
    qp: Q,
    options: SolverOptions,
    reporter: Box<dyn Reporter>,
}

impl<'p, P: ProatomSource> HirshfeldESolver<'p, P> {
    /// Creates a solver with default options, the bundled quadratic solver,
    /// and a silent reporter.
    pub fn new(proatoms: &'p P) -> Self {
        Self {
            proatoms,
            qp: ActiveSetQp,
            options: SolverOptions::default(),
            reporter: Box::new(NullReporter),
        }
    }
}

impl<'p, P: ProatomSource, Q: QuadraticSolver> HirshfeldESolver<'p, P, Q> {
    /// Replaces the solver options.
    pub fn with_options(mut self, options: SolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the diagnostics reporter.
    pub fn with_reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// Replaces the quadratic-programming backend.
    pub fn with_quadratic_solver<Q2: QuadraticSolver>(
        self,
        qp: Q2,
    ) -> HirshfeldESolver<'p, P, Q2> {
        HirshfeldESolver {
            proatoms: self.proatoms,
            qp,
            options: self.options,
            reporter: self.reporter,
        }
    }

    /// Partitions a molecular density into atomic charges and deformation
    /// coefficients.
    ///
    /// `moldens` is the molecular electron density on the grid points, one
    /// value per point.
    ///
    /// # Errors
    ///
    /// Configuration errors (empty input, mismatched density length, missing
    /// proatom data) surface before any iteration. Numerical and feasibility
    /// errors abort the run immediately and come back wrapped in
    /// [`HepartError::Aborted`], which keeps the completed history
    /// accessible for post-mortem inspection. Reaching the iteration cap is
    /// not an error; see [`PartitionResult::converged`].
    pub fn partition<A: AtomView, G: GridView>(
        &self,
        atoms: &[A],
        grid: &G,
        moldens: &[f64],
    ) -> Result<PartitionResult, HepartError> {
        if atoms.is_empty() {
            return Err(HepartError::NoAtoms);
        }
        if moldens.len() != grid.size() {
            return Err(HepartError::GridSizeMismatch {
                expected: grid.size(),
                actual: moldens.len(),
            });
        }

        let numbers: Vec<u8> = atoms.iter().map(AtomView::atomic_number).collect();
        let pseudo_numbers: Vec<f64> = atoms.iter().map(AtomView::pseudo_number).collect();
        let positions: Vec<[f64; 3]> = atoms.iter().map(AtomView::position).collect();
        let basis = DeformationBasis::new(numbers, self.proatoms, self.reporter.as_ref())?;

        match self.options.mode {
            DensityMode::Direct => {
                let mut store = DirectStore::new(&basis, grid, &positions);
                self.run(&basis, grid, moldens, &pseudo_numbers, &mut store)
            }
            DensityMode::Cached => {
                let mut store = CachedStore::new(&basis, grid, &positions);
                self.run(&basis, grid, moldens, &pseudo_numbers, &mut store)
            }
        }
    }

    fn run<G: GridView, E: FunctionStore>(
        &self,
        basis: &DeformationBasis<'_, P>,
        grid: &G,
        moldens: &[f64],
        pseudo_numbers: &[f64],
        store: &mut E,
    ) -> Result<PartitionResult, HepartError> {
        let mut ctx = RunContext::new(basis.natom(), grid.size(), basis.total());

        let (converged, iterations) =
            match self.iterate(&mut ctx, basis, grid, moldens, pseudo_numbers, store) {
                Ok(outcome) => outcome,
                Err(error) => {
                    return Err(HepartError::Aborted {
                        source: Box::new(error),
                        history: ctx.history,
                    });
                }
            };

        let populations: Vec<f64> = ctx
            .charges
            .iter()
            .enumerate()
            .map(|(i, charge)| f64::from(basis.number(i)) - charge)
            .collect();
        let pseudo_populations: Vec<f64> = ctx
            .charges
            .iter()
            .zip(pseudo_numbers)
            .map(|(charge, pseudo)| pseudo - charge)
            .collect();

        Ok(PartitionResult {
            charges: ctx.charges,
            procoeffs: ctx.procoeffs,
            populations,
            pseudo_populations,
            iterations,
            converged,
            history: ctx.history,
            basis_info: basis.info(),
        })
    }

    /// The fixed-point loop proper; returns `(converged, iterations)`.
    fn iterate<G: GridView, E: FunctionStore>(
        &self,
        ctx: &mut RunContext,
        basis: &DeformationBasis<'_, P>,
        grid: &G,
        moldens: &[f64],
        pseudo_numbers: &[f64],
        store: &mut E,
    ) -> Result<(bool, u32), HepartError> {
        let natom = basis.natom();
        let mut assembler = SystemAssembler::new();
        let mut converged = false;
        let mut iterations = 0;

        for iteration in 1..=self.options.max_iterations {
            update_weights(ctx, basis, grid, moldens, pseudo_numbers, store)?;
            ctx.history.push(&ctx.charges, &ctx.procoeffs);

            let previous = ctx.procoeffs.clone();
            for atom in 0..natom {
                let target_charge = ctx.charges[atom];
                let system = assembler.assemble(
                    atom,
                    basis,
                    grid,
                    store,
                    &ctx.at_weights[atom],
                    moldens,
                    self.reporter.as_ref(),
                )?;
                let coefficients = solve_coefficients(
                    &self.qp,
                    &system,
                    atom,
                    target_charge,
                    self.options.rcond,
                    self.reporter.as_ref(),
                )?;
                let begin = basis.atom_begin(atom);
                for j in 0..basis.atom_nbasis(atom) {
                    ctx.procoeffs[begin + j] = coefficients.read(j);
                }
            }

            let delta = ctx
                .procoeffs
                .iter()
                .zip(&previous)
                .map(|(new, old)| (new - old).abs())
                .fold(0.0, f64::max);
            self.reporter.debug(&format!(
                "iteration {iteration}: max coefficient change {delta:.3e}"
            ));
            iterations = iteration;
            if delta < self.options.threshold {
                converged = true;
                break;
            }
        }

        if !converged {
            self.reporter.warn(&format!(
                "no convergence after {} iterations; returning the best available iterate",
                self.options.max_iterations
            ));
        }

        // One more weight pass so the reported charges reflect the final
        // coefficients even when the loop stopped on the coefficient delta.
        update_weights(ctx, basis, grid, moldens, pseudo_numbers, store)?;
        ctx.history.push(&ctx.charges, &ctx.procoeffs);

        Ok((converged, iterations))
    }
}

/// Rebuilds the pro-molecule, the atomic weights, and the charges from the
/// current coefficients. The pro-molecule reduction over all atoms completes
/// before any weight division starts.
fn update_weights<P: ProatomSource, G: GridView, E: FunctionStore>(
    ctx: &mut RunContext,
    basis: &DeformationBasis<'_, P>,
    grid: &G,
    moldens: &[f64],
    pseudo_numbers: &[f64],
    store: &mut E,
) -> Result<(), HepartError> {
    let RunContext {
        promolecule,
        at_weights,
        charges,
        procoeffs,
        ..
    } = ctx;
    let natom = basis.natom();

    promolecule.iter_mut().for_each(|value| *value = 0.0);
    for i in 0..natom {
        let buffer = &mut at_weights[i];
        {
            let constant = store.constant_fn(i)?;
            buffer.copy_from_slice(constant);
        }
        let begin = basis.atom_begin(i);
        for j in 0..basis.atom_nbasis(i) {
            let coefficient = procoeffs[begin + j];
            if coefficient == 0.0 {
                continue;
            }
            let function = store.basis_fn(i, j)?;
            buffer
                .par_iter_mut()
                .zip(function.par_iter())
                .for_each(|(value, f)| *value += coefficient * f);
        }
        buffer.par_iter_mut().for_each(|value| *value += PROATOM_FLOOR);
        promolecule
            .par_iter_mut()
            .zip(buffer.par_iter())
            .for_each(|(total, value)| *total += value);
    }

    for weights in at_weights.iter_mut() {
        weights
            .par_iter_mut()
            .zip(promolecule.par_iter())
            .for_each(|(weight, total)| *weight /= total);
    }

    for i in 0..natom {
        let pseudo_population = grid.integrate(&[at_weights[i].as_slice(), moldens]);
        charges[i] = pseudo_numbers[i] - pseudo_population;
    }

    Ok(())
}
