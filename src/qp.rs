//! Constrained quadratic programming primitive.
//!
//! The partitioning core treats the optimizer as a black box behind the
//! [`QuadraticSolver`] trait: minimize `x^T A x / 2 - B^T x` subject to
//! linear equality constraints and linear inequality constraints of the form
//! `coefficients . x >= rhs`. [`ActiveSetQp`] is the bundled implementation,
//! an active-set method over KKT systems sized for the small per-atom
//! problems this crate produces.

use crate::error::HepartError;
use faer::prelude::*;
use faer::{Col, ColRef, Mat, MatRef};
use std::panic::{self, AssertUnwindSafe};

/// One linear constraint row, `coefficients . x (= or >=) rhs`.
#[derive(Debug, Clone)]
pub struct LinearConstraint {
    /// The constraint row.
    pub coefficients: Col<f64>,
    /// The right-hand side.
    pub rhs: f64,
}

impl LinearConstraint {
    /// Convenience constructor from a closure over the coefficient index.
    pub fn from_fn(n: usize, rhs: f64, f: impl FnMut(usize) -> f64) -> Self {
        Self {
            coefficients: Col::from_fn(n, f),
            rhs,
        }
    }
}

/// Black-box constrained quadratic minimizer.
pub trait QuadraticSolver {
    /// Minimizes `x^T A x / 2 - B^T x` subject to `equalities` (exact) and
    /// `inequalities` (`coefficients . x >= rhs`).
    ///
    /// `rcond` is the caller's numerical tolerance; implementations use it
    /// to decide when a constraint counts as violated or a multiplier as
    /// negative. Zero requests the implementation default.
    fn solve(
        &self,
        a: MatRef<'_, f64>,
        b: ColRef<'_, f64>,
        equalities: &[LinearConstraint],
        inequalities: &[LinearConstraint],
        rcond: f64,
    ) -> Result<Col<f64>, HepartError>;
}

/// Active-set solver over dense KKT factorizations.
///
/// Starts from the equality-constrained minimizer and alternates between
/// activating the most violated inequality and releasing the active
/// constraint with the most negative multiplier until the iterate is both
/// feasible and optimal. Requires the objective to be positive definite on
/// the feasible subspace, which holds for the preconditioned overlap
/// systems this crate assembles.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveSetQp;

impl ActiveSetQp {
    fn solve_working_set(
        a: MatRef<'_, f64>,
        b: ColRef<'_, f64>,
        working: &[&LinearConstraint],
    ) -> Result<Col<f64>, HepartError> {
        let n = a.nrows();
        let m = n + working.len();

        let mut kkt = Mat::zeros(m, m);
        let mut rhs = Col::zeros(m);
        for i in 0..n {
            for j in 0..n {
                kkt.write(i, j, a.read(i, j));
            }
            rhs.write(i, b.read(i));
        }
        for (w, constraint) in working.iter().enumerate() {
            for j in 0..n {
                let coeff = constraint.coefficients.read(j);
                kkt.write(n + w, j, coeff);
                kkt.write(j, n + w, -coeff);
            }
            rhs.write(n + w, constraint.rhs);
        }

        let solve_result =
            panic::catch_unwind(AssertUnwindSafe(|| kkt.partial_piv_lu().solve(&rhs)));
        let solution = match solve_result {
            Ok(solution) => solution,
            Err(_) => {
                return Err(HepartError::LinalgError(
                    "KKT factorization panicked; the constrained system is likely singular"
                        .to_string(),
                ));
            }
        };
        if (0..m).any(|i| !solution.read(i).is_finite()) {
            return Err(HepartError::LinalgError(
                "KKT solve produced a non-finite solution; the constrained system is singular"
                    .to_string(),
            ));
        }
        Ok(solution)
    }
}

impl QuadraticSolver for ActiveSetQp {
    fn solve(
        &self,
        a: MatRef<'_, f64>,
        b: ColRef<'_, f64>,
        equalities: &[LinearConstraint],
        inequalities: &[LinearConstraint],
        rcond: f64,
    ) -> Result<Col<f64>, HepartError> {
        let n = a.nrows();
        if a.ncols() != n || b.nrows() != n {
            return Err(HepartError::LinalgError(format!(
                "quadratic solver shape mismatch: A is {}x{}, B has {} rows",
                a.nrows(),
                a.ncols(),
                b.nrows()
            )));
        }
        if equalities
            .iter()
            .chain(inequalities)
            .any(|c| c.coefficients.nrows() != n)
        {
            return Err(HepartError::LinalgError(
                "quadratic solver constraint rows do not match the problem size".to_string(),
            ));
        }

        let tol = if rcond > 0.0 { rcond } else { 1e-10 };
        let mut active = vec![false; inequalities.len()];

        // Each cycle either activates or releases one constraint; the cap is
        // far above anything the tiny per-atom systems can need.
        let max_cycles = 20 * (inequalities.len() + equalities.len() + 1);
        for _ in 0..max_cycles {
            let working: Vec<&LinearConstraint> = equalities
                .iter()
                .chain(
                    inequalities
                        .iter()
                        .zip(&active)
                        .filter(|(_, is_active)| **is_active)
                        .map(|(c, _)| c),
                )
                .collect();

            let solution = Self::solve_working_set(a, b, &working)?;
            let x = Col::from_fn(n, |i| solution.read(i));

            // Feasibility first: bring the most violated inactive inequality
            // into the working set.
            let mut worst_violation = tol;
            let mut worst_index = None;
            for (k, constraint) in inequalities.iter().enumerate() {
                if active[k] {
                    continue;
                }
                let mut value = 0.0;
                for j in 0..n {
                    value += constraint.coefficients.read(j) * x.read(j);
                }
                let violation = constraint.rhs - value;
                if violation > worst_violation {
                    worst_violation = violation;
                    worst_index = Some(k);
                }
            }
            if let Some(k) = worst_index {
                active[k] = true;
                continue;
            }

            // Optimality: release the active inequality with the most
            // negative multiplier, if any.
            let mut most_negative = -tol;
            let mut release_index = None;
            let mut slot = equalities.len();
            for (k, is_active) in active.iter().enumerate() {
                if !is_active {
                    continue;
                }
                let multiplier = solution.read(n + slot);
                if multiplier < most_negative {
                    most_negative = multiplier;
                    release_index = Some(k);
                }
                slot += 1;
            }
            if let Some(k) = release_index {
                active[k] = false;
                continue;
            }

            return Ok(x);
        }

        Err(HepartError::LinalgError(
            "active-set iteration limit reached without a feasible optimum".to_string(),
        ))
    }
}
