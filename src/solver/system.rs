//! Per-atom linear system assembly and the constrained-solver adapter.
//!
//! The overlap matrix `A` of an atom's deformation basis depends only on the
//! reference densities, so it is assembled from radial integrals once per
//! element and cached for the rest of the run, together with its diagonal
//! preconditioner. The target vector `B` tracks the evolving molecular
//! density and is rebuilt for every atom in every iteration. The adapter
//! turns the preconditioned system into the constraint form the quadratic
//! primitive expects and un-scales the returned coefficients.

use crate::basis::DeformationBasis;
use crate::error::HepartError;
use crate::grid::GridView;
use crate::math::quadrature::{radial_dot, radial_weights};
use crate::padb::ProatomSource;
use crate::qp::{LinearConstraint, QuadraticSolver};
use crate::report::Reporter;
use crate::solver::store::FunctionStore;
use faer::{Col, Mat, Side};
use std::collections::HashMap;

/// Density-independent part of an atom's linear system, shared by all atoms
/// of the same element.
#[derive(Debug)]
pub(crate) struct ElementSystem {
    /// Preconditioned overlap matrix.
    a: Mat<f64>,
    /// `sqrt(diag(A))` of the raw overlap matrix.
    scales: Col<f64>,
    /// Radial overlap of each basis function with the constant reference.
    constant_overlap: Vec<f64>,
}

/// The assembled, preconditioned system of one atom for one iteration.
pub(crate) struct AtomicSystem<'a> {
    element: &'a ElementSystem,
    b: Col<f64>,
    /// Squared norm of the atomic target residual, for the rrmsd diagnostic.
    residual_norm: f64,
    nbasis: usize,
}

/// Builds and caches per-element overlap systems.
pub(crate) struct SystemAssembler {
    cache: HashMap<u8, ElementSystem>,
}

impl SystemAssembler {
    pub(crate) fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Assembles `(A, B, scales)` for one atom against the current density.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble<'a, P, G, E>(
        &'a mut self,
        atom: usize,
        basis: &DeformationBasis<'_, P>,
        grid: &G,
        store: &mut E,
        at_weights: &[f64],
        moldens: &[f64],
        reporter: &dyn Reporter,
    ) -> Result<AtomicSystem<'a>, HepartError>
    where
        P: ProatomSource,
        G: GridView,
        E: FunctionStore,
    {
        let number = basis.number(atom);
        let nbasis = basis.atom_nbasis(atom);
        if !self.cache.contains_key(&number) {
            let element = build_element_system(atom, basis, reporter)?;
            self.cache.insert(number, element);
        }
        let element = self
            .cache
            .get(&number)
            .expect("element system inserted above");

        // B couples each basis function to the part of the atomic density
        // not explained by the frozen reference; recomputed every iteration.
        let mut b = Col::zeros(nbasis);
        for j in 0..nbasis {
            let function = store.basis_fn(atom, j)?;
            let value = grid.integrate(&[at_weights, moldens, function])
                - element.constant_overlap[j];
            b.write(j, value / element.scales.read(j));
        }

        let constant = store.constant_fn(atom)?;
        let aim: Vec<f64> = at_weights
            .iter()
            .zip(moldens)
            .zip(constant)
            .map(|((w, d), c)| w * d - c)
            .collect();
        let residual_norm = grid.integrate(&[aim.as_slice(), aim.as_slice()]);

        Ok(AtomicSystem {
            element,
            b,
            residual_norm,
            nbasis,
        })
    }
}

/// Radial assembly of one element's overlap system.
fn build_element_system<P: ProatomSource>(
    atom: usize,
    basis: &DeformationBasis<'_, P>,
    reporter: &dyn Reporter,
) -> Result<ElementSystem, HepartError> {
    let number = basis.number(atom);
    let nbasis = basis.atom_nbasis(atom);

    let rtf = basis.proatoms().rtransform(number)?;
    let weights = radial_weights(&rtf);
    if !weights.iter().all(|w| *w > 0.0) {
        return Err(HepartError::NonPositiveQuadratureWeight { number });
    }

    let mut basis_values = Vec::with_capacity(nbasis);
    for j in 0..nbasis {
        basis_values.push(basis.basis_spline(atom, j)?.y().to_vec());
    }
    let constant_values = basis.constant_spline(atom)?.y().to_vec();

    let mut a = Mat::zeros(nbasis, nbasis);
    for j0 in 0..nbasis {
        for j1 in 0..=j0 {
            let value = radial_dot(&weights, &basis_values[j0], &basis_values[j1]);
            a.write(j0, j1, value);
            a.write(j1, j0, value);
        }
    }
    for j in 0..nbasis {
        if !(a.read(j, j) > 0.0) {
            return Err(HepartError::NonPositiveOverlapDiagonal { number, index: j });
        }
    }

    let scales = Col::from_fn(nbasis, |j| a.read(j, j).sqrt());
    for j0 in 0..nbasis {
        for j1 in 0..nbasis {
            let value = a.read(j0, j1) / (scales.read(j0) * scales.read(j1));
            a.write(j0, j1, value);
        }
    }

    let evd = a.selfadjoint_eigendecomposition(Side::Lower);
    let mut smallest = f64::INFINITY;
    let mut largest = 0.0f64;
    for j in 0..nbasis {
        let magnitude = evd.s().column_vector().read(j).abs();
        smallest = smallest.min(magnitude);
        largest = largest.max(magnitude);
    }
    let mut scale_min = f64::INFINITY;
    let mut scale_max = 0.0f64;
    for j in 0..nbasis {
        let magnitude = scales.read(j).abs();
        scale_min = scale_min.min(magnitude);
        scale_max = scale_max.max(magnitude);
    }
    reporter.info(&format!(
        "element {}: condition number {:.5e}, scale spread {:.5e}",
        number,
        largest / smallest,
        scale_max / scale_min
    ));

    let constant_overlap = basis_values
        .iter()
        .map(|values| radial_dot(&weights, values, &constant_values))
        .collect();

    Ok(ElementSystem {
        a,
        scales,
        constant_overlap,
    })
}

/// Solves the constrained minimization for one atom and un-scales the result.
///
/// The equality constraint pins the coefficient sum to the atom's electron
/// excess (the negated target charge); each coefficient is bounded below by
/// -1 so no deformation removes more density than its reference difference
/// carries. Infeasibility is detected from the target alone, before the
/// quadratic primitive runs.
pub(crate) fn solve_coefficients<Q: QuadraticSolver>(
    qp: &Q,
    system: &AtomicSystem<'_>,
    atom: usize,
    target_charge: f64,
    rcond: f64,
    reporter: &dyn Reporter,
) -> Result<Col<f64>, HepartError> {
    let nbasis = system.nbasis;
    if target_charge > nbasis as f64 {
        return Err(HepartError::InfeasibleCharge {
            atom,
            target: target_charge,
            nbasis,
        });
    }

    let scales = &system.element.scales;
    let population = LinearConstraint::from_fn(nbasis, -target_charge, |j| 1.0 / scales.read(j));
    let bounds: Vec<LinearConstraint> = (0..nbasis)
        .map(|j| {
            LinearConstraint::from_fn(nbasis, -1.0, |k| {
                if k == j { 1.0 / scales.read(j) } else { 0.0 }
            })
        })
        .collect();

    let scaled = qp.solve(
        system.element.a.as_ref(),
        system.b.as_ref(),
        &[population],
        &bounds,
        rcond,
    )?;

    // Diagnostic relative residual of the fit, in the preconditioned frame.
    let fitted = &system.element.a * &scaled;
    let mut bilinear = 0.0;
    for j in 0..nbasis {
        bilinear += (fitted.read(j) - 2.0 * system.b.read(j)) * scaled.read(j);
    }
    let rrmsd = if system.residual_norm > 1e-30 {
        (bilinear / system.residual_norm + 1.0).max(0.0).sqrt()
    } else {
        0.0
    };

    let coefficients = Col::from_fn(nbasis, |j| scaled.read(j) / scales.read(j));
    let rendered: Vec<String> = (0..nbasis)
        .map(|j| format!("{:7.3}", coefficients.read(j)))
        .collect();
    reporter.debug(&format!(
        "atom {:4} ({:3.0}%): {}",
        atom,
        rrmsd * 100.0,
        rendered.join(" ")
    ));

    Ok(coefficients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::rtransform::RadialTransform;
    use crate::math::spline::CubicSpline;
    use crate::padb::{Lico, ProatomRecord};
    use crate::qp::ActiveSetQp;
    use crate::report::NullReporter;
    use approx::assert_relative_eq;

    /// Database whose radial grid runs backwards; the splines themselves are
    /// well formed, so the degenerate quadrature weights are what must trip
    /// the assembler.
    struct BrokenRadialDb;

    impl ProatomSource for BrokenRadialDb {
        fn charges(&self, _number: u8, _safe: bool) -> Result<Vec<i32>, HepartError> {
            Ok(vec![1, 0])
        }

        fn record(&self, number: u8, charge: i32) -> Result<ProatomRecord, HepartError> {
            Ok(ProatomRecord {
                number,
                charge,
                pseudo_population: if charge == 1 { 0.0 } else { 1.0 },
            })
        }

        fn spline(&self, _number: u8, _lico: Option<&Lico>) -> Result<CubicSpline, HepartError> {
            CubicSpline::new(vec![0.1, 1.0, 2.0, 3.0], vec![1.0, 0.5, 0.2, 0.1])
        }

        fn rtransform(&self, _number: u8) -> Result<RadialTransform, HepartError> {
            Ok(RadialTransform::new(10.0, 0.1, 4))
        }
    }

    /// Database whose deformation splines are identically zero, producing a
    /// zero diagonal in the overlap matrix.
    struct DegenerateOverlapDb;

    impl ProatomSource for DegenerateOverlapDb {
        fn charges(&self, _number: u8, _safe: bool) -> Result<Vec<i32>, HepartError> {
            Ok(vec![1, 0])
        }

        fn record(&self, number: u8, charge: i32) -> Result<ProatomRecord, HepartError> {
            Ok(ProatomRecord {
                number,
                charge,
                pseudo_population: if charge == 1 { 0.0 } else { 1.0 },
            })
        }

        fn spline(&self, _number: u8, lico: Option<&Lico>) -> Result<CubicSpline, HepartError> {
            let x = vec![0.1, 1.0, 2.0, 3.0];
            let y = match lico {
                Some(_) => vec![0.0; 4],
                None => vec![1.0, 0.5, 0.2, 0.1],
            };
            CubicSpline::new(x, y)
        }

        fn rtransform(&self, _number: u8) -> Result<RadialTransform, HepartError> {
            Ok(RadialTransform::new(0.1, 3.0, 4))
        }
    }

    #[test]
    fn backward_radial_grid_is_a_numerical_error() {
        let db = BrokenRadialDb;
        let basis = DeformationBasis::new(vec![1], &db, &NullReporter).unwrap();
        assert!(matches!(
            build_element_system(0, &basis, &NullReporter),
            Err(HepartError::NonPositiveQuadratureWeight { number: 1 })
        ));
    }

    #[test]
    fn zero_overlap_diagonal_names_the_element() {
        let db = DegenerateOverlapDb;
        let basis = DeformationBasis::new(vec![1], &db, &NullReporter).unwrap();
        let error = build_element_system(0, &basis, &NullReporter).unwrap_err();
        assert!(matches!(
            error,
            HepartError::NonPositiveOverlapDiagonal { number: 1, index: 0 }
        ));
        assert!(error.to_string().contains("element 1"));
    }

    fn plain_system(nbasis: usize, b: &[f64]) -> (ElementSystem, Col<f64>) {
        let element = ElementSystem {
            a: Mat::from_fn(nbasis, nbasis, |i, j| if i == j { 1.0 } else { 0.0 }),
            scales: Col::from_fn(nbasis, |_| 1.0),
            constant_overlap: vec![0.0; nbasis],
        };
        let b = Col::from_fn(nbasis, |j| b[j]);
        (element, b)
    }

    struct PanickingQp;

    impl QuadraticSolver for PanickingQp {
        fn solve(
            &self,
            _a: faer::MatRef<'_, f64>,
            _b: faer::ColRef<'_, f64>,
            _equalities: &[LinearConstraint],
            _inequalities: &[LinearConstraint],
            _rcond: f64,
        ) -> Result<Col<f64>, HepartError> {
            panic!("the quadratic primitive must not run for an infeasible target");
        }
    }

    #[test]
    fn infeasible_target_is_rejected_before_the_solver_runs() {
        let (element, b) = plain_system(2, &[0.0, 0.0]);
        let system = AtomicSystem {
            element: &element,
            b,
            residual_norm: 1.0,
            nbasis: 2,
        };
        let result =
            solve_coefficients(&PanickingQp, &system, 3, 5.0, 0.0, &NullReporter);
        match result {
            Err(HepartError::InfeasibleCharge { atom, target, nbasis }) => {
                assert_eq!(atom, 3);
                assert_eq!(target, 5.0);
                assert_eq!(nbasis, 2);
            }
            other => panic!("expected InfeasibleCharge, got {other:?}"),
        }
    }

    #[test]
    fn infeasible_message_names_atom_target_and_basis_size() {
        let error = HepartError::InfeasibleCharge {
            atom: 3,
            target: 5.0,
            nbasis: 2,
        };
        let message = error.to_string();
        assert!(message.contains('3'));
        assert!(message.contains('5'));
        assert!(message.contains('2'));
    }

    #[test]
    fn coefficient_sum_matches_the_electron_excess() {
        let (element, b) = plain_system(2, &[0.4, -0.1]);
        let system = AtomicSystem {
            element: &element,
            b,
            residual_norm: 1.0,
            nbasis: 2,
        };
        let target_charge = -0.6;
        let coefficients =
            solve_coefficients(&ActiveSetQp, &system, 0, target_charge, 0.0, &NullReporter)
                .unwrap();
        let total = coefficients.read(0) + coefficients.read(1);
        assert_relative_eq!(total, -target_charge, epsilon = 1e-8);
        assert!(coefficients.read(0) >= -1.0 - 1e-8);
        assert!(coefficients.read(1) >= -1.0 - 1e-8);
    }
}
