mod common;

use approx::assert_relative_eq;
use common::{mixture, synthesize_density};
use hepart::{
    get_default_proatoms, Atom, AtomCenteredGrid, CapturingReporter, GridView, HepartError,
    HirshfeldESolver, SolverOptions, TomlProatomDb,
};

fn single_atom(number: u8) -> Vec<Atom> {
    vec![Atom {
        atomic_number: number,
        position: [0.0; 3],
    }]
}

#[test]
fn exhausted_iteration_cap_warns_but_returns_the_best_iterate() {
    let proatoms = get_default_proatoms();
    let atoms = single_atom(7);
    let grid = AtomCenteredGrid::build(proatoms, &atoms).unwrap();
    let moldens = synthesize_density(proatoms, &atoms, &[mixture(&[(0, 0.6), (-1, 0.4)])], &grid);

    let reporter = CapturingReporter::new();
    let result = HirshfeldESolver::new(proatoms)
        .with_options(SolverOptions {
            max_iterations: 1,
            ..SolverOptions::default()
        })
        .with_reporter(reporter.clone())
        .partition(&atoms, &grid, &moldens)
        .unwrap();

    assert!(!result.converged);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.history.len(), 2);
    // The best available iterate is still a full solution of iteration one.
    assert_relative_eq!(result.charges[0], -0.4, epsilon = 1e-6);
    assert!(reporter
        .lines()
        .iter()
        .any(|line| line.contains("no convergence after 1 iterations")));
}

#[test]
fn reporter_sees_basis_conditioning_and_iteration_output() {
    let proatoms = get_default_proatoms();
    let atoms = single_atom(7);
    let grid = AtomCenteredGrid::build(proatoms, &atoms).unwrap();
    let moldens = synthesize_density(proatoms, &atoms, &[mixture(&[(0, 1.0)])], &grid);

    let reporter = CapturingReporter::new();
    HirshfeldESolver::new(proatoms)
        .with_reporter(reporter.clone())
        .partition(&atoms, &grid, &moldens)
        .unwrap();

    let lines = reporter.lines();
    assert!(lines.iter().any(|l| l.contains("deformation basis")));
    assert!(lines.iter().any(|l| l.contains("condition number")));
    assert!(lines.iter().any(|l| l.contains("max coefficient change")));
}

#[test]
fn unrepresentable_charge_aborts_with_history_preserved() {
    // One difference function cannot express a +7 charge; the density is
    // zero everywhere, so the first charge update already overshoots.
    let proatoms = TomlProatomDb::load_from_str(
        r#"
        [elements.N]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 201
        states = [
            { charge = 0, pseudo_population = 7.0, exponent = 3.7 },
            { charge = -1, pseudo_population = 8.0, exponent = 3.5 },
        ]
        "#,
    )
    .unwrap();
    let atoms = single_atom(7);
    let grid = AtomCenteredGrid::build(&proatoms, &atoms).unwrap();
    let moldens = vec![0.0; grid.size()];

    let error = HirshfeldESolver::new(&proatoms)
        .partition(&atoms, &grid, &moldens)
        .unwrap_err();

    match error {
        HepartError::Aborted { source, history } => {
            assert_eq!(history.len(), 1);
            match *source {
                HepartError::InfeasibleCharge { atom, target, nbasis } => {
                    assert_eq!(atom, 0);
                    assert_relative_eq!(target, 7.0, epsilon = 1e-6);
                    assert_eq!(nbasis, 1);
                }
                other => panic!("expected InfeasibleCharge, got {other:?}"),
            }
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
}

#[test]
fn degenerate_deformation_basis_aborts_with_the_element_named() {
    // Two states with identical densities make their difference function
    // vanish, so the overlap diagonal picks up a zero.
    let proatoms = TomlProatomDb::load_from_str(
        r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 201
        states = [
            { charge = 1, pseudo_population = 1.0, exponent = 2.0 },
            { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
        ]
        "#,
    )
    .unwrap();
    let atoms = single_atom(1);
    let grid = AtomCenteredGrid::build(&proatoms, &atoms).unwrap();
    let moldens = synthesize_density(&proatoms, &atoms, &[mixture(&[(0, 1.0)])], &grid);

    let error = HirshfeldESolver::new(&proatoms)
        .partition(&atoms, &grid, &moldens)
        .unwrap_err();

    assert!(error.to_string().contains("element 1"));
    match error {
        HepartError::Aborted { source, .. } => {
            assert!(matches!(
                *source,
                HepartError::NonPositiveOverlapDiagonal { number: 1, index: 1 }
            ));
        }
        other => panic!("expected Aborted, got {other:?}"),
    }
}

#[test]
fn missing_element_fails_before_any_iteration() {
    let proatoms = get_default_proatoms();
    let atoms = single_atom(92);
    // A valid grid for a supported element keeps the failure on the basis.
    let grid = AtomCenteredGrid::build(proatoms, &single_atom(1)).unwrap();
    let moldens = vec![0.0; grid.size()];

    let error = HirshfeldESolver::new(proatoms)
        .partition(&atoms, &grid, &moldens)
        .unwrap_err();
    assert!(matches!(
        error,
        HepartError::MissingProatomData { number: 92 }
    ));
}

#[test]
fn input_validation_rejects_empty_and_mismatched_input() {
    let proatoms = get_default_proatoms();
    let atoms = single_atom(1);
    let grid = AtomCenteredGrid::build(proatoms, &atoms).unwrap();

    let solver = HirshfeldESolver::new(proatoms);
    assert!(matches!(
        solver.partition(&[] as &[Atom], &grid, &[]),
        Err(HepartError::NoAtoms)
    ));

    let short_density = vec![0.0; grid.size() - 1];
    match solver.partition(&atoms, &grid, &short_density) {
        Err(HepartError::GridSizeMismatch { expected, actual }) => {
            assert_eq!(expected, grid.size());
            assert_eq!(actual, grid.size() - 1);
        }
        other => panic!("expected GridSizeMismatch, got {other:?}"),
    }
}
