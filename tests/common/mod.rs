use hepart::{Atom, GridView, Lico, ProatomSource};

/// Builds a lico from `(charge, coefficient)` pairs.
pub fn mixture(entries: &[(i32, f64)]) -> Lico {
    entries.iter().copied().collect()
}

/// Synthesizes a molecular density as a sum of per-atom reference mixtures,
/// evaluated on the grid. Using the same database splines the solver sees
/// makes the target exactly representable, so the recovered charges are the
/// mixture charges up to quadrature error.
pub fn synthesize_density<P: ProatomSource, G: GridView>(
    proatoms: &P,
    atoms: &[Atom],
    licos: &[Lico],
    grid: &G,
) -> Vec<f64> {
    let mut moldens = vec![0.0; grid.size()];
    let mut work = vec![0.0; grid.size()];
    for (atom, lico) in atoms.iter().zip(licos) {
        let spline = proatoms
            .spline(atom.atomic_number, Some(lico))
            .expect("reference mixture must be resolvable");
        grid.eval_spline(&spline, atom.position, &mut work);
        for (total, value) in moldens.iter_mut().zip(&work) {
            *total += value;
        }
    }
    moldens
}
