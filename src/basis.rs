//! Deformation basis construction.
//!
//! The pro-molecule is parameterized as deviations from the neutral atoms:
//! every atom gets a small basis of deformation functions built from linear
//! combinations of its reference charge-state densities. Basing the
//! expansion on deviations lets very positive cations drop out of the basis
//! instead of demanding reference densities that do not exist.

use crate::error::HepartError;
use crate::math::spline::CubicSpline;
use crate::padb::{Lico, ProatomSource};
use crate::report::Reporter;

/// Tolerance for recognizing a fully ionized reference state with exactly
/// one remaining electron.
const COMPLETE_POPULATION_TOL: f64 = 1e-8;

/// The deformation basis of one atom.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisSpec {
    /// Offset of this atom's coefficients in the global vector.
    pub begin: usize,
    /// Number of deformation functions for this atom.
    pub nbasis: usize,
    /// The linear combinations defining each deformation function, in order.
    pub licos: Vec<Lico>,
}

/// Exportable metadata of the full basis: per-atom offset/size pairs and a
/// `"atom:label"` name per deformation function. Used for reporting only;
/// no component parses it back.
#[derive(Debug, Clone, PartialEq)]
pub struct BasisInfo {
    /// `(begin, nbasis)` per atom, in atom order.
    pub map: Vec<(usize, usize)>,
    /// One name per global coefficient.
    pub names: Vec<String>,
}

/// The pro-molecule deformation basis for a whole molecule.
///
/// Built once per partitioning run from the list of atomic numbers and a
/// proatom database. Atoms of the same element share the same basis shape,
/// but every atom owns a distinct, contiguous slice of the global
/// coefficient vector.
pub struct DeformationBasis<'p, P: ProatomSource> {
    proatoms: &'p P,
    numbers: Vec<u8>,
    specs: Vec<BasisSpec>,
    nbasis: usize,
}

impl<'p, P: ProatomSource> DeformationBasis<'p, P> {
    /// Builds the basis for the given atomic numbers.
    ///
    /// For each element the available charge states are fetched most
    /// positive first. When the most positive state is fully ionized down to
    /// a single electron the basis is "complete": it starts with that state
    /// alone and continues with differences of consecutive states.
    /// Otherwise every function is a difference of consecutive states. The
    /// ordering ties coefficient signs to adding or removing electrons and
    /// must not be changed.
    ///
    /// # Errors
    ///
    /// Returns [`HepartError::MissingProatomData`] when the database has no
    /// states for an element and [`HepartError::DegenerateBasis`] when an
    /// element yields zero deformation functions.
    pub fn new(
        numbers: Vec<u8>,
        proatoms: &'p P,
        reporter: &dyn Reporter,
    ) -> Result<Self, HepartError> {
        let mut specs = Vec::with_capacity(numbers.len());
        let mut nbasis = 0;

        for &number in &numbers {
            let charges = proatoms.charges(number, true)?;
            let Some(&most_positive) = charges.first() else {
                return Err(HepartError::MissingProatomData { number });
            };
            let record = proatoms.record(number, most_positive)?;
            let complete =
                (record.pseudo_population - 1.0).abs() < COMPLETE_POPULATION_TOL;
            let atom_nbasis = charges.len() - 1 + usize::from(complete);
            if atom_nbasis == 0 {
                return Err(HepartError::DegenerateBasis { number });
            }

            let mut licos = Vec::with_capacity(atom_nbasis);
            for j in 0..atom_nbasis {
                let lico: Lico = if complete {
                    if j == 0 {
                        [(charges[0], 1.0)].into_iter().collect()
                    } else {
                        [(charges[j], 1.0), (charges[j - 1], -1.0)].into_iter().collect()
                    }
                } else {
                    [(charges[j + 1], 1.0), (charges[j], -1.0)].into_iter().collect()
                };
                licos.push(lico);
            }

            specs.push(BasisSpec {
                begin: nbasis,
                nbasis: atom_nbasis,
                licos,
            });
            nbasis += atom_nbasis;
        }

        let basis = Self {
            proatoms,
            numbers,
            specs,
            nbasis,
        };
        basis.report_summary(reporter);
        Ok(basis)
    }

    fn report_summary(&self, reporter: &dyn Reporter) {
        reporter.info("Hirshfeld-E deformation basis");
        reporter.info("   atom    Z   k label");
        for i in 0..self.natom() {
            for j in 0..self.atom_nbasis(i) {
                reporter.info(&format!(
                    "{:7} {:4} {:3} {}",
                    i,
                    self.numbers[i],
                    j,
                    self.label(i, j)
                ));
            }
        }
    }

    /// The proatom database this basis was built from.
    pub fn proatoms(&self) -> &'p P {
        self.proatoms
    }

    /// Number of atoms in the molecule.
    pub fn natom(&self) -> usize {
        self.numbers.len()
    }

    /// Atomic number of atom `i`.
    pub fn number(&self, i: usize) -> u8 {
        self.numbers[i]
    }

    /// Total number of deformation functions across all atoms.
    pub fn total(&self) -> usize {
        self.nbasis
    }

    /// Offset of atom `i` in the global coefficient vector.
    pub fn atom_begin(&self, i: usize) -> usize {
        self.specs[i].begin
    }

    /// Number of deformation functions of atom `i`.
    pub fn atom_nbasis(&self, i: usize) -> usize {
        self.specs[i].nbasis
    }

    /// The linear combination defining deformation function `j` of atom `i`.
    pub fn lico(&self, i: usize, j: usize) -> &Lico {
        &self.specs[i].licos[j]
    }

    /// The frozen reference density of atom `i`: the neutral proatom.
    pub fn constant_spline(&self, i: usize) -> Result<CubicSpline, HepartError> {
        self.proatoms.spline(self.numbers[i], None)
    }

    /// Deformation function `j` of atom `i` as a radial spline.
    pub fn basis_spline(&self, i: usize, j: usize) -> Result<CubicSpline, HepartError> {
        self.proatoms.spline(self.numbers[i], Some(self.lico(i, j)))
    }

    /// Compact textual label of deformation function `j` of atom `i`.
    ///
    /// Charges are listed most positive first, nonzero charges with an
    /// explicit sign: `{+1: 1}` renders as `"+1"` and `{+1: 1, 0: -1}` as
    /// `"+1_0"`.
    pub fn label(&self, i: usize, j: usize) -> String {
        let mut charges: Vec<i32> = self.lico(i, j).keys().copied().collect();
        charges.sort_unstable_by(|a, b| b.cmp(a));
        charges
            .iter()
            .map(|&charge| {
                if charge == 0 {
                    "0".to_string()
                } else {
                    format!("{charge:+}")
                }
            })
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Offset map and names for reporting and result export.
    pub fn info(&self) -> BasisInfo {
        let mut map = Vec::with_capacity(self.natom());
        let mut names = Vec::with_capacity(self.nbasis);
        for i in 0..self.natom() {
            map.push((self.atom_begin(i), self.atom_nbasis(i)));
            for j in 0..self.atom_nbasis(i) {
                names.push(format!("{}:{}", i, self.label(i, j)));
            }
        }
        BasisInfo { map, names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::padb::TomlProatomDb;
    use crate::report::NullReporter;

    fn db(toml_str: &str) -> TomlProatomDb {
        TomlProatomDb::load_from_str(toml_str).unwrap()
    }

    #[test]
    fn hydrogen_with_bare_cation_is_not_complete() {
        // Most positive state (+1) has no electrons left, so the complete
        // flag (exactly one electron) is off and only one difference
        // function remains.
        let db = db(r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
            { charge = 1, pseudo_population = 0.0, exponent = 4.0 },
        ]
        "#);
        let basis = DeformationBasis::new(vec![1], &db, &NullReporter).unwrap();
        assert_eq!(basis.atom_nbasis(0), 1);
        assert_eq!(basis.total(), 1);
        let lico = basis.lico(0, 0);
        assert_eq!(lico.get(&0), Some(&1.0));
        assert_eq!(lico.get(&1), Some(&-1.0));
    }

    #[test]
    fn carbon_with_three_states_keeps_two_differences() {
        let db = db(r#"
        [elements.C]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = -1, pseudo_population = 7.0, exponent = 3.0 },
            { charge = 0, pseudo_population = 6.0, exponent = 3.2 },
            { charge = 1, pseudo_population = 5.0, exponent = 3.4 },
        ]
        "#);
        let basis = DeformationBasis::new(vec![6], &db, &NullReporter).unwrap();
        assert_eq!(basis.atom_nbasis(0), 2);
        assert_eq!(basis.lico(0, 0).get(&0), Some(&1.0));
        assert_eq!(basis.lico(0, 0).get(&1), Some(&-1.0));
        assert_eq!(basis.lico(0, 1).get(&-1), Some(&1.0));
        assert_eq!(basis.lico(0, 1).get(&0), Some(&-1.0));
    }

    #[test]
    fn complete_element_gains_an_absolute_function() {
        // The most positive state holds exactly one electron, so the basis
        // starts with that state alone.
        let db = db(r#"
        [elements.He]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 1, pseudo_population = 1.0, exponent = 3.0 },
            { charge = 0, pseudo_population = 2.0, exponent = 2.7 },
        ]
        "#);
        let basis = DeformationBasis::new(vec![2], &db, &NullReporter).unwrap();
        assert_eq!(basis.atom_nbasis(0), 2);
        assert_eq!(basis.lico(0, 0).len(), 1);
        assert_eq!(basis.lico(0, 0).get(&1), Some(&1.0));
        assert_eq!(basis.label(0, 0), "+1");
        assert_eq!(basis.label(0, 1), "+1_0");
    }

    #[test]
    fn offsets_are_contiguous_and_sum_to_total() {
        let db = db(r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
            { charge = -1, pseudo_population = 2.0, exponent = 1.4 },
        ]

        [elements.O]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 1, pseudo_population = 7.0, exponent = 4.4 },
            { charge = 0, pseudo_population = 8.0, exponent = 4.2 },
            { charge = -1, pseudo_population = 9.0, exponent = 4.0 },
            { charge = -2, pseudo_population = 10.0, exponent = 3.8 },
        ]
        "#);
        let basis = DeformationBasis::new(vec![1, 8, 1], &db, &NullReporter).unwrap();
        let mut expected_begin = 0;
        for i in 0..basis.natom() {
            assert_eq!(basis.atom_begin(i), expected_begin);
            expected_begin += basis.atom_nbasis(i);
        }
        assert_eq!(basis.total(), expected_begin);

        let info = basis.info();
        assert_eq!(info.map.len(), 3);
        assert_eq!(info.names.len(), basis.total());
        assert!(info.names[0].starts_with("0:"));
    }

    #[test]
    fn missing_element_fails_before_any_iteration_work() {
        let db = db(r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
            { charge = -1, pseudo_population = 2.0, exponent = 1.4 },
        ]
        "#);
        assert!(matches!(
            DeformationBasis::new(vec![1, 92], &db, &NullReporter),
            Err(HepartError::MissingProatomData { number: 92 })
        ));
    }

    #[test]
    fn single_incomplete_state_is_degenerate() {
        let db = db(r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [{ charge = 0, pseudo_population = 1.0, exponent = 2.0 }]
        "#);
        assert!(matches!(
            DeformationBasis::new(vec![1], &db, &NullReporter),
            Err(HepartError::DegenerateBasis { number: 1 })
        ));
    }

    #[test]
    fn summary_goes_to_the_reporter() {
        let db = db(r#"
        [elements.H]
        rmin = 2.0e-4
        rmax = 20.0
        npoint = 101
        states = [
            { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
            { charge = -1, pseudo_population = 2.0, exponent = 1.4 },
        ]
        "#);
        let reporter = crate::report::CapturingReporter::new();
        DeformationBasis::new(vec![1], &db, &reporter).unwrap();
        let lines = reporter.lines();
        assert!(lines.iter().any(|l| l.contains("deformation basis")));
        assert!(lines.iter().any(|l| l.contains("0_-1")));
    }
}
