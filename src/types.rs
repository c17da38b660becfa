//! Core types for representing atoms and partitioning results.
//!
//! The `AtomView` trait abstracts atom data access so the partitioning solver
//! can work with any molecular data structure, the `Atom` struct provides a
//! simple owned implementation, and `PartitionResult` carries the outcome of
//! a full Hirshfeld-E run including its iteration history.

use crate::basis::BasisInfo;
use crate::history::History;

/// A trait for viewing atom data without owning it.
///
/// The solver only needs an atomic number, a position, and a pseudo-nuclear
/// charge per atom. Implementing this trait on an existing molecular
/// representation avoids any data conversion when calling into `hepart`.
pub trait AtomView {
    /// Returns the atomic number of the atom.
    fn atomic_number(&self) -> u8;

    /// Returns the 3D position of the atom in Bohr.
    fn position(&self) -> [f64; 3];

    /// Returns the pseudo-nuclear charge of the atom.
    ///
    /// For all-electron densities this equals the atomic number; effective
    /// core potential users override it with the core-corrected value.
    fn pseudo_number(&self) -> f64 {
        f64::from(self.atomic_number())
    }
}

/// A concrete atom with atomic number and position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atom {
    /// The atomic number of the atom, identifying its chemical element.
    pub atomic_number: u8,
    /// The 3D position of the atom in Bohr.
    pub position: [f64; 3],
}

impl AtomView for Atom {
    #[inline(always)]
    fn atomic_number(&self) -> u8 {
        self.atomic_number
    }

    #[inline(always)]
    fn position(&self) -> [f64; 3] {
        self.position
    }
}

/// The result of a Hirshfeld-E partitioning run.
///
/// Charges, populations, and coefficients are mutually consistent: the driver
/// recomputes the charges from the final coefficients before returning, even
/// when the iteration stopped on the coefficient-based criterion.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    /// The partial atomic charge of each atom, in input order.
    pub charges: Vec<f64>,
    /// The global deformation coefficient vector; atom slices are located
    /// through [`BasisInfo`].
    pub procoeffs: Vec<f64>,
    /// Electron populations, `atomic number - charge`.
    pub populations: Vec<f64>,
    /// Pseudo populations, `pseudo number - charge`.
    pub pseudo_populations: Vec<f64>,
    /// Number of self-consistency iterations performed.
    pub iterations: u32,
    /// Whether the coefficient change dropped below the threshold before the
    /// iteration cap. A `false` value means the best available iterate was
    /// returned; callers decide whether that is acceptable.
    pub converged: bool,
    /// Per-iteration snapshots of charges and coefficients, plus one final
    /// snapshot appended at finalization.
    pub history: History,
    /// Offset/size map and textual labels of the deformation basis.
    pub basis_info: BasisInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EcpAtom {
        number: u8,
        core: f64,
    }

    impl AtomView for EcpAtom {
        fn atomic_number(&self) -> u8 {
            self.number
        }

        fn position(&self) -> [f64; 3] {
            [0.0; 3]
        }

        fn pseudo_number(&self) -> f64 {
            f64::from(self.number) - self.core
        }
    }

    #[test]
    fn default_pseudo_number_equals_atomic_number() {
        let atom = Atom {
            atomic_number: 8,
            position: [0.0, 0.0, 1.2],
        };
        assert_eq!(atom.pseudo_number(), 8.0);
    }

    #[test]
    fn pseudo_number_can_be_overridden() {
        let atom = EcpAtom { number: 26, core: 10.0 };
        assert_eq!(atom.pseudo_number(), 16.0);
    }
}
