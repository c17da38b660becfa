//! Proatom reference data.
//!
//! The solver consumes isolated-atom densities through the [`ProatomSource`]
//! trait: available charge states per element, per-state records, tabulated
//! densities as cubic splines, and the radial grid they live on. Any database
//! backend can implement the trait; [`TomlProatomDb`] is the bundled
//! reference implementation, parameterizing each charge state as a
//! Slater-type density loaded from a TOML table.

use crate::error::HepartError;
use crate::math::rtransform::RadialTransform;
use crate::math::spline::CubicSpline;
use serde::Deserialize;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fmt;
use std::path::Path;

/// A linear combination of reference charge states: maps each discrete
/// charge to a scalar coefficient. The ordered map keeps label rendering and
/// spline assembly deterministic.
pub type Lico = BTreeMap<i32, f64>;

/// Metadata of one reference charge state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProatomRecord {
    /// Atomic number of the element.
    pub number: u8,
    /// Net charge of the reference state.
    pub charge: i32,
    /// Electron count of the reference density under the pseudo convention
    /// of the input data.
    pub pseudo_population: f64,
}

/// Read-only source of proatom reference densities.
///
/// Implementations must return charge states ordered from most positive to
/// most negative; the basis builder derives its deformation functions from
/// consecutive pairs in that order.
pub trait ProatomSource {
    /// The available charge states for an element, most positive first.
    ///
    /// With `safe` set, states flagged as unreliable by the database are
    /// filtered out.
    fn charges(&self, number: u8, safe: bool) -> Result<Vec<i32>, HepartError>;

    /// The record describing one reference state.
    fn record(&self, number: u8, charge: i32) -> Result<ProatomRecord, HepartError>;

    /// The radial density of a linear combination of reference states, as a
    /// spline on the element's radial grid. `None` selects the neutral atom.
    fn spline(&self, number: u8, lico: Option<&Lico>) -> Result<CubicSpline, HepartError>;

    /// The radial grid the element's densities are tabulated on.
    fn rtransform(&self, number: u8) -> Result<RadialTransform, HepartError>;
}

/// One Slater-parameterized charge state in a TOML table.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct StateData {
    /// Net charge of the state.
    pub charge: i32,
    /// Electron count of the state.
    pub pseudo_population: f64,
    /// Slater exponent of the state's density, in inverse Bohr.
    pub exponent: f64,
    /// Whether the state is reliable enough for basis construction.
    #[serde(default = "default_safe")]
    pub safe: bool,
}

fn default_safe() -> bool {
    true
}

/// Radial grid and charge states for one element.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ElementTable {
    /// Innermost radius of the element's logarithmic grid, in Bohr.
    pub rmin: f64,
    /// Outermost radius of the element's logarithmic grid, in Bohr.
    pub rmax: f64,
    /// Number of radial points.
    pub npoint: usize,
    /// Available reference states.
    pub states: Vec<StateData>,
}

/// A proatom database backed by a TOML parameter table.
///
/// Each element carries a logarithmic radial grid and a list of charge
/// states; each state's density is a normalized Slater function
/// `rho(r) = N zeta^3 / (8 pi) * exp(-zeta r)`, which integrates to the
/// state's electron count. Element keys may be atomic numbers or symbols.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TomlProatomDb {
    /// Per-element tables keyed by atomic number.
    #[serde(deserialize_with = "deserialize_element_map")]
    pub elements: HashMap<u8, ElementTable>,
}

impl TomlProatomDb {
    /// Loads a proatom table from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`HepartError::IoError`] when the file cannot be read and
    /// [`HepartError::DeserializationError`] when the TOML is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self, HepartError> {
        let content = std::fs::read_to_string(path).map_err(|io_error| HepartError::IoError {
            path: path.to_path_buf(),
            source: io_error,
        })?;

        Self::load_from_str(&content)
    }

    /// Parses a proatom table from a TOML string.
    ///
    /// # Examples
    ///
    /// ```
    /// use hepart::TomlProatomDb;
    ///
    /// let toml_data = r#"
    /// [elements.H]
    /// rmin = 2.0e-4
    /// rmax = 20.0
    /// npoint = 101
    /// states = [
    ///     { charge = 0, pseudo_population = 1.0, exponent = 2.0 },
    ///     { charge = -1, pseudo_population = 2.0, exponent = 1.4 },
    /// ]
    /// "#;
    ///
    /// let db = TomlProatomDb::load_from_str(toml_data).unwrap();
    /// assert_eq!(db.elements.len(), 1);
    /// ```
    pub fn load_from_str(toml_str: &str) -> Result<Self, HepartError> {
        toml::from_str(toml_str).map_err(HepartError::from)
    }

    fn element(&self, number: u8) -> Result<&ElementTable, HepartError> {
        self.elements
            .get(&number)
            .ok_or(HepartError::MissingProatomData { number })
    }

    fn state(&self, number: u8, charge: i32) -> Result<&StateData, HepartError> {
        self.element(number)?
            .states
            .iter()
            .find(|s| s.charge == charge)
            .ok_or(HepartError::ProatomLookup { number, charge })
    }
}

impl ProatomSource for TomlProatomDb {
    fn charges(&self, number: u8, safe: bool) -> Result<Vec<i32>, HepartError> {
        let table = self.element(number)?;
        let mut charges: Vec<i32> = table
            .states
            .iter()
            .filter(|s| s.safe || !safe)
            .map(|s| s.charge)
            .collect();
        charges.sort_unstable_by(|a, b| b.cmp(a));
        charges.dedup();
        Ok(charges)
    }

    fn record(&self, number: u8, charge: i32) -> Result<ProatomRecord, HepartError> {
        let state = self.state(number, charge)?;
        Ok(ProatomRecord {
            number,
            charge,
            pseudo_population: state.pseudo_population,
        })
    }

    fn spline(&self, number: u8, lico: Option<&Lico>) -> Result<CubicSpline, HepartError> {
        let neutral: Lico = [(0, 1.0)].into_iter().collect();
        let lico = lico.unwrap_or(&neutral);

        let rtf = self.rtransform(number)?;
        let radii = rtf.radii();
        let mut y = vec![0.0; radii.len()];
        for (&charge, &coeff) in lico {
            if coeff == 0.0 {
                continue;
            }
            let state = self.state(number, charge)?;
            for (value, r) in y.iter_mut().zip(&radii) {
                *value += coeff * slater_density(state.pseudo_population, state.exponent, *r);
            }
        }
        CubicSpline::new(radii, y)
    }

    fn rtransform(&self, number: u8) -> Result<RadialTransform, HepartError> {
        let table = self.element(number)?;
        Ok(RadialTransform::new(table.rmin, table.rmax, table.npoint))
    }
}

/// Normalized Slater density: integrates to `population` over all space.
fn slater_density(population: f64, exponent: f64, r: f64) -> f64 {
    population * exponent.powi(3) / (8.0 * PI) * libm::exp(-exponent * r)
}

/// Deserializes the element map with keys given as atomic numbers or symbols.
fn deserialize_element_map<'de, D>(deserializer: D) -> Result<HashMap<u8, ElementTable>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ElementMapVisitor;

    impl<'de> Visitor<'de> for ElementMapVisitor {
        type Value = HashMap<u8, ElementTable>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a map from atomic number or symbol to element data")
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut elements = HashMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry::<String, ElementTable>()? {
                let number = key.parse::<u8>().or_else(|_| {
                    element_symbol_to_atomic_number(&key)
                        .ok_or_else(|| de::Error::custom(format!("invalid element key: '{}'", key)))
                })?;
                elements.insert(number, value);
            }
            Ok(elements)
        }
    }

    deserializer.deserialize_map(ElementMapVisitor)
}

/// Element symbols indexed by atomic number minus one, up to Oganesson.
const ELEMENT_SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Converts a case-sensitive element symbol to its atomic number.
fn element_symbol_to_atomic_number(symbol: &str) -> Option<u8> {
    ELEMENT_SYMBOLS
        .iter()
        .position(|s| *s == symbol)
        .map(|index| (index + 1) as u8)
}
