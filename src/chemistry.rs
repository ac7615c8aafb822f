//! Validated reaction parameters: stoichiometric coefficients, the equilibrium constant and
//! the progress window.

use serde::{Deserialize, Serialize};

use crate::errors::ReactionError;
use crate::species::{MoleculeValue, Side, Species};

/// Ideal gas constant in L·atm/(mol·K), used to convert Kp into Kc.
pub const GAS_CONSTANT: f64 = 0.082057;

/// Integer coefficients of `aA + bB <=> cC + dD`, each at least 1.
///
/// Whether the reaction is balanced is the caller's business; the solver assumes it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoleculeValue<i64>", into = "MoleculeValue<i64>")]
pub struct StoichiometricCoefficients {
    values: [u32; Species::COUNT],
}

impl StoichiometricCoefficients {
    /// Validates signed coefficients.
    ///
    /// # Errors
    /// Returns `ReactionError::InvalidCoefficient` for the first species whose coefficient is
    /// below 1 or does not fit in a `u32`.
    pub fn new(values: MoleculeValue<i64>) -> Result<Self, ReactionError> {
        let mut validated = [1u32; Species::COUNT];
        for (species, &value) in values.iter() {
            validated[species.as_index()] = u32::try_from(value)
                .ok()
                .filter(|&v| v >= 1)
                .ok_or(ReactionError::InvalidCoefficient { species, value })?;
        }
        Ok(Self { values: validated })
    }

    /// `A + B <=> C + D`.
    pub fn unit() -> Self {
        Self {
            values: [1; Species::COUNT],
        }
    }

    pub fn get(&self, species: Species) -> u32 {
        self.values[species.as_index()]
    }

    pub fn as_f64(&self, species: Species) -> f64 {
        f64::from(self.get(species))
    }

    /// Whether every coefficient is 1, in which case equilibrium reduces to a quadratic.
    pub fn is_unit(&self) -> bool {
        self.values.iter().all(|&v| v == 1)
    }

    /// Sum of coefficients on one side.
    pub fn side_total(&self, side: Side) -> u32 {
        Species::on_side(side).iter().map(|&s| self.get(s)).sum()
    }

    /// Change in moles of gas, `(c + d) - (a + b)`.
    pub fn delta_n(&self) -> i64 {
        i64::from(self.side_total(Side::Product)) - i64::from(self.side_total(Side::Reactant))
    }

    /// Signed coefficient: negative for reactants, positive for products.
    pub fn signed(&self, species: Species) -> f64 {
        match species.side() {
            Side::Reactant => -self.as_f64(species),
            Side::Product => self.as_f64(species),
        }
    }
}

impl Default for StoichiometricCoefficients {
    fn default() -> Self {
        Self::unit()
    }
}

impl TryFrom<MoleculeValue<i64>> for StoichiometricCoefficients {
    type Error = ReactionError;

    fn try_from(values: MoleculeValue<i64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<StoichiometricCoefficients> for MoleculeValue<i64> {
    fn from(coefficients: StoichiometricCoefficients) -> Self {
        MoleculeValue::from_fn(|species| i64::from(coefficients.get(species)))
    }
}

/// Equilibrium constant `K`.
///
/// Zero and infinity are accepted: they stand for reactions that run fully backwards or fully
/// forwards, and the solver treats them as limits instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct EquilibriumConstant(f64);

impl EquilibriumConstant {
    /// # Errors
    /// Returns `ReactionError::InvalidConstant` for negative values and NaN.
    pub fn new(value: f64) -> Result<Self, ReactionError> {
        if value.is_nan() || value < 0.0 {
            return Err(ReactionError::InvalidConstant(value));
        }
        Ok(Self(value))
    }

    /// Converts a pressure constant into a concentration constant,
    /// `Kc = Kp / (R T)^Δn`.
    ///
    /// # Example
    /// ```
    /// # use equilibrium_grid::chemistry::EquilibriumConstant;
    /// // Δn = 0: Kc equals Kp
    /// let k = EquilibriumConstant::from_kp(2.0, 298.0, 0).unwrap();
    /// assert_eq!(k.value(), 2.0);
    /// ```
    pub fn from_kp(kp: f64, temperature_k: f64, delta_n: i64) -> Result<Self, ReactionError> {
        let rt = GAS_CONSTANT * temperature_k;
        let exponent = i32::try_from(delta_n).map_err(|_| ReactionError::InvalidConstant(kp))?;
        Self::new(kp / rt.powi(exponent))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_infinite()
    }
}

impl Default for EquilibriumConstant {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TryFrom<f64> for EquilibriumConstant {
    type Error = ReactionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EquilibriumConstant> for f64 {
    fn from(constant: EquilibriumConstant) -> Self {
        constant.0
    }
}

/// Progress interval over which a phase moves from its initial state to equilibrium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressWindow {
    start: f64,
    equilibrium: f64,
}

impl ProgressWindow {
    /// # Errors
    /// Returns `ReactionError::InvalidWindow` if either value is not finite or the length is
    /// negative.
    pub fn new(start: f64, length: f64) -> Result<Self, ReactionError> {
        if !start.is_finite() || !length.is_finite() || length < 0.0 {
            return Err(ReactionError::InvalidWindow { start, length });
        }
        Ok(Self {
            start,
            equilibrium: start + length,
        })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn equilibrium(&self) -> f64 {
        self.equilibrium
    }

    pub fn length(&self) -> f64 {
        self.equilibrium - self.start
    }

    /// Same length, moved to begin at `start`.
    pub fn starting_at(&self, start: f64) -> Self {
        Self {
            start,
            equilibrium: start + self.length(),
        }
    }
}

impl Default for ProgressWindow {
    fn default() -> Self {
        Self {
            start: 0.0,
            equilibrium: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_non_positive_coefficients() {
        let result = StoichiometricCoefficients::new(MoleculeValue::new(1, 0, 1, 1));
        assert!(matches!(
            result,
            Err(ReactionError::InvalidCoefficient {
                species: Species::ReactantB,
                value: 0
            })
        ));

        let result = StoichiometricCoefficients::new(MoleculeValue::new(1, 1, -2, 1));
        assert!(matches!(
            result,
            Err(ReactionError::InvalidCoefficient {
                species: Species::ProductC,
                ..
            })
        ));
    }

    #[test]
    fn test_coefficient_accessors() {
        let coefficients = StoichiometricCoefficients::new(MoleculeValue::new(2, 1, 3, 1)).unwrap();
        assert_eq!(coefficients.get(Species::ReactantA), 2);
        assert_eq!(coefficients.side_total(Side::Reactant), 3);
        assert_eq!(coefficients.side_total(Side::Product), 4);
        assert_eq!(coefficients.delta_n(), 1);
        assert_eq!(coefficients.signed(Species::ReactantA), -2.0);
        assert_eq!(coefficients.signed(Species::ProductC), 3.0);
        assert!(!coefficients.is_unit());
        assert!(StoichiometricCoefficients::unit().is_unit());
    }

    #[test]
    fn test_coefficients_serde() {
        let json = r#"{"reactant_a":2,"reactant_b":1,"product_c":1,"product_d":1}"#;
        let coefficients: StoichiometricCoefficients = serde_json::from_str(json).unwrap();
        assert_eq!(coefficients.get(Species::ReactantA), 2);
        assert_eq!(serde_json::to_string(&coefficients).unwrap(), json);

        let bad = r#"{"reactant_a":0,"reactant_b":1,"product_c":1,"product_d":1}"#;
        assert!(serde_json::from_str::<StoichiometricCoefficients>(bad).is_err());
    }

    #[test]
    fn test_constant_validation() {
        assert!(EquilibriumConstant::new(-1.0).is_err());
        assert!(EquilibriumConstant::new(f64::NAN).is_err());
        assert!(EquilibriumConstant::new(0.0).unwrap().is_zero());
        assert!(EquilibriumConstant::new(f64::INFINITY).unwrap().is_infinite());
    }

    #[test]
    fn test_window() {
        let window = ProgressWindow::new(2.0, 8.0).unwrap();
        assert_eq!(window.equilibrium(), 10.0);
        assert_eq!(window.starting_at(15.0).equilibrium(), 23.0);
        assert!(ProgressWindow::new(0.0, -1.0).is_err());
        assert!(ProgressWindow::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_from_kp() {
        // N2 + 3H2 <=> 2NH3 has Δn = -2
        let k = EquilibriumConstant::from_kp(1.0, 500.0, -2).unwrap();
        assert_relative_eq!(k.value(), (GAS_CONSTANT * 500.0).powi(2), max_relative = 1e-12);
    }
}
