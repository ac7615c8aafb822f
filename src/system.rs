//! Per-species systems of equations.
//!
//! An `EquationSystem` bundles one [`Equation`] per species, so a renderer can evaluate every
//! concentration at once, sample whole timelines in parallel, and derive the reaction quotient.
//!
//! # Example
//!
//! ```
//! use equilibrium_grid::{Equation, EquationSystem, MoleculeValue, Species};
//!
//! let system = EquationSystem::new(MoleculeValue::new(
//!     Equation::linear(0.0, 0.4, 10.0, 0.2),
//!     Equation::linear(0.0, 0.4, 10.0, 0.2),
//!     Equation::linear(0.0, 0.0, 10.0, 0.2),
//!     Equation::linear(0.0, 0.0, 10.0, 0.2),
//! ));
//!
//! let values = system.eval(5.0);
//! assert!((values[Species::ProductC] - 0.1).abs() < 1e-12);
//! ```

use rayon::prelude::*;

use crate::chemistry::StoichiometricCoefficients;
use crate::equation::Equation;
use crate::species::{MoleculeValue, Side, Species};

/// One equation per species.
#[derive(Debug, Clone, PartialEq)]
pub struct EquationSystem {
    equations: MoleculeValue<Equation>,
}

impl EquationSystem {
    pub fn new(equations: MoleculeValue<Equation>) -> Self {
        Self { equations }
    }

    /// Every species held at a fixed value.
    pub fn constant(values: &MoleculeValue<f64>) -> Self {
        Self::new(values.map(|_, &value| Equation::constant(value)))
    }

    pub fn get(&self, species: Species) -> &Equation {
        &self.equations[species]
    }

    pub fn equations(&self) -> &MoleculeValue<Equation> {
        &self.equations
    }

    pub fn into_equations(self) -> MoleculeValue<Equation> {
        self.equations
    }

    /// Evaluates every species at the given progress.
    pub fn eval(&self, progress: f64) -> MoleculeValue<f64> {
        self.equations.map(|_, equation| equation.eval(progress))
    }

    /// Evaluates the system at many progress values in parallel.
    ///
    /// Results are returned in input order.
    pub fn eval_parallel(&self, progress_values: &[f64]) -> Vec<MoleculeValue<f64>> {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);

        let chunk_size = (progress_values.len() / (num_threads * 4)).max(1);

        progress_values
            .par_chunks(chunk_size)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|&progress| self.eval(progress))
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect()
    }

    /// Rate of change of every species.
    pub fn derivatives(&self) -> EquationSystem {
        Self::new(self.equations.map(|_, equation| equation.derivative()))
    }

    /// `Q(t) = Π [product]^coefficient / Π [reactant]^coefficient`.
    ///
    /// Where the reactant side vanishes the quotient is undefined and evaluates to 0.
    pub fn reaction_quotient(&self, coefficients: &StoichiometricCoefficients) -> Equation {
        let side_product = |side: Side| {
            Species::on_side(side)
                .into_iter()
                .map(|species| {
                    let exponent = i32::try_from(coefficients.get(species)).unwrap_or(i32::MAX);
                    self.equations[species].powi(exponent)
                })
                .fold(Equation::constant(1.0), |acc, term| acc * term)
        };
        side_product(Side::Product) / side_product(Side::Reactant)
    }
}

/// Switches from `before` to `after` at `threshold`, species by species.
pub fn switching_system(threshold: f64, before: &EquationSystem, after: &EquationSystem) -> EquationSystem {
    EquationSystem::new(MoleculeValue::from_fn(|species| {
        Equation::switching(
            threshold,
            before.get(species).clone(),
            after.get(species).clone(),
        )
    }))
}
