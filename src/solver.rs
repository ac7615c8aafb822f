//! Equilibrium solver for `aA + bB <=> cC + dD`.
//!
//! Given the initial concentrations the solver finds the extent of reaction `ξ` at which
//!
//! ```text
//! K = [C]^c [D]^d / ([A]^a [B]^b),   [R] = r0 - a ξ,   [P] = p0 + c ξ
//! ```
//!
//! holds, and turns it into one concentration [`Equation`] per species over a
//! [`ProgressWindow`]. With all coefficients equal to one the condition is a quadratic and is
//! solved in closed form. Otherwise the log residual
//!
//! ```text
//! f(ξ) = Σ c ln(p0 + c ξ) - Σ a ln(r0 - a ξ) - ln K
//! ```
//!
//! is strictly increasing over the physically valid interval and is bracketed by bisection.
//!
//! A negative extent means the reaction runs in reverse (`Q0 > K`). When no valid root exists
//! the extent is 0 and the concentrations stay constant.
//!
//! # Example
//!
//! ```
//! use equilibrium_grid::prelude::*;
//!
//! let solver = EquilibriumSolver::new(StoichiometricCoefficients::unit(), EquilibriumConstant::default());
//! let solution = solver.solve(&MoleculeValue::new(0.4, 0.4, 0.0, 0.0), ProgressWindow::default());
//!
//! assert!((solution.extent() - 0.2).abs() < 1e-12);
//! assert_eq!(solution.direction(), ReactionDirection::Forward);
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

use crate::chemistry::{EquilibriumConstant, ProgressWindow, StoichiometricCoefficients};
use crate::equation::Equation;
use crate::species::{MoleculeValue, Side, Species};
use crate::system::EquationSystem;

const BISECTION_ITERATIONS: usize = 200;
const LINEAR_EPSILON: f64 = 1e-12;

/// Which way the reaction moves from its initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionDirection {
    /// Reactants are consumed.
    Forward,
    /// Products are consumed.
    Reverse,
    /// Nothing changes.
    Static,
}

/// How the extent was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverMethod {
    Quadratic,
    Bisection,
    /// `K` is 0 or infinite and the reaction runs to a limiting species.
    Limit,
    /// No valid root; the extent defaulted to 0.
    NoReaction,
}

/// Solves one reaction for any initial state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquilibriumSolver {
    coefficients: StoichiometricCoefficients,
    constant: EquilibriumConstant,
}

impl EquilibriumSolver {
    pub fn new(coefficients: StoichiometricCoefficients, constant: EquilibriumConstant) -> Self {
        Self {
            coefficients,
            constant,
        }
    }

    pub fn coefficients(&self) -> &StoichiometricCoefficients {
        &self.coefficients
    }

    pub fn constant(&self) -> EquilibriumConstant {
        self.constant
    }

    /// Solves for the extent and builds the concentration equations over `window`.
    pub fn solve(&self, initial: &MoleculeValue<f64>, window: ProgressWindow) -> EquilibriumSolution {
        let (extent, method) = self.extent(initial);
        let direction = if extent > 0.0 {
            ReactionDirection::Forward
        } else if extent < 0.0 {
            ReactionDirection::Reverse
        } else {
            ReactionDirection::Static
        };

        let fraction = Equation::window_fraction(window.start(), window.equilibrium());
        let equations = EquationSystem::new(initial.map(|species, &c0| {
            let change = self.coefficients.signed(species) * extent;
            if change == 0.0 {
                Equation::constant(c0)
            } else {
                &fraction * change + c0
            }
        }));

        EquilibriumSolution {
            extent,
            direction,
            method,
            window,
            initial: initial.clone(),
            coefficients: self.coefficients,
            equations,
        }
    }

    /// Extent of reaction at equilibrium and the method that produced it.
    ///
    /// Concentrations below zero are treated as zero.
    pub fn extent(&self, initial: &MoleculeValue<f64>) -> (f64, SolverMethod) {
        let initial = initial.map(|_, &c| c.max(0.0));
        let (lower, upper) = self.valid_interval(&initial);

        if lower >= upper {
            debug!("no reaction possible from {initial:?}: a reactant and a product are both absent");
            return (0.0, SolverMethod::NoReaction);
        }

        let k = self.constant.value();
        if self.constant.is_infinite() {
            return self.limit(upper, "forward");
        }
        if self.constant.is_zero() {
            return self.limit(lower, "reverse");
        }

        if self.coefficients.is_unit() {
            match self.solve_quadratic(&initial, k, lower, upper) {
                Some(extent) => (extent, SolverMethod::Quadratic),
                None => {
                    debug!("quadratic has no root in ({lower}, {upper}); extent defaults to 0");
                    (0.0, SolverMethod::NoReaction)
                }
            }
        } else {
            (self.bisect(&initial, k, lower, upper), SolverMethod::Bisection)
        }
    }

    /// Open interval of extents that keep every concentration positive.
    fn valid_interval(&self, initial: &MoleculeValue<f64>) -> (f64, f64) {
        let limit = |side: Side| {
            Species::on_side(side)
                .into_iter()
                .map(|species| initial[species] / self.coefficients.as_f64(species))
                .fold(f64::INFINITY, f64::min)
        };
        (-limit(Side::Product), limit(Side::Reactant))
    }

    fn limit(&self, bound: f64, label: &str) -> (f64, SolverMethod) {
        if bound.is_finite() && bound != 0.0 {
            debug!("degenerate constant: {label} reaction runs to the limiting species, extent {bound}");
            (bound, SolverMethod::Limit)
        } else {
            debug!("degenerate constant: {label} reaction has nothing to consume");
            (0.0, SolverMethod::NoReaction)
        }
    }

    /// `(1 - K) ξ² + (p1 + p2 + K (r1 + r2)) ξ + (p1 p2 - K r1 r2) = 0`
    fn solve_quadratic(&self, initial: &MoleculeValue<f64>, k: f64, lower: f64, upper: f64) -> Option<f64> {
        let [r1, r2] = initial.side(Side::Reactant).map(|c| *c);
        let [p1, p2] = initial.side(Side::Product).map(|c| *c);

        let a = 1.0 - k;
        let b = p1 + p2 + k * (r1 + r2);
        let c = p1 * p2 - k * r1 * r2;

        let roots = quadratic_roots(a, b, c);
        roots
            .into_iter()
            .flatten()
            .filter(|root| *root > lower && *root < upper)
            .min_by(|x, y| x.abs().total_cmp(&y.abs()))
    }

    fn bisect(&self, initial: &MoleculeValue<f64>, k: f64, lower: f64, upper: f64) -> f64 {
        let ln_k = k.ln();
        let residual = |extent: f64| -> f64 {
            Species::ALL
                .into_iter()
                .map(|species| {
                    let coefficient = self.coefficients.signed(species);
                    coefficient * (initial[species] + coefficient * extent).ln()
                })
                .sum::<f64>()
                - ln_k
        };

        let (mut lo, mut hi) = (lower, upper);
        let mut mid = 0.5 * (lo + hi);
        for _ in 0..BISECTION_ITERATIONS {
            mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            if residual(mid) < 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        mid
    }
}

/// Real roots of `a x² + b x + c`, avoiding cancellation.
fn quadratic_roots(a: f64, b: f64, c: f64) -> [Option<f64>; 2] {
    if a.abs() < LINEAR_EPSILON {
        if b == 0.0 {
            return [None, None];
        }
        return [Some(-c / b), None];
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return [None, None];
    }

    let q = -0.5 * (b + b.signum() * discriminant.sqrt());
    if q == 0.0 {
        return [Some(0.0), None];
    }
    [Some(q / a), Some(c / q)]
}

/// Extent, direction and concentration equations for one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumSolution {
    extent: f64,
    direction: ReactionDirection,
    method: SolverMethod,
    window: ProgressWindow,
    initial: MoleculeValue<f64>,
    coefficients: StoichiometricCoefficients,
    equations: EquationSystem,
}

impl EquilibriumSolution {
    pub fn extent(&self) -> f64 {
        self.extent
    }

    pub fn direction(&self) -> ReactionDirection {
        self.direction
    }

    pub fn method(&self) -> SolverMethod {
        self.method
    }

    pub fn window(&self) -> ProgressWindow {
        self.window
    }

    pub fn initial(&self) -> &MoleculeValue<f64> {
        &self.initial
    }

    pub fn equations(&self) -> &EquationSystem {
        &self.equations
    }

    pub fn equation(&self, species: Species) -> &Equation {
        self.equations.get(species)
    }

    /// Concentrations once equilibrium has been reached.
    pub fn final_concentrations(&self) -> MoleculeValue<f64> {
        self.initial
            .map(|species, &c0| c0 + self.coefficients.signed(species) * self.extent)
    }

    /// Reaction quotient over progress.
    pub fn reaction_quotient(&self) -> Equation {
        self.equations.reaction_quotient(&self.coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver(coefficients: [i64; 4], k: f64) -> EquilibriumSolver {
        let [a, b, c, d] = coefficients;
        EquilibriumSolver::new(
            StoichiometricCoefficients::new(MoleculeValue::new(a, b, c, d)).unwrap(),
            EquilibriumConstant::new(k).unwrap(),
        )
    }

    fn window() -> ProgressWindow {
        ProgressWindow::new(0.0, 10.0).unwrap()
    }

    #[test]
    fn test_unit_forward_reaction() {
        let solution = solver([1, 1, 1, 1], 1.0).solve(&MoleculeValue::new(0.4, 0.4, 0.0, 0.0), window());

        assert_eq!(solution.method(), SolverMethod::Quadratic);
        assert_eq!(solution.direction(), ReactionDirection::Forward);
        assert_relative_eq!(solution.extent(), 0.2, epsilon = 1e-12);

        let finals = solution.final_concentrations();
        assert_relative_eq!(finals[Species::ReactantA], 0.2, epsilon = 1e-12);
        assert_relative_eq!(finals[Species::ProductD], 0.2, epsilon = 1e-12);

        let a = solution.equation(Species::ReactantA);
        assert_relative_eq!(a.eval(-5.0), 0.4, epsilon = 1e-12);
        assert_relative_eq!(a.eval(5.0), 0.3, epsilon = 1e-12);
        assert_relative_eq!(a.eval(50.0), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_quotient_reaches_constant() {
        let cases = [
            ([1, 1, 1, 1], 2.5, MoleculeValue::new(0.5, 0.3, 0.1, 0.0)),
            ([1, 1, 1, 1], 0.2, MoleculeValue::new(0.3, 0.3, 0.2, 0.2)),
            ([2, 1, 1, 2], 0.5, MoleculeValue::new(0.6, 0.4, 0.1, 0.1)),
            ([1, 3, 2, 1], 10.0, MoleculeValue::new(0.5, 0.6, 0.0, 0.0)),
            ([2, 2, 1, 1], 0.01, MoleculeValue::new(0.1, 0.1, 0.3, 0.3)),
        ];

        for (coefficients, k, initial) in cases {
            let solution = solver(coefficients, k).solve(&initial, window());
            let q = solution.reaction_quotient().eval(window().equilibrium());
            assert_relative_eq!(q, k, max_relative = 1e-3);
            for (_, &c) in solution.final_concentrations().iter() {
                assert!(c >= 0.0);
            }
        }
    }

    #[test]
    fn test_reverse_reaction() {
        let solution = solver([1, 1, 1, 1], 1.0).solve(&MoleculeValue::new(0.1, 0.1, 0.3, 0.3), window());
        assert_eq!(solution.direction(), ReactionDirection::Reverse);
        assert_relative_eq!(solution.extent(), -0.1, epsilon = 1e-12);
        assert_relative_eq!(
            solution.final_concentrations()[Species::ProductC],
            0.2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_quadratic_and_bisection_agree() {
        let solver = solver([1, 1, 1, 1], 3.0);
        let initial = MoleculeValue::new(0.45, 0.25, 0.05, 0.1);
        let (lower, upper) = solver.valid_interval(&initial);

        let quadratic = solver.solve_quadratic(&initial, 3.0, lower, upper).unwrap();
        let bisected = solver.bisect(&initial, 3.0, lower, upper);
        assert_relative_eq!(quadratic, bisected, epsilon = 1e-10);
    }

    #[test]
    fn test_no_reaction_without_reactants_and_products() {
        let solution = solver([1, 1, 1, 1], 1.0).solve(&MoleculeValue::new(0.0, 0.4, 0.0, 0.3), window());
        assert_eq!(solution.extent(), 0.0);
        assert_eq!(solution.method(), SolverMethod::NoReaction);
        assert_eq!(solution.direction(), ReactionDirection::Static);
        assert_eq!(solution.equation(Species::ReactantB).as_constant(), Some(0.4));
    }

    #[test]
    fn test_all_zero_is_static() {
        let solution = solver([2, 1, 1, 1], 4.0).solve(&MoleculeValue::splat(0.0), window());
        assert_eq!(solution.direction(), ReactionDirection::Static);
        assert_eq!(solution.reaction_quotient().eval(3.0), 0.0);
    }

    #[test]
    fn test_degenerate_constants() {
        let forward = solver([1, 1, 1, 1], f64::INFINITY).solve(&MoleculeValue::new(0.4, 0.2, 0.0, 0.0), window());
        assert_eq!(forward.method(), SolverMethod::Limit);
        assert_relative_eq!(forward.extent(), 0.2);

        let reverse = solver([1, 1, 1, 2], 0.0).solve(&MoleculeValue::new(0.0, 0.0, 0.3, 0.1), window());
        assert_eq!(reverse.method(), SolverMethod::Limit);
        assert_relative_eq!(reverse.extent(), -0.05);

        let stuck = solver([1, 1, 1, 1], 0.0).solve(&MoleculeValue::new(0.4, 0.4, 0.2, 0.0), window());
        assert_eq!(stuck.extent(), 0.0);
        assert_eq!(stuck.method(), SolverMethod::NoReaction);
    }

    #[test]
    fn test_quadratic_roots() {
        let roots = quadratic_roots(1.0, -3.0, 2.0);
        let mut found: Vec<f64> = roots.into_iter().flatten().collect();
        found.sort_by(f64::total_cmp);
        assert_eq!(found, vec![1.0, 2.0]);

        assert_eq!(quadratic_roots(0.0, 2.0, -1.0), [Some(0.5), None]);
        assert_eq!(quadratic_roots(1.0, 0.0, 1.0), [None, None]);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let solution = solver([1, 2, 2, 1], 0.7).solve(&MoleculeValue::new(0.3, 0.5, 0.0, 0.1), window());
        let equation = solution.equation(Species::ProductC);
        assert_eq!(equation.eval(4.2), equation.eval(4.2));
    }
}
