//! One reaction phase: increments, the solved equations and the molecules on the grid.
//!
//! `ReactionComponents` owns the occupancy a phase started from (the consolidated snapshot of
//! the previous phase), the molecules added during the phase, and everything derived from them.
//! Each accepted increment rebuilds the solution and the molecule layout as a whole; the
//! previous values are never patched in place, so equations handed out earlier stay valid.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::chemistry::{EquilibriumConstant, ProgressWindow, StoichiometricCoefficients};
use crate::equation::Equation;
use crate::grid::{derive_seed, CoordinateAllocator, GridCoordinate, GridSize};
use crate::molecules::ReactingMolecules;
use crate::solver::{EquilibriumSolution, EquilibriumSolver, ReactionDirection, SolverMethod};
use crate::species::{MoleculeValue, Species};
use crate::system::EquationSystem;

const INCREMENT_STREAM: u64 = 0;
const REACTION_STREAM: u64 = 1;

/// Result of an increment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementOutcome {
    pub requested: usize,
    pub applied: usize,
    /// Free cells left after the increment.
    pub remaining_capacity: usize,
}

impl IncrementOutcome {
    /// Whether fewer molecules were added than requested.
    pub fn was_clamped(&self) -> bool {
        self.applied < self.requested
    }
}

/// Coarse stage of a phase at a given progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionStage {
    /// At or before the window start; molecules are still being added.
    Preparation,
    /// Inside the window, moving toward equilibrium.
    PreEquilibrium,
    /// At or after the equilibrium progress.
    PostEquilibrium,
}

#[derive(Debug, Clone)]
pub struct ReactionComponents {
    grid: GridSize,
    solver: EquilibriumSolver,
    window: ProgressWindow,
    seed: u64,
    initial: MoleculeValue<Vec<GridCoordinate>>,
    added: MoleculeValue<Vec<GridCoordinate>>,
    allocator: CoordinateAllocator,
    progress: f64,
    solution: EquilibriumSolution,
    quotient: Equation,
    rates: EquationSystem,
    molecules: ReactingMolecules,
}

impl ReactionComponents {
    /// Starts a phase from `initial`, which must be duplicate-free and inside `grid`.
    ///
    /// `seed` fixes every random choice of the phase.
    pub fn new(
        grid: GridSize,
        solver: EquilibriumSolver,
        window: ProgressWindow,
        initial: MoleculeValue<Vec<GridCoordinate>>,
        seed: u64,
    ) -> Self {
        let occupancy = initial.clone();
        let (solution, quotient, rates, molecules) = Self::derive(grid, &solver, window, &occupancy, seed);
        Self {
            grid,
            solver,
            window,
            seed,
            initial,
            added: MoleculeValue::default(),
            allocator: CoordinateAllocator::new(grid, derive_seed(seed, INCREMENT_STREAM)),
            progress: window.start(),
            solution,
            quotient,
            rates,
            molecules,
        }
    }

    fn derive(
        grid: GridSize,
        solver: &EquilibriumSolver,
        window: ProgressWindow,
        occupancy: &MoleculeValue<Vec<GridCoordinate>>,
        seed: u64,
    ) -> (EquilibriumSolution, Equation, EquationSystem, ReactingMolecules) {
        let cells = grid.cell_count() as f64;
        let concentrations = occupancy.map(|_, coordinates| coordinates.len() as f64 / cells);
        let solution = solver.solve(&concentrations, window);
        let quotient = solution.reaction_quotient();
        let rates = solution.equations().derivatives();

        let mut allocator = CoordinateAllocator::new(grid, derive_seed(seed, REACTION_STREAM));
        let molecules =
            ReactingMolecules::from_solution(occupancy, solver.coefficients(), &solution, &mut allocator);
        (solution, quotient, rates, molecules)
    }

    fn rebuild(&mut self) {
        let occupancy = self.occupancy();
        let (solution, quotient, rates, molecules) =
            Self::derive(self.grid, &self.solver, self.window, &occupancy, self.seed);
        self.solution = solution;
        self.quotient = quotient;
        self.rates = rates;
        self.molecules = molecules;
    }

    /// Molecules present at the window start: the initial snapshot plus everything added.
    pub fn occupancy(&self) -> MoleculeValue<Vec<GridCoordinate>> {
        MoleculeValue::from_fn(|species| {
            let mut coordinates = self.initial[species].clone();
            coordinates.extend(self.added[species].iter().copied());
            coordinates
        })
    }

    /// Adds up to `count` molecules of `species` on free cells.
    ///
    /// The request is clamped to the remaining capacity; with no capacity left it is a no-op.
    pub fn increment(&mut self, species: Species, count: usize) -> IncrementOutcome {
        let available = self.remaining_capacity();
        let applied = count.min(available);
        if applied < count {
            debug!("increment of {count} {species} clamped to {applied}");
        }
        if applied > 0 {
            let occupied: Vec<GridCoordinate> = Species::ALL
                .into_iter()
                .flat_map(|s| self.initial[s].iter().chain(self.added[s].iter()).copied())
                .collect();
            let drawn = self.allocator.add_random_clamped(applied, &occupied);
            self.added[species].extend(drawn);
            self.rebuild();
        }
        IncrementOutcome {
            requested: count,
            applied,
            remaining_capacity: self.remaining_capacity(),
        }
    }

    /// Cells not occupied at the window start.
    pub fn remaining_capacity(&self) -> usize {
        self.grid.cell_count().saturating_sub(self.total_molecules())
    }

    /// Molecules present at the window start.
    pub fn total_molecules(&self) -> usize {
        self.initial
            .iter()
            .chain(self.added.iter())
            .map(|(_, coordinates)| coordinates.len())
            .sum()
    }

    pub fn concentration(&self, species: Species, progress: f64) -> f64 {
        self.solution.equation(species).eval(progress)
    }

    /// Rate of change of the concentration.
    pub fn rate(&self, species: Species, progress: f64) -> f64 {
        self.rates.get(species).eval(progress)
    }

    pub fn coordinates(&self, species: Species, progress: f64) -> &[GridCoordinate] {
        self.molecules.coordinates_at(species, progress)
    }

    pub fn count(&self, species: Species, progress: f64) -> usize {
        self.coordinates(species, progress).len()
    }

    pub fn counts(&self, progress: f64) -> MoleculeValue<usize> {
        self.molecules.counts_at(progress)
    }

    pub fn reaction_quotient(&self, progress: f64) -> f64 {
        self.quotient.eval(progress)
    }

    /// Whether `Q` matches `K` within a relative tolerance at the current progress.
    pub fn is_at_equilibrium(&self, tolerance: f64) -> bool {
        self.is_at_equilibrium_at(self.progress, tolerance)
    }

    /// Whether `Q` matches `K` within a relative tolerance at `progress`.
    ///
    /// For `K = 0` or infinite `K` the phase counts as at equilibrium once the limiting species
    /// is used up, which is at or after the equilibrium progress.
    pub fn is_at_equilibrium_at(&self, progress: f64, tolerance: f64) -> bool {
        let constant = self.solver.constant();
        if constant.is_zero() || constant.is_infinite() {
            return self.solution.method() == SolverMethod::Limit && progress >= self.window.equilibrium();
        }
        let k = constant.value();
        (self.reaction_quotient(progress) - k).abs() <= tolerance * k
    }

    pub fn stage(&self, progress: f64) -> ReactionStage {
        if progress <= self.window.start() {
            ReactionStage::Preparation
        } else if progress >= self.window.equilibrium() {
            ReactionStage::PostEquilibrium
        } else {
            ReactionStage::PreEquilibrium
        }
    }

    /// Moves the phase's playhead. Progress before the window start is clamped to it.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = progress.max(self.window.start());
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The occupancy at `progress`, ready to seed the next phase.
    pub fn consolidate_at(&self, progress: f64) -> MoleculeValue<Vec<GridCoordinate>> {
        self.molecules.consolidate(progress)
    }

    pub fn equations(&self) -> &EquationSystem {
        self.solution.equations()
    }

    pub fn solution(&self) -> &EquilibriumSolution {
        &self.solution
    }

    pub fn molecules(&self) -> &ReactingMolecules {
        &self.molecules
    }

    pub fn extent(&self) -> f64 {
        self.solution.extent()
    }

    pub fn direction(&self) -> ReactionDirection {
        self.solution.direction()
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn window(&self) -> ProgressWindow {
        self.window
    }

    pub fn solver(&self) -> &EquilibriumSolver {
        &self.solver
    }

    pub fn coefficients(&self) -> &StoichiometricCoefficients {
        self.solver.coefficients()
    }

    pub fn constant(&self) -> EquilibriumConstant {
        self.solver.constant()
    }

    /// The snapshot this phase started from.
    pub fn initial(&self) -> &MoleculeValue<Vec<GridCoordinate>> {
        &self.initial
    }

    /// Molecules added during this phase.
    pub fn added(&self) -> &MoleculeValue<Vec<GridCoordinate>> {
        &self.added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use itertools::Itertools;

    fn components(k: f64) -> ReactionComponents {
        let solver = EquilibriumSolver::new(
            StoichiometricCoefficients::unit(),
            EquilibriumConstant::new(k).unwrap(),
        );
        ReactionComponents::new(
            GridSize::default(),
            solver,
            ProgressWindow::default(),
            MoleculeValue::default(),
            0,
        )
    }

    #[test]
    fn test_forward_reaction_to_equilibrium() {
        let mut components = components(1.0);
        assert_eq!(components.increment(Species::ReactantA, 40).applied, 40);
        assert_eq!(components.increment(Species::ReactantB, 40).applied, 40);

        assert_relative_eq!(components.extent(), 0.2, epsilon = 1e-12);
        assert_eq!(components.direction(), ReactionDirection::Forward);
        assert_relative_eq!(components.concentration(Species::ReactantA, 10.0), 0.2, epsilon = 1e-12);
        assert_eq!(components.counts(10.0), MoleculeValue::splat(20));
        assert_eq!(components.counts(0.0), MoleculeValue::new(40, 40, 0, 0));

        assert!(!components.is_at_equilibrium(1e-3));
        components.set_progress(10.0);
        assert!(components.is_at_equilibrium(1e-3));
        assert_relative_eq!(components.reaction_quotient(10.0), 1.0, max_relative = 1e-3);
    }

    #[test]
    fn test_conservation_and_uniqueness() {
        let mut components = components(3.0);
        components.increment(Species::ReactantA, 35);
        components.increment(Species::ReactantB, 25);
        components.increment(Species::ProductC, 5);

        for i in 0..=120 {
            let progress = i as f64 * 0.1;
            let occupied = components.molecules().occupied_at(progress);
            assert_eq!(occupied.len(), components.total_molecules());
            assert!(occupied.iter().all_unique());
        }
    }

    #[test]
    fn test_increment_clamps_to_capacity() {
        let grid = GridSize::default();
        let cells: Vec<_> = grid.coordinates().collect();
        let initial = MoleculeValue::new(cells[..50].to_vec(), cells[50..95].to_vec(), Vec::new(), Vec::new());
        let mut components = ReactionComponents::new(
            grid,
            EquilibriumSolver::new(StoichiometricCoefficients::unit(), EquilibriumConstant::default()),
            ProgressWindow::default(),
            initial,
            4,
        );

        let outcome = components.increment(Species::ReactantA, 10);
        assert_eq!(
            outcome,
            IncrementOutcome {
                requested: 10,
                applied: 5,
                remaining_capacity: 0
            }
        );
        assert!(outcome.was_clamped());
        assert_eq!(components.total_molecules(), 100);
        assert_eq!(components.count(Species::ReactantA, 0.0), 55);

        let again = components.increment(Species::ProductC, 3);
        assert_eq!(again.applied, 0);
        assert_eq!(components.total_molecules(), 100);
    }

    #[test]
    fn test_empty_phase_is_static() {
        let components = components(2.0);
        assert_eq!(components.extent(), 0.0);
        assert_eq!(components.direction(), ReactionDirection::Static);
        assert_eq!(components.concentration(Species::ProductD, 5.0), 0.0);
        assert_eq!(components.counts(5.0), MoleculeValue::splat(0));
    }

    #[test]
    fn test_stage_and_rate() {
        let mut components = components(1.0);
        components.increment(Species::ReactantA, 40);
        components.increment(Species::ReactantB, 40);

        assert_eq!(components.stage(0.0), ReactionStage::Preparation);
        assert_eq!(components.stage(4.0), ReactionStage::PreEquilibrium);
        assert_eq!(components.stage(10.0), ReactionStage::PostEquilibrium);

        assert_relative_eq!(components.rate(Species::ReactantA, 5.0), -0.02, epsilon = 1e-12);
        assert_relative_eq!(components.rate(Species::ProductC, 5.0), 0.02, epsilon = 1e-12);
        assert_eq!(components.rate(Species::ProductC, 12.0), 0.0);
    }

    #[test]
    fn test_progress_is_clamped_to_window_start() {
        let mut components = ReactionComponents::new(
            GridSize::default(),
            EquilibriumSolver::new(StoichiometricCoefficients::unit(), EquilibriumConstant::default()),
            ProgressWindow::new(10.0, 10.0).unwrap(),
            MoleculeValue::default(),
            7,
        );
        assert_eq!(components.progress(), 10.0);
        components.set_progress(2.0);
        assert_eq!(components.progress(), 10.0);
        components.set_progress(14.0);
        assert_eq!(components.progress(), 14.0);
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let mut components = components(0.5);
        components.increment(Species::ReactantA, 30);
        components.increment(Species::ReactantB, 20);

        let first = components.coordinates(Species::ProductC, 6.0).to_vec();
        let second = components.coordinates(Species::ProductC, 6.0).to_vec();
        assert_eq!(first, second);
        assert_eq!(
            components.concentration(Species::ReactantB, 6.0),
            components.concentration(Species::ReactantB, 6.0)
        );
    }

    #[test]
    fn test_infinite_constant_runs_to_completion() {
        let mut components = components(f64::INFINITY);
        components.increment(Species::ReactantA, 30);
        components.increment(Species::ReactantB, 10);

        assert_eq!(components.counts(10.0), MoleculeValue::new(20, 0, 10, 10));
        assert!(!components.is_at_equilibrium_at(5.0, 1e-3));
        assert!(components.is_at_equilibrium_at(10.0, 1e-3));
    }
}
