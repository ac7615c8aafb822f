//! Discrete molecules on the grid.
//!
//! A phase's continuous extent is projected onto whole reaction *events*. One event removes
//! `coefficient` molecules from every species on the consuming side and adds `coefficient`
//! molecules to every species on the producing side. All reveal fractions are driven by one
//! shared counter `u(p) = round(U * window_fraction(p))`, so a cell vacated by a consumed
//! molecule disappears at exactly the progress where a product reusing it appears. That is what
//! keeps the grid free of duplicates at every progress value, not just at the window ends.
//!
//! Produced molecules take cells vacated by earlier or simultaneous events first, in the order
//! they were vacated, and only then draw from cells that were empty when the phase began.

use std::collections::VecDeque;

use log::{debug, warn};

use crate::chemistry::{ProgressWindow, StoichiometricCoefficients};
use crate::equation::Equation;
use crate::grid::{CoordinateAllocator, GridCoordinate};
use crate::solver::{EquilibriumSolution, ReactionDirection};
use crate::species::{MoleculeValue, Side, Species};

/// A species' cells together with the fraction of them visible at each progress.
///
/// The visible cells are always a prefix of the list.
#[derive(Debug, Clone, PartialEq)]
pub struct FractionedCoordinates {
    coordinates: Vec<GridCoordinate>,
    fraction: Equation,
}

impl FractionedCoordinates {
    pub fn new(coordinates: Vec<GridCoordinate>, fraction: Equation) -> Self {
        Self {
            coordinates,
            fraction,
        }
    }

    /// All cells visible at every progress.
    pub fn fixed(coordinates: Vec<GridCoordinate>) -> Self {
        Self::new(coordinates, Equation::constant(1.0))
    }

    /// Number of visible cells, `round(len * fraction(progress))` clamped to the list.
    pub fn count_at(&self, progress: f64) -> usize {
        let len = self.coordinates.len();
        let visible = (len as f64 * self.fraction.eval(progress)).round();
        if visible.is_nan() || visible <= 0.0 {
            0
        } else {
            (visible as usize).min(len)
        }
    }

    pub fn coordinates_at(&self, progress: f64) -> &[GridCoordinate] {
        &self.coordinates[..self.count_at(progress)]
    }

    /// Every cell this species occupies at some point of the phase.
    pub fn coordinates(&self) -> &[GridCoordinate] {
        &self.coordinates
    }

    pub fn fraction(&self) -> &Equation {
        &self.fraction
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// Freezes every species at `progress` into the initial occupancy of the next phase.
///
/// Each species keeps exactly the prefix visible at `progress`, in order.
pub fn consolidate(
    molecules: &MoleculeValue<FractionedCoordinates>,
    progress: f64,
) -> MoleculeValue<Vec<GridCoordinate>> {
    molecules.map(|_, fractioned| fractioned.coordinates_at(progress).to_vec())
}

/// Largest number of events the initial counts and the free cells allow.
///
/// No consuming species may go below zero, and when an event produces more molecules than it
/// consumes the growth must fit in `free_cells`.
pub fn max_events(
    counts: &MoleculeValue<usize>,
    coefficients: &StoichiometricCoefficients,
    consuming: Side,
    free_cells: usize,
) -> usize {
    let by_consumers = Species::on_side(consuming)
        .into_iter()
        .map(|species| counts[species] / coefficients.get(species) as usize)
        .min()
        .unwrap_or(0);

    let consumed = coefficients.side_total(consuming) as usize;
    let produced = coefficients.side_total(consuming.opposite()) as usize;
    match produced.checked_sub(consumed) {
        Some(growth) if growth > 0 => by_consumers.min(free_cells / growth),
        _ => by_consumers,
    }
}

/// Molecules of one phase, animated from the initial occupancy toward equilibrium.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactingMolecules {
    molecules: MoleculeValue<FractionedCoordinates>,
    events: usize,
    event_counter: Equation,
}

impl ReactingMolecules {
    /// Initial occupancy that never changes.
    pub fn fixed(initial: &MoleculeValue<Vec<GridCoordinate>>) -> Self {
        Self {
            molecules: initial.map(|_, coordinates| FractionedCoordinates::fixed(coordinates.clone())),
            events: 0,
            event_counter: Equation::constant(0.0),
        }
    }

    /// Projects a solved phase onto the grid.
    ///
    /// `initial` must be duplicate-free; the allocator draws only from cells outside it.
    pub fn from_solution(
        initial: &MoleculeValue<Vec<GridCoordinate>>,
        coefficients: &StoichiometricCoefficients,
        solution: &EquilibriumSolution,
        allocator: &mut CoordinateAllocator,
    ) -> Self {
        let consuming = match solution.direction() {
            ReactionDirection::Forward => Side::Reactant,
            ReactionDirection::Reverse => Side::Product,
            ReactionDirection::Static => return Self::fixed(initial),
        };

        let cells = allocator.size().cell_count();
        let target = (solution.extent().abs() * cells as f64).round() as usize;
        Self::plan(initial, coefficients, consuming, target, solution.window(), allocator)
    }

    /// Lays out up to `target` events consuming from `consuming` over `window`.
    pub fn plan(
        initial: &MoleculeValue<Vec<GridCoordinate>>,
        coefficients: &StoichiometricCoefficients,
        consuming: Side,
        target: usize,
        window: ProgressWindow,
        allocator: &mut CoordinateAllocator,
    ) -> Self {
        let occupied: Vec<GridCoordinate> = Species::ALL
            .into_iter()
            .flat_map(|species| initial[species].iter().copied())
            .collect();
        let cells = allocator.size().cell_count();
        let counts = initial.map(|_, coordinates| coordinates.len());

        let limit = max_events(
            &counts,
            coefficients,
            consuming,
            cells.saturating_sub(occupied.len()),
        );
        let mut events = target.min(limit);
        if events < target {
            debug!("clamping {target} reaction events to {limit}");
        }
        if events == 0 {
            return Self::fixed(initial);
        }

        let producing = consuming.opposite();
        let consumed_per_event = coefficients.side_total(consuming) as usize;
        let produced_per_event = coefficients.side_total(producing) as usize;
        let growth = produced_per_event.saturating_sub(consumed_per_event);

        let pool = allocator.add_random_clamped(growth * events, &occupied);
        if growth > 0 && pool.len() < growth * events {
            warn!(
                "only {} free cells for {} events; reducing to {}",
                pool.len(),
                events,
                pool.len() / growth
            );
            events = pool.len() / growth;
            if events == 0 {
                return Self::fixed(initial);
            }
        }

        let mut assigned: MoleculeValue<Vec<GridCoordinate>> = MoleculeValue::default();
        let mut vacated: VecDeque<GridCoordinate> = VecDeque::new();
        let mut pool = pool.into_iter();

        for event in 1..=events {
            for species in Species::on_side(consuming) {
                let coefficient = coefficients.get(species) as usize;
                let remaining = counts[species] - coefficient * event;
                vacated.extend(initial[species][remaining..remaining + coefficient].iter().rev());
            }
            for species in Species::on_side(producing) {
                for _ in 0..coefficients.get(species) {
                    if let Some(cell) = vacated.pop_front().or_else(|| pool.next()) {
                        assigned[species].push(cell);
                    }
                }
            }
        }

        let event_counter =
            (Equation::window_fraction(window.start(), window.equilibrium()) * events as f64).rounded();

        let molecules = MoleculeValue::from_fn(|species| {
            let count = counts[species] as f64;
            let coefficient = coefficients.as_f64(species);
            if species.side() == consuming {
                let fraction = if counts[species] == 0 {
                    Equation::constant(1.0)
                } else {
                    1.0 - &event_counter * (coefficient / count)
                };
                FractionedCoordinates::new(initial[species].clone(), fraction)
            } else {
                let mut coordinates = initial[species].clone();
                coordinates.append(&mut assigned[species]);
                let total = coordinates.len() as f64;
                let fraction = if coordinates.is_empty() {
                    Equation::constant(1.0)
                } else {
                    (&event_counter * coefficient + count) / total
                };
                FractionedCoordinates::new(coordinates, fraction)
            }
        });

        Self {
            molecules,
            events,
            event_counter,
        }
    }

    pub fn molecules(&self) -> &MoleculeValue<FractionedCoordinates> {
        &self.molecules
    }

    pub fn get(&self, species: Species) -> &FractionedCoordinates {
        &self.molecules[species]
    }

    /// Number of whole events once the phase reaches equilibrium.
    pub fn events(&self) -> usize {
        self.events
    }

    /// Events completed at each progress.
    pub fn event_counter(&self) -> &Equation {
        &self.event_counter
    }

    pub fn coordinates_at(&self, species: Species, progress: f64) -> &[GridCoordinate] {
        self.molecules[species].coordinates_at(progress)
    }

    pub fn counts_at(&self, progress: f64) -> MoleculeValue<usize> {
        self.molecules.map(|_, fractioned| fractioned.count_at(progress))
    }

    /// Every visible cell, species by species.
    pub fn occupied_at(&self, progress: f64) -> Vec<GridCoordinate> {
        Species::ALL
            .into_iter()
            .flat_map(|species| self.coordinates_at(species, progress).iter().copied())
            .collect()
    }

    pub fn consolidate(&self, progress: f64) -> MoleculeValue<Vec<GridCoordinate>> {
        consolidate(&self.molecules, progress)
    }
}
