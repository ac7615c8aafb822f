//! The sequence of reaction phases.
//!
//! Phases live in an arena and point at their predecessor by [`PhaseId`]. Starting a phase
//! consolidates the newest one at its current progress and seeds a new [`ReactionComponents`]
//! with the snapshot; older phases are never touched again. Going back simply drops the newest
//! phase, which restores the exact earlier state.
//!
//! # Example
//!
//! ```
//! use equilibrium_grid::prelude::*;
//!
//! let mut history = ReactionHistory::new(ReactionConfig::default()).unwrap();
//! history.increment(Species::ReactantA, 40);
//! history.increment(Species::ReactantB, 40);
//! history.set_progress(10.0);
//!
//! history.start_next_phase(Disturbance::AddProducts);
//! history.increment(Species::ProductC, 10);
//!
//! let c = history.current().components().coordinates(Species::ProductC, 10.0);
//! assert_eq!(c.len(), 30);
//! assert!(history.back());
//! ```

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::chemistry::{EquilibriumConstant, ProgressWindow};
use crate::components::{IncrementOutcome, ReactionComponents};
use crate::config::{IncrementRecord, PhaseRecord, ReactionConfig, ReplayLog};
use crate::equation::Equation;
use crate::errors::ReactionError;
use crate::grid::{derive_seed, GridCoordinate};
use crate::solver::EquilibriumSolver;
use crate::species::{MoleculeValue, Side, Species};
use crate::system::{switching_system, EquationSystem};

/// Index of a phase in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhaseId(usize);

impl PhaseId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase {}", self.0)
    }
}

/// What the user changed to start a new phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disturbance {
    AddReactants,
    AddProducts,
    ChangeConstant(EquilibriumConstant),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhaseKind {
    Initial,
    Disturbed(Disturbance),
}

impl PhaseKind {
    /// Which species may be incremented in a phase of this kind.
    pub fn accepts(&self, species: Species) -> bool {
        match self {
            PhaseKind::Initial => true,
            PhaseKind::Disturbed(Disturbance::AddReactants) => species.side() == Side::Reactant,
            PhaseKind::Disturbed(Disturbance::AddProducts) => species.side() == Side::Product,
            PhaseKind::Disturbed(Disturbance::ChangeConstant(_)) => false,
        }
    }

    pub fn disturbance(&self) -> Option<Disturbance> {
        match self {
            PhaseKind::Initial => None,
            PhaseKind::Disturbed(disturbance) => Some(*disturbance),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReactionPhase {
    id: PhaseId,
    kind: PhaseKind,
    previous: Option<PhaseId>,
    components: ReactionComponents,
    increments: Vec<IncrementRecord>,
}

impl ReactionPhase {
    pub fn id(&self) -> PhaseId {
        self.id
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn previous(&self) -> Option<PhaseId> {
        self.previous
    }

    pub fn components(&self) -> &ReactionComponents {
        &self.components
    }

    /// Progress at which this phase begins.
    pub fn start_progress(&self) -> f64 {
        self.components.window().start()
    }

    /// Increments requested in this phase, accepted or not.
    pub fn increments(&self) -> &[IncrementRecord] {
        &self.increments
    }
}

/// All phases of one reaction, oldest first.
#[derive(Debug, Clone)]
pub struct ReactionHistory {
    config: ReactionConfig,
    window: ProgressWindow,
    phases: Vec<ReactionPhase>,
}

impl ReactionHistory {
    /// Starts with an empty grid in an initial phase.
    ///
    /// # Errors
    /// Returns `ReactionError` if the configuration is invalid.
    pub fn new(config: ReactionConfig) -> Result<Self, ReactionError> {
        let window = config.window()?;
        let components = ReactionComponents::new(
            config.grid,
            config.solver(),
            window,
            MoleculeValue::default(),
            derive_seed(config.seed, 0),
        );
        let initial = ReactionPhase {
            id: PhaseId(0),
            kind: PhaseKind::Initial,
            previous: None,
            components,
            increments: Vec::new(),
        };
        Ok(Self {
            config,
            window,
            phases: vec![initial],
        })
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    pub fn phases(&self) -> &[ReactionPhase] {
        &self.phases
    }

    pub fn phase(&self, id: PhaseId) -> Option<&ReactionPhase> {
        self.phases.get(id.0)
    }

    pub fn current(&self) -> &ReactionPhase {
        &self.phases[self.phases.len() - 1]
    }

    fn current_mut(&mut self) -> &mut ReactionPhase {
        let last = self.phases.len() - 1;
        &mut self.phases[last]
    }

    pub fn current_id(&self) -> PhaseId {
        self.current().id
    }

    /// Adds molecules to the newest phase if its kind accepts the species.
    ///
    /// Rejected species are a no-op reporting `applied = 0`.
    pub fn increment(&mut self, species: Species, count: usize) -> IncrementOutcome {
        let phase = self.current_mut();
        phase.increments.push(IncrementRecord { species, count });
        if !phase.kind.accepts(species) {
            debug!("{} does not accept {species}; ignoring increment", phase.id);
            return IncrementOutcome {
                requested: count,
                applied: 0,
                remaining_capacity: phase.components.remaining_capacity(),
            };
        }
        phase.components.increment(species, count)
    }

    pub fn set_progress(&mut self, progress: f64) {
        self.current_mut().components.set_progress(progress);
    }

    /// Consolidates the newest phase at its current progress and starts a new one from there.
    ///
    /// The hand-off never precedes the newest phase's own start, so earlier history is unchanged.
    pub fn start_next_phase(&mut self, disturbance: Disturbance) -> PhaseId {
        let current = self.current();
        let handoff = current.components.progress();
        let snapshot = current.components.consolidate_at(handoff);

        let solver = match disturbance {
            Disturbance::ChangeConstant(constant) => {
                EquilibriumSolver::new(*current.components.coefficients(), constant)
            }
            Disturbance::AddReactants | Disturbance::AddProducts => *current.components.solver(),
        };

        let id = PhaseId(self.phases.len());
        let previous = current.id;
        let components = ReactionComponents::new(
            self.config.grid,
            solver,
            self.window.starting_at(handoff),
            snapshot,
            derive_seed(self.config.seed, id.0 as u64),
        );
        debug!("{id} starts at progress {handoff} after {previous} with {disturbance:?}");

        self.phases.push(ReactionPhase {
            id,
            kind: PhaseKind::Disturbed(disturbance),
            previous: Some(previous),
            components,
            increments: Vec::new(),
        });
        id
    }

    /// Drops the newest phase. The initial phase is never removed.
    pub fn back(&mut self) -> bool {
        if self.phases.len() > 1 {
            if let Some(dropped) = self.phases.pop() {
                debug!("discarded {}", dropped.id);
            }
            true
        } else {
            false
        }
    }

    /// The phase in charge at `progress`: the newest one that has started by then.
    pub fn phase_at(&self, progress: f64) -> &ReactionPhase {
        self.phases
            .iter()
            .rev()
            .find(|phase| phase.start_progress() <= progress)
            .unwrap_or(&self.phases[0])
    }

    /// Every phase's equations joined at the phase boundaries.
    pub fn timeline(&self) -> EquationSystem {
        let first = self.phases[0].components.equations().clone();
        self.phases[1..].iter().fold(first, |timeline, phase| {
            switching_system(phase.start_progress(), &timeline, phase.components.equations())
        })
    }

    pub fn timeline_equation(&self, species: Species) -> Equation {
        self.timeline().get(species).clone()
    }

    pub fn concentration(&self, species: Species, progress: f64) -> f64 {
        self.phase_at(progress).components.concentration(species, progress)
    }

    pub fn coordinates(&self, species: Species, progress: f64) -> &[GridCoordinate] {
        self.phase_at(progress).components.coordinates(species, progress)
    }

    pub fn reaction_quotient(&self, progress: f64) -> f64 {
        self.phase_at(progress).components.reaction_quotient(progress)
    }

    /// Configuration plus the inputs of every phase.
    pub fn replay_log(&self) -> ReplayLog {
        ReplayLog {
            config: self.config.clone(),
            phases: self
                .phases
                .iter()
                .map(|phase| PhaseRecord {
                    disturbance: phase.kind.disturbance(),
                    start_progress: phase.start_progress(),
                    increments: phase.increments.clone(),
                })
                .collect(),
            progress: self.current().components.progress(),
        }
    }

    /// Rebuilds a history by repeating the logged inputs.
    ///
    /// # Errors
    /// Returns `ReactionError::Replay` when the first phase carries a disturbance, a later one
    /// does not, or the log is empty.
    pub fn replay(log: &ReplayLog) -> Result<Self, ReactionError> {
        let mut history = Self::new(log.config.clone())?;
        let (first, rest) = log
            .phases
            .split_first()
            .ok_or_else(|| ReactionError::Replay("log has no phases".to_string()))?;

        if first.disturbance.is_some() {
            return Err(ReactionError::Replay(
                "initial phase cannot have a disturbance".to_string(),
            ));
        }
        history.apply_increments(&first.increments);

        for (index, record) in rest.iter().enumerate() {
            let disturbance = record.disturbance.ok_or_else(|| {
                ReactionError::Replay(format!("phase {} has no disturbance", index + 1))
            })?;
            history.set_progress(record.start_progress);
            history.start_next_phase(disturbance);
            history.apply_increments(&record.increments);
        }

        history.set_progress(log.progress);
        Ok(history)
    }

    fn apply_increments(&mut self, increments: &[IncrementRecord]) {
        for record in increments {
            self.increment(record.species, record.count);
        }
    }
}
