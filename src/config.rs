//! Reaction configuration and replay logs.
//!
//! Both are plain serde types so they can be stored as JSON by whoever persists a session. A
//! replay log holds only the configuration, each phase's disturbance and hand-off progress, and
//! the increments requested in it; replaying them rebuilds identical coordinates because every
//! random choice is derived from the configured seed.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::chemistry::{EquilibriumConstant, ProgressWindow, StoichiometricCoefficients};
use crate::errors::ReactionError;
use crate::grid::GridSize;
use crate::history::Disturbance;
use crate::solver::EquilibriumSolver;
use crate::species::Species;

/// Options recognised by a reaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    pub grid: GridSize,
    pub equilibrium_constant: EquilibriumConstant,
    pub coefficients: StoichiometricCoefficients,
    pub start_progress: f64,
    pub window_length: f64,
    pub seed: u64,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::default(),
            equilibrium_constant: EquilibriumConstant::default(),
            coefficients: StoichiometricCoefficients::unit(),
            start_progress: 0.0,
            window_length: 10.0,
            seed: 0,
        }
    }
}

impl ReactionConfig {
    /// The first phase's progress window.
    ///
    /// # Errors
    /// Returns `ReactionError::InvalidWindow` for a non-finite start or a negative length.
    pub fn window(&self) -> Result<ProgressWindow, ReactionError> {
        ProgressWindow::new(self.start_progress, self.window_length)
    }

    pub fn solver(&self) -> EquilibriumSolver {
        EquilibriumSolver::new(self.coefficients, self.equilibrium_constant)
    }

    /// Checks the parts serde cannot.
    pub fn validate(&self) -> Result<(), ReactionError> {
        self.window().map(|_| ())
    }

    /// # Example
    /// ```
    /// # use equilibrium_grid::config::ReactionConfig;
    /// let config = ReactionConfig::from_json(r#"{ "equilibrium_constant": 4.0, "seed": 7 }"#).unwrap();
    /// assert_eq!(config.equilibrium_constant.value(), 4.0);
    /// assert_eq!(config.grid.cell_count(), 100);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ReactionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ReactionError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ReactionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// An increment as it was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementRecord {
    pub species: Species,
    pub count: usize,
}

/// One phase of a replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// `None` for the initial phase.
    pub disturbance: Option<Disturbance>,
    /// Progress at which the phase took over from its predecessor.
    pub start_progress: f64,
    pub increments: Vec<IncrementRecord>,
}

/// Everything needed to rebuild a reaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub config: ReactionConfig,
    pub phases: Vec<PhaseRecord>,
    /// Progress of the newest phase when the log was taken.
    pub progress: f64,
}

impl ReplayLog {
    pub fn from_json(json: &str) -> Result<Self, ReactionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ReactionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
