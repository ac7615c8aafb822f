//! Reaction-equilibrium engine with a discrete molecule grid.
//!
//! This crate solves how a reversible reaction `aA + bB <=> cC + dD` moves from an initial
//! state to chemical equilibrium, and projects the resulting concentration curves onto a fixed
//! grid of molecule markers that can be sampled at any progress value.
//!
//! # Features
//!
//! - Immutable, composable progress equations with symbolic derivatives, parseable from text
//!   through [evalexpr](https://github.com/ISibboI/evalexpr)
//! - Closed-form equilibrium for unit coefficients and bracketed root finding otherwise
//! - Seeded, duplicate-free coordinate allocation
//! - Phases that hand their exact molecule layout to the next phase, with back navigation and
//!   replay
//!
//! # Example
//!
//! ```rust
//! use equilibrium_grid::prelude::*;
//!
//! let mut history = ReactionHistory::new(ReactionConfig::default()).unwrap();
//! history.increment(Species::ReactantA, 40);
//! history.increment(Species::ReactantB, 40);
//!
//! let phase = history.current().components();
//! assert!((phase.concentration(Species::ProductC, 10.0) - 0.2).abs() < 1e-12);
//! assert_eq!(phase.count(Species::ProductC, 10.0), 20);
//! assert!((phase.reaction_quotient(10.0) - 1.0).abs() < 1e-3);
//! ```

pub use equation::Equation;
pub use species::{MoleculeValue, Side, Species};
pub use system::EquationSystem;

pub mod prelude {
    pub use crate::chemistry::{EquilibriumConstant, ProgressWindow, StoichiometricCoefficients};
    pub use crate::components::{IncrementOutcome, ReactionComponents, ReactionStage};
    pub use crate::config::{ReactionConfig, ReplayLog};
    pub use crate::equation::Equation;
    pub use crate::grid::{CoordinateAllocator, GridCoordinate, GridSize};
    pub use crate::history::{Disturbance, PhaseId, PhaseKind, ReactionHistory};
    pub use crate::molecules::{FractionedCoordinates, ReactingMolecules};
    pub use crate::solver::{EquilibriumSolution, EquilibriumSolver, ReactionDirection, SolverMethod};
    pub use crate::species::{MoleculeValue, Side, Species};
    pub use crate::system::EquationSystem;
}

/// Stoichiometric coefficients, the equilibrium constant and progress windows
pub mod chemistry;
/// A single reaction phase
pub mod components;
/// Serializable configuration and replay logs
pub mod config;
/// Conversion from parsed expressions to internal AST
pub mod convert;
/// High-level equation handling
pub mod equation;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation and symbolic differentiation
pub mod expr;
/// Grid coordinates and seeded allocation
pub mod grid;
/// Phase arena, back navigation and replay
pub mod history;
/// Molecule layouts and consolidation
pub mod molecules;
/// Equilibrium extent and concentration equations
pub mod solver;
/// Species roles and per-species values
pub mod species;
/// Per-species systems of equations
pub mod system;
