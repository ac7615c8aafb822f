//! Error types for the equilibrium-grid crate.
//!
//! This module defines the failure modes that are reported to callers. The main error types are:
//!
//! - `ConvertError`: Errors during conversion from evalexpr AST to the equation tree
//! - `EquationError`: High-level errors when parsing textual equations
//! - `GridError`: Allocation requests the grid cannot satisfy
//! - `ReactionError`: Invalid reaction parameters, configuration or replay logs
//!
//! Numeric degeneracies (no valid equilibrium root, division by zero, logarithms of
//! non-positive values, increments beyond capacity) are not errors: they are recovered
//! locally and never surface here.

use evalexpr::{DefaultNumericTypes, EvalexprError};
use thiserror::Error;

use crate::species::Species;

/// Errors that can occur during conversion from evalexpr AST to our equation tree.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Error when trying to convert an exponent that is not a valid integer constant
    #[error("Could not convert exponent in Exp operator: {0}")]
    ExpOperator(String),
    /// Error when encountering an operator that is not supported by our implementation
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),
    /// Error when encountering a function that is not supported by our implementation
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),
    /// Error when the root node does not have exactly one child
    #[error("Expected single child for root node: {0}")]
    RootNode(String),
    /// Error when a constant value is not numeric
    #[error("Expected numeric constant: {0}")]
    ConstOperator(String),
    /// Error when an identifier other than the progress variable is referenced
    #[error("Variable not found: {0}")]
    VariableNotFound(String),
    /// Error when an operator node does not carry the expected number of operands
    #[error("Expected {expected} operands, got {got}")]
    Arity { expected: usize, got: usize },
}

/// High-level errors that can occur when building equations from text.
#[derive(Debug, Error)]
pub enum EquationError {
    /// Error when parsing the expression string with evalexpr
    #[error("Failed to build Evalexpr AST")]
    BuildEvalexprError(#[from] EvalexprError<DefaultNumericTypes>),
    /// Error when converting from evalexpr AST to the equation tree
    #[error("Failed to build equation tree")]
    BuildTreeError(#[from] ConvertError),
}

/// Errors raised by the grid coordinate model.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// More cells were requested than are free
    #[error("requested {requested} cells but only {available} are free")]
    CapacityExceeded { requested: usize, available: usize },
}

/// Errors raised when constructing reactions, loading configuration or replaying history.
#[derive(Debug, Error)]
pub enum ReactionError {
    /// A stoichiometric coefficient was zero or negative
    #[error("coefficient for {species} must be at least 1, got {value}")]
    InvalidCoefficient { species: Species, value: i64 },
    /// The equilibrium constant was negative or NaN
    #[error("equilibrium constant must be a non-negative number, got {0}")]
    InvalidConstant(f64),
    /// The grid has no cells
    #[error("grid must have at least one cell, got {cols}x{rows}")]
    InvalidGrid { cols: usize, rows: usize },
    /// The progress window is not finite or has negative length
    #[error("invalid progress window: start {start}, length {length}")]
    InvalidWindow { start: f64, length: f64 },
    /// The configuration could not be read or written as JSON
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A replay log is inconsistent with the history it describes
    #[error("replay failed: {0}")]
    Replay(String),
}
