//! Immutable, composable progress equations.
//!
//! This module provides the core `Equation` type: a pure function from a scalar progress value
//! (time, or an abstract `0..1` fraction) to a scalar output. Equations are immutable value
//! objects backed by a shared expression tree, so they can be cloned cheaply and sampled from
//! any thread while their owner builds replacements.
//!
//! # Features
//!
//! - Constants, the identity, linear interpolation and threshold switching
//! - Arithmetic composition through the standard operators
//! - Logarithms, square roots and exponentials with non-finite fallbacks
//! - Rounding, used to quantize continuous curves into discrete steps
//! - Symbolic differentiation with respect to progress
//! - Parsing from text through evalexpr
//! - Bulk sampling, sequential or parallel
//!
//! # Example
//!
//! ```
//! use equilibrium_grid::Equation;
//!
//! // 0.4 at t = 0 falling to 0.2 at t = 10, flat afterwards
//! let fall = Equation::linear(0.0, 0.4, 10.0, 0.2);
//! let concentration = Equation::switching(10.0, fall, Equation::constant(0.2));
//!
//! assert!((concentration.eval(5.0) - 0.3).abs() < 1e-12);
//! assert_eq!(concentration.eval(20.0), 0.2);
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use colored::Colorize;
use evalexpr::{build_operator_tree, Node};
use rayon::prelude::*;

use crate::convert::build_ast;
use crate::errors::EquationError;
use crate::expr::Expr;

/// A pure function of progress.
///
/// Evaluation never mutates the equation. Operations that can degenerate (division,
/// logarithms, square roots) carry a fallback that replaces non-finite results, so an
/// equation never returns NaN or infinity unless a caller builds a raw [`Expr`] that does.
#[derive(Clone, PartialEq)]
pub struct Equation {
    ast: Arc<Expr>,
    source: Option<Arc<str>>,
}

impl Equation {
    /// Wraps an expression tree, simplifying it first.
    pub fn from_expr(expr: Expr) -> Self {
        Self {
            ast: Arc::new(*expr.simplify()),
            source: None,
        }
    }

    /// Parses a textual equation in which `variable` names the progress.
    ///
    /// # Example
    /// ```
    /// # use equilibrium_grid::Equation;
    /// let eq = Equation::parse("1 - t / 10", "t").unwrap();
    /// assert_eq!(eq.eval(5.0), 0.5);
    /// ```
    ///
    /// # Errors
    /// Returns `EquationError` if the text does not parse, references any identifier other
    /// than `variable`, or uses an unsupported function.
    pub fn parse(source: &str, variable: &str) -> Result<Self, EquationError> {
        let node: Node = build_operator_tree(source)?;
        let ast = build_ast(&node, variable)?;
        Ok(Self {
            ast: Arc::new(*ast.simplify()),
            source: Some(Arc::from(source)),
        })
    }

    pub fn constant(value: f64) -> Self {
        Self::from_expr(Expr::Const(value))
    }

    /// The identity function, `f(t) = t`.
    pub fn progress() -> Self {
        Self::from_expr(Expr::Progress)
    }

    /// The straight line through `(p1, v1)` and `(p2, v2)`.
    ///
    /// Values outside `[p1, p2]` are extrapolated; callers combine with
    /// [`switching`](Self::switching) where a flat extension is wanted. When `p1 == p2` the
    /// line is undefined and the constant `v1` is returned instead.
    pub fn linear(p1: f64, v1: f64, p2: f64, v2: f64) -> Self {
        if p1 == p2 {
            return Self::constant(v1);
        }
        let slope = (v2 - v1) / (p2 - p1);
        Self::from_expr(Expr::Add(
            Box::new(Expr::Const(v1)),
            Box::new(Expr::Mul(
                Box::new(Expr::Const(slope)),
                Box::new(Expr::Sub(
                    Box::new(Expr::Progress),
                    Box::new(Expr::Const(p1)),
                )),
            )),
        ))
    }

    /// Uses `left` for `progress < threshold` and `right` otherwise.
    pub fn switching(threshold: f64, left: Equation, right: Equation) -> Self {
        Self::from_expr(Expr::Switch(
            threshold,
            left.into_boxed(),
            right.into_boxed(),
        ))
    }

    /// Fraction of the way through `[start, end]`: 0 before, 1 after, linear in between.
    pub fn window_fraction(start: f64, end: f64) -> Self {
        let inside = Self::switching(
            end,
            Self::linear(start, 0.0, end, 1.0),
            Self::constant(1.0),
        );
        Self::switching(start, Self::constant(0.0), inside)
    }

    /// Evaluates the equation at the given progress.
    pub fn eval(&self, progress: f64) -> f64 {
        self.ast.eval(progress)
    }

    /// Rate of change with respect to progress.
    pub fn derivative(&self) -> Equation {
        Self::from_expr(*self.ast.derivative())
    }

    /// `self / other`, or `fallback` where the quotient is not finite.
    pub fn divide_or(&self, other: &Equation, fallback: f64) -> Equation {
        self.with_fallback(
            Expr::Div(self.to_boxed(), other.to_boxed()),
            fallback,
        )
    }

    /// Base-10 logarithm, 0 where the argument is not positive.
    pub fn log10(&self) -> Equation {
        self.log10_or(0.0)
    }

    pub fn log10_or(&self, fallback: f64) -> Equation {
        self.with_fallback(Expr::Log10(self.to_boxed()), fallback)
    }

    /// Natural logarithm, 0 where the argument is not positive.
    pub fn ln(&self) -> Equation {
        self.ln_or(0.0)
    }

    pub fn ln_or(&self, fallback: f64) -> Equation {
        self.with_fallback(Expr::Ln(self.to_boxed()), fallback)
    }

    /// Square root, 0 where the argument is negative.
    pub fn sqrt(&self) -> Equation {
        self.with_fallback(Expr::Sqrt(self.to_boxed()), 0.0)
    }

    pub fn exp(&self) -> Equation {
        Self::from_expr(Expr::Exp(self.to_boxed()))
    }

    pub fn abs(&self) -> Equation {
        Self::from_expr(Expr::Abs(self.to_boxed()))
    }

    /// Integer power. Negative exponents of zero fall back to 0.
    pub fn powi(&self, exp: i32) -> Equation {
        if exp < 0 {
            return self.with_fallback(Expr::Pow(self.to_boxed(), exp), 0.0);
        }
        Self::from_expr(Expr::Pow(self.to_boxed(), exp))
    }

    /// Nearest integer, halfway cases away from zero.
    pub fn rounded(&self) -> Equation {
        Self::from_expr(Expr::Round(self.to_boxed()))
    }

    /// Returns the value if the equation does not depend on progress.
    pub fn as_constant(&self) -> Option<f64> {
        self.ast.try_evaluate_constant()
    }

    /// Samples `n` evenly spaced points over `[start, end]`, both ends included.
    pub fn sample(&self, start: f64, end: f64, n: usize) -> Vec<(f64, f64)> {
        match n {
            0 => Vec::new(),
            1 => vec![(start, self.eval(start))],
            _ => {
                let step = (end - start) / (n - 1) as f64;
                (0..n)
                    .map(|i| {
                        let progress = if i == n - 1 { end } else { start + step * i as f64 };
                        (progress, self.eval(progress))
                    })
                    .collect()
            }
        }
    }

    /// Evaluates the equation at every progress value, in parallel.
    ///
    /// Results are returned in input order.
    pub fn sample_parallel(&self, progress_values: &[f64]) -> Vec<f64> {
        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        let chunk_size = (progress_values.len() / (num_threads * 4)).max(1);

        progress_values
            .par_chunks(chunk_size)
            .flat_map_iter(|chunk| chunk.iter().map(|&progress| self.eval(progress)))
            .collect()
    }

    /// Returns the expression tree.
    pub fn expr(&self) -> &Expr {
        &self.ast
    }

    /// Returns the text the equation was parsed from, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn to_boxed(&self) -> Box<Expr> {
        Box::new((*self.ast).clone())
    }

    fn into_boxed(self) -> Box<Expr> {
        Box::new(Arc::unwrap_or_clone(self.ast))
    }

    fn with_fallback(&self, expr: Expr, fallback: f64) -> Equation {
        Self::from_expr(Expr::Fallback(Box::new(expr), fallback))
    }
}

impl Default for Equation {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl From<f64> for Equation {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl fmt::Debug for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(f, "    {}: {}", "Equation".cyan(), self.ast)?;
        if let Some(source) = &self.source {
            writeln!(f, "    {}: {}", "Source".cyan(), source)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

impl Neg for Equation {
    type Output = Equation;

    fn neg(self) -> Equation {
        Equation::from_expr(Expr::Neg(self.into_boxed()))
    }
}

impl Neg for &Equation {
    type Output = Equation;

    fn neg(self) -> Equation {
        Equation::from_expr(Expr::Neg(self.to_boxed()))
    }
}

// Implements an arithmetic operator for owned and borrowed equations, and for `f64` operands.
// Division goes through `divide_or` so a zero denominator yields 0 instead of NaN.
macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $build:ident) => {
        impl $trait<Equation> for Equation {
            type Output = Equation;

            fn $method(self, rhs: Equation) -> Equation {
                $build(&self, &rhs)
            }
        }

        impl $trait<&Equation> for &Equation {
            type Output = Equation;

            fn $method(self, rhs: &Equation) -> Equation {
                $build(self, rhs)
            }
        }

        impl $trait<f64> for Equation {
            type Output = Equation;

            fn $method(self, rhs: f64) -> Equation {
                $build(&self, &Equation::constant(rhs))
            }
        }

        impl $trait<f64> for &Equation {
            type Output = Equation;

            fn $method(self, rhs: f64) -> Equation {
                $build(self, &Equation::constant(rhs))
            }
        }

        impl $trait<Equation> for f64 {
            type Output = Equation;

            fn $method(self, rhs: Equation) -> Equation {
                $build(&Equation::constant(self), &rhs)
            }
        }
    };
}

fn add_equations(left: &Equation, right: &Equation) -> Equation {
    Equation::from_expr(Expr::Add(left.to_boxed(), right.to_boxed()))
}

fn sub_equations(left: &Equation, right: &Equation) -> Equation {
    Equation::from_expr(Expr::Sub(left.to_boxed(), right.to_boxed()))
}

fn mul_equations(left: &Equation, right: &Equation) -> Equation {
    Equation::from_expr(Expr::Mul(left.to_boxed(), right.to_boxed()))
}

fn div_equations(left: &Equation, right: &Equation) -> Equation {
    left.divide_or(right, 0.0)
}

impl_binary_op!(Add, add, add_equations);
impl_binary_op!(Sub, sub, sub_equations);
impl_binary_op!(Mul, mul, mul_equations);
impl_binary_op!(Div, div, div_equations);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_interpolates_and_extrapolates() {
        let line = Equation::linear(2.0, 1.0, 4.0, 5.0);
        assert_eq!(line.eval(2.0), 1.0);
        assert_eq!(line.eval(4.0), 5.0);
        assert_eq!(line.eval(3.0), 3.0);
        assert_eq!(line.eval(6.0), 9.0);
        assert_eq!(line.eval(0.0), -3.0);
    }

    #[test]
    fn test_linear_with_equal_points_is_constant() {
        let line = Equation::linear(1.0, 0.7, 1.0, 0.2);
        assert_eq!(line.as_constant(), Some(0.7));
    }

    #[test]
    fn test_switching() {
        let eq = Equation::switching(
            10.0,
            Equation::linear(0.0, 0.0, 10.0, 1.0),
            Equation::constant(1.0),
        );
        assert_eq!(eq.eval(5.0), 0.5);
        assert_eq!(eq.eval(10.0), 1.0);
        assert_eq!(eq.eval(15.0), 1.0);
        // evaluation order does not matter
        assert_eq!(eq.eval(2.0), 0.2);
    }

    #[test]
    fn test_window_fraction() {
        let fraction = Equation::window_fraction(5.0, 15.0);
        assert_eq!(fraction.eval(0.0), 0.0);
        assert_eq!(fraction.eval(5.0), 0.0);
        assert_eq!(fraction.eval(10.0), 0.5);
        assert_eq!(fraction.eval(15.0), 1.0);
        assert_eq!(fraction.eval(99.0), 1.0);

        let instant = Equation::window_fraction(5.0, 5.0);
        assert_eq!(instant.eval(4.0), 0.0);
        assert_eq!(instant.eval(5.0), 1.0);
    }

    #[test]
    fn test_operators() {
        let t = Equation::progress();
        let eq = &t * 2.0 + 1.0;
        assert_eq!(eq.eval(3.0), 7.0);

        let eq = 10.0 - t.clone();
        assert_eq!(eq.eval(4.0), 6.0);

        let eq = -(&t + &t);
        assert_eq!(eq.eval(1.5), -3.0);
    }

    #[test]
    fn test_division_fallback() {
        let t = Equation::progress();
        let eq = Equation::constant(1.0) / t.clone();
        assert_eq!(eq.eval(0.0), 0.0);
        assert_eq!(eq.eval(4.0), 0.25);

        let eq = t.divide_or(&Equation::constant(0.0), -1.0);
        assert_eq!(eq.eval(3.0), -1.0);
    }

    #[test]
    fn test_log_fallbacks() {
        let t = Equation::progress();
        assert_eq!(t.log10().eval(0.0), 0.0);
        assert_eq!(t.log10().eval(-1.0), 0.0);
        assert_relative_eq!(t.log10().eval(1000.0), 3.0, epsilon = 1e-12);
        assert_eq!(t.log10_or(-7.0).eval(0.0), -7.0);
        assert_eq!(t.ln_or(5.0).eval(-1.0), 5.0);
        assert_eq!(t.sqrt().eval(-4.0), 0.0);
        assert_eq!(t.powi(-1).eval(0.0), 0.0);
    }

    #[test]
    fn test_rounded() {
        let steps = (Equation::progress() * 2.5).rounded();
        assert_eq!(steps.eval(0.1), 0.0);
        assert_eq!(steps.eval(0.2), 1.0);
        assert_eq!(steps.eval(1.0), 3.0);
    }

    #[test]
    fn test_derivative() {
        let eq = Equation::linear(0.0, 0.4, 10.0, 0.2);
        assert_relative_eq!(eq.derivative().eval(3.0), -0.02, epsilon = 1e-12);

        let t = Equation::progress();
        let squared = t.powi(2);
        assert_eq!(squared.derivative().eval(3.0), 6.0);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let eq = (Equation::progress().powi(2) + 1.0).ln();
        let first = eq.eval(1.7);
        let second = eq.eval(1.7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse() {
        let eq = Equation::parse("2 * x + 1", "x").unwrap();
        assert_eq!(eq.eval(3.0), 7.0);
        assert_eq!(eq.source(), Some("2 * x + 1"));

        assert!(Equation::parse("2 * x + )", "x").is_err());
        assert!(matches!(
            Equation::parse("y", "x"),
            Err(EquationError::BuildTreeError(_))
        ));
    }

    #[test]
    fn test_parse_applies_fallbacks() {
        let sources = ["1 / t", "t / t", "log10(t)", "ln(t)", "sqrt(t - 1)", "(t - 1)^(-1)"];
        for source in sources {
            let eq = Equation::parse(source, "t").unwrap();
            for progress in [-1.0, 0.0, 1.0] {
                assert!(
                    eq.eval(progress).is_finite(),
                    "{source} at {progress} gave {}",
                    eq.eval(progress)
                );
            }
        }
        assert_eq!(Equation::parse("log10(t)", "t").unwrap().eval(0.0), 0.0);
        assert_eq!(Equation::parse("4 / t", "t").unwrap().eval(2.0), 2.0);
    }

    #[test]
    fn test_sample() {
        let eq = Equation::progress();
        let points = eq.sample(0.0, 1.0, 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], (0.0, 0.0));
        assert_eq!(points[4], (1.0, 1.0));
        assert_eq!(points[2].1, 0.5);
        assert!(eq.sample(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_sample_parallel_preserves_order() {
        let eq = Equation::progress() * 3.0;
        let inputs: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let outputs = eq.sample_parallel(&inputs);
        assert_eq!(outputs.len(), inputs.len());
        for (input, output) in inputs.iter().zip(outputs) {
            assert_eq!(output, input * 3.0);
        }
    }

    #[test]
    fn test_debug_and_display_formatting() {
        let eq = Equation::parse("t + 1", "t").unwrap();
        let debug_output = format!("{:?}", eq);
        assert!(debug_output.contains("Equation"));
        assert!(debug_output.contains("t + 1"));
        assert_eq!(format!("{}", eq), "(t + 1)");
    }
}
