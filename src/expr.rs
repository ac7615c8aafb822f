//! Expression module for representing progress equations.
//!
//! This module defines the expression tree behind [`Equation`](crate::equation::Equation).
//! Every expression is a function of a single scalar, the reaction *progress* (time or an
//! abstract `0..1` fraction). The tree can be:
//! - Evaluated at any progress value, in any order, without side effects
//! - Symbolically differentiated with respect to progress
//! - Simplified using algebraic rules
//!
//! Supported operations include:
//! - Basic arithmetic (+, -, *, /)
//! - The progress variable and constants
//! - Absolute value and integer exponentiation
//! - Transcendental functions (exp, ln, log10, sqrt)
//! - Rounding to the nearest integer
//! - Piecewise switching at a progress threshold
//! - Fallback values replacing non-finite results
//!
//! # Expression Tree Structure
//! The expression tree is built recursively with each node being one of:
//! - Leaf nodes: Constants and Progress
//! - Unary operations: Abs, Neg, Exp, Ln, Log10, Sqrt, Round
//! - Binary operations: Add, Sub, Mul, Div
//! - Special nodes: Pow (with integer exponent), Switch, Fallback
//!
//! # Symbolic Differentiation
//! The derivative method applies the sum, product, quotient, chain and power rules.
//! A `Switch` differentiates branch-wise at the same threshold and `Round` is treated as
//! piecewise constant.
//!
//! # Expression Simplification
//! The simplify method performs:
//! - Constant folding (e.g. 2 + 3 → 5), only where the folded value is finite
//! - Identity rules (e.g. x + 0 → x, x * 1 → x)
//! - Exponent rules (e.g. x^0 → 1, x^1 → x)
//! - Collapsing switches whose branches are the same constant

use std::f64::consts::LN_10;

/// An expression tree node over the progress variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// The progress variable
    Progress,
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Negation of an expression
    Neg(Box<Expr>),
    /// Absolute value of an expression
    Abs(Box<Expr>),
    /// Exponentiation of an expression by an integer constant
    Pow(Box<Expr>, i32),
    /// Exponential function of an expression
    Exp(Box<Expr>),
    /// Natural logarithm of an expression
    Ln(Box<Expr>),
    /// Base-10 logarithm of an expression
    Log10(Box<Expr>),
    /// Square root of an expression
    Sqrt(Box<Expr>),
    /// Nearest integer, halfway cases away from zero
    Round(Box<Expr>),
    /// `left` below the threshold, `right` at or above it
    Switch(f64, Box<Expr>, Box<Expr>),
    /// The inner expression, or the fallback when the inner value is not finite
    Fallback(Box<Expr>, f64),
}

impl Expr {
    /// Evaluates the expression at the given progress.
    pub fn eval(&self, progress: f64) -> f64 {
        match self {
            Expr::Const(value) => *value,
            Expr::Progress => progress,
            Expr::Add(left, right) => left.eval(progress) + right.eval(progress),
            Expr::Sub(left, right) => left.eval(progress) - right.eval(progress),
            Expr::Mul(left, right) => left.eval(progress) * right.eval(progress),
            Expr::Div(left, right) => left.eval(progress) / right.eval(progress),
            Expr::Neg(expr) => -expr.eval(progress),
            Expr::Abs(expr) => expr.eval(progress).abs(),
            Expr::Pow(base, exp) => base.eval(progress).powi(*exp),
            Expr::Exp(expr) => expr.eval(progress).exp(),
            Expr::Ln(expr) => expr.eval(progress).ln(),
            Expr::Log10(expr) => expr.eval(progress).log10(),
            Expr::Sqrt(expr) => expr.eval(progress).sqrt(),
            Expr::Round(expr) => expr.eval(progress).round(),
            Expr::Switch(threshold, left, right) => {
                if progress < *threshold {
                    left.eval(progress)
                } else {
                    right.eval(progress)
                }
            }
            Expr::Fallback(expr, fallback) => {
                let value = expr.eval(progress);
                if value.is_finite() {
                    value
                } else {
                    *fallback
                }
            }
        }
    }

    /// Returns the value of the expression if it does not depend on progress.
    pub fn try_evaluate_constant(&self) -> Option<f64> {
        match self {
            Expr::Const(value) => Some(*value),
            Expr::Progress => None,
            Expr::Add(left, right) => {
                Some(left.try_evaluate_constant()? + right.try_evaluate_constant()?)
            }
            Expr::Sub(left, right) => {
                Some(left.try_evaluate_constant()? - right.try_evaluate_constant()?)
            }
            Expr::Mul(left, right) => {
                Some(left.try_evaluate_constant()? * right.try_evaluate_constant()?)
            }
            Expr::Div(left, right) => {
                Some(left.try_evaluate_constant()? / right.try_evaluate_constant()?)
            }
            Expr::Neg(expr) => Some(-expr.try_evaluate_constant()?),
            Expr::Abs(expr) => Some(expr.try_evaluate_constant()?.abs()),
            Expr::Pow(base, exp) => Some(base.try_evaluate_constant()?.powi(*exp)),
            Expr::Exp(expr) => Some(expr.try_evaluate_constant()?.exp()),
            Expr::Ln(expr) => Some(expr.try_evaluate_constant()?.ln()),
            Expr::Log10(expr) => Some(expr.try_evaluate_constant()?.log10()),
            Expr::Sqrt(expr) => Some(expr.try_evaluate_constant()?.sqrt()),
            Expr::Round(expr) => Some(expr.try_evaluate_constant()?.round()),
            Expr::Switch(_, left, right) => {
                let left = left.try_evaluate_constant()?;
                let right = right.try_evaluate_constant()?;
                (left == right).then_some(left)
            }
            Expr::Fallback(expr, fallback) => {
                let value = expr.try_evaluate_constant()?;
                Some(if value.is_finite() { value } else { *fallback })
            }
        }
    }

    /// Computes the symbolic derivative of this expression with respect to progress.
    ///
    /// The rules implemented are:
    /// - d/dt(c) = 0 for constants
    /// - d/dt(t) = 1
    /// - Sum rule: d/dt(f + g) = df/dt + dg/dt
    /// - Product rule: d/dt(f * g) = f * dg/dt + g * df/dt
    /// - Quotient rule: d/dt(f/g) = (g * df/dt - f * dg/dt) / g^2
    /// - Chain rule for abs: d/dt|f| = f/|f| * df/dt
    /// - Power rule: d/dt(f^n) = n * f^(n-1) * df/dt
    /// - Chain rule for exp, ln, log10 and sqrt
    /// - Switch: derivative of each branch at the same threshold
    /// - Round: 0 almost everywhere
    /// - Fallback: derivative of the inner expression, falling back to 0
    ///
    /// # Returns
    /// A new expression tree representing the derivative
    pub fn derivative(&self) -> Box<Expr> {
        match self {
            Expr::Const(_) | Expr::Round(_) => Box::new(Expr::Const(0.0)),

            Expr::Progress => Box::new(Expr::Const(1.0)),

            Expr::Add(left, right) => Box::new(Expr::Add(left.derivative(), right.derivative())),

            Expr::Sub(left, right) => Box::new(Expr::Sub(left.derivative(), right.derivative())),

            Expr::Mul(left, right) => {
                // d/dt(f * g) = f * dg/dt + g * df/dt
                Box::new(Expr::Add(
                    Box::new(Expr::Mul(left.clone(), right.derivative())),
                    Box::new(Expr::Mul(right.clone(), left.derivative())),
                ))
            }

            Expr::Div(left, right) => {
                // d/dt(f/g) = (g * df/dt - f * dg/dt) / g^2
                Box::new(Expr::Div(
                    Box::new(Expr::Sub(
                        Box::new(Expr::Mul(right.clone(), left.derivative())),
                        Box::new(Expr::Mul(left.clone(), right.derivative())),
                    )),
                    Box::new(Expr::Pow(right.clone(), 2)),
                ))
            }

            Expr::Neg(expr) => Box::new(Expr::Neg(expr.derivative())),

            Expr::Abs(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(expr.clone(), Box::new(Expr::Abs(expr.clone())))),
                expr.derivative(),
            )),

            Expr::Pow(base, exp) => Box::new(Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(f64::from(*exp))),
                    Box::new(Expr::Pow(base.clone(), exp - 1)),
                )),
                base.derivative(),
            )),

            Expr::Exp(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Exp(expr.clone())),
                expr.derivative(),
            )),

            Expr::Ln(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(Box::new(Expr::Const(1.0)), expr.clone())),
                expr.derivative(),
            )),

            Expr::Log10(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Mul(expr.clone(), Box::new(Expr::Const(LN_10)))),
                )),
                expr.derivative(),
            )),

            Expr::Sqrt(expr) => Box::new(Expr::Mul(
                Box::new(Expr::Div(
                    Box::new(Expr::Const(1.0)),
                    Box::new(Expr::Mul(
                        Box::new(Expr::Const(2.0)),
                        Box::new(Expr::Sqrt(expr.clone())),
                    )),
                )),
                expr.derivative(),
            )),

            Expr::Switch(threshold, left, right) => Box::new(Expr::Switch(
                *threshold,
                left.derivative(),
                right.derivative(),
            )),

            Expr::Fallback(expr, _) => Box::new(Expr::Fallback(expr.derivative(), 0.0)),
        }
    }

    /// Simplifies the expression by folding constants and applying basic algebraic rules.
    ///
    /// Folding never produces a non-finite constant: `ln(0)` stays `ln(0)` so that an
    /// enclosing `Fallback` still sees the degenerate value at evaluation time.
    ///
    /// # Returns
    /// A new simplified expression tree
    pub fn simplify(&self) -> Box<Expr> {
        match self {
            Expr::Const(_) | Expr::Progress => Box::new(self.clone()),

            Expr::Add(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a + b)),
                    (expr, Expr::Const(c)) | (Expr::Const(c), expr) if *c == 0.0 => {
                        Box::new(expr.clone())
                    }
                    _ => Box::new(Expr::Add(l, r)),
                }
            }

            Expr::Sub(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a - b)),
                    (expr, Expr::Const(c)) if *c == 0.0 => Box::new(expr.clone()),
                    (Expr::Const(c), expr) if *c == 0.0 => {
                        Box::new(Expr::Neg(Box::new(expr.clone())))
                    }
                    _ => Box::new(Expr::Sub(l, r)),
                }
            }

            Expr::Mul(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) => Box::new(Expr::Const(a * b)),
                    (Expr::Const(c), _) | (_, Expr::Const(c)) if *c == 0.0 => {
                        Box::new(Expr::Const(0.0))
                    }
                    (expr, Expr::Const(c)) | (Expr::Const(c), expr) if *c == 1.0 => {
                        Box::new(expr.clone())
                    }
                    (expr, Expr::Const(c)) | (Expr::Const(c), expr) if *c == -1.0 => {
                        Box::new(Expr::Neg(Box::new(expr.clone())))
                    }
                    _ => Box::new(Expr::Mul(l, r)),
                }
            }

            Expr::Div(left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) if *b != 0.0 => Box::new(Expr::Const(a / b)),
                    (expr, Expr::Const(c)) if *c == 1.0 => Box::new(expr.clone()),
                    _ => Box::new(Expr::Div(l, r)),
                }
            }

            Expr::Neg(expr) => {
                let e = expr.simplify();
                match *e {
                    Expr::Const(a) => Box::new(Expr::Const(-a)),
                    Expr::Neg(inner) => inner,
                    other => Box::new(Expr::Neg(Box::new(other))),
                }
            }

            Expr::Abs(expr) => {
                let e = expr.simplify();
                match &*e {
                    Expr::Const(a) => Box::new(Expr::Const(a.abs())),
                    Expr::Abs(_) => e,
                    Expr::Neg(inner) => Box::new(Expr::Abs(inner.clone())),
                    _ => Box::new(Expr::Abs(e)),
                }
            }

            Expr::Pow(base, exp) => {
                let b = base.simplify();
                match (&*b, *exp) {
                    (_, 0) => Box::new(Expr::Const(1.0)),
                    (expr, 1) => Box::new(expr.clone()),
                    (Expr::Const(a), exp) if a.powi(exp).is_finite() => {
                        Box::new(Expr::Const(a.powi(exp)))
                    }
                    _ => Box::new(Expr::Pow(b, *exp)),
                }
            }

            Expr::Exp(expr) => fold_unary(expr, f64::exp, Expr::Exp),
            Expr::Ln(expr) => fold_unary(expr, f64::ln, Expr::Ln),
            Expr::Log10(expr) => fold_unary(expr, f64::log10, Expr::Log10),
            Expr::Sqrt(expr) => fold_unary(expr, f64::sqrt, Expr::Sqrt),
            Expr::Round(expr) => fold_unary(expr, f64::round, Expr::Round),

            Expr::Switch(threshold, left, right) => {
                let l = left.simplify();
                let r = right.simplify();
                match (&*l, &*r) {
                    (Expr::Const(a), Expr::Const(b)) if a == b => Box::new(Expr::Const(*a)),
                    _ => Box::new(Expr::Switch(*threshold, l, r)),
                }
            }

            Expr::Fallback(expr, fallback) => {
                let e = expr.simplify();
                match e.try_evaluate_constant() {
                    Some(value) if value.is_finite() => Box::new(Expr::Const(value)),
                    Some(_) => Box::new(Expr::Const(*fallback)),
                    None => Box::new(Expr::Fallback(e, *fallback)),
                }
            }
        }
    }
}

/// Simplifies the operand and folds the function when the result is finite.
fn fold_unary(expr: &Expr, fun: fn(f64) -> f64, wrap: fn(Box<Expr>) -> Expr) -> Box<Expr> {
    let e = expr.simplify();
    match &*e {
        Expr::Const(a) if fun(*a).is_finite() => Box::new(Expr::Const(fun(*a))),
        _ => Box::new(wrap(e)),
    }
}

/// Implements string formatting for expressions.
///
/// Binary operations are wrapped in parentheses, functions use call notation and the
/// progress variable is written `t`. Switches print as `(t < threshold ? left : right)`.
impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Progress => write!(f, "t"),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Neg(expr) => write!(f, "-({expr})"),
            Expr::Abs(expr) => write!(f, "|{expr}|"),
            Expr::Pow(base, exp) => write!(f, "({base}^{exp})"),
            Expr::Exp(expr) => write!(f, "exp({expr})"),
            Expr::Ln(expr) => write!(f, "ln({expr})"),
            Expr::Log10(expr) => write!(f, "log10({expr})"),
            Expr::Sqrt(expr) => write!(f, "sqrt({expr})"),
            Expr::Round(expr) => write!(f, "round({expr})"),
            Expr::Switch(threshold, left, right) => {
                write!(f, "(t < {threshold} ? {left} : {right})")
            }
            Expr::Fallback(expr, fallback) => write!(f, "or({expr}, {fallback})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Box<Expr> {
        Box::new(Expr::Progress)
    }

    fn c(value: f64) -> Box<Expr> {
        Box::new(Expr::Const(value))
    }

    #[test]
    fn test_eval() {
        // 2t + 1 at t = 3
        let expr = Expr::Add(Box::new(Expr::Mul(c(2.0), t())), c(1.0));
        assert_eq!(expr.eval(3.0), 7.0);

        // t^3 at t = 2
        assert_eq!(Expr::Pow(t(), 3).eval(2.0), 8.0);

        assert_eq!(Expr::Log10(c(1000.0)).eval(0.0), 3.0);
        assert_eq!(Expr::Round(c(2.5)).eval(0.0), 3.0);
        assert_eq!(Expr::Round(c(-2.5)).eval(0.0), -3.0);
    }

    #[test]
    fn test_switch_threshold_is_inclusive_on_the_right() {
        let expr = Expr::Switch(5.0, c(1.0), c(2.0));
        assert_eq!(expr.eval(4.999), 1.0);
        assert_eq!(expr.eval(5.0), 2.0);
        assert_eq!(expr.eval(100.0), 2.0);
    }

    #[test]
    fn test_fallback_replaces_non_finite_values() {
        let zero_over_zero = Expr::Fallback(Box::new(Expr::Div(c(0.0), t())), -1.0);
        assert_eq!(zero_over_zero.eval(0.0), -1.0);
        assert_eq!(zero_over_zero.eval(2.0), 0.0);

        let log_of_zero = Expr::Fallback(Box::new(Expr::Log10(t())), 0.0);
        assert_eq!(log_of_zero.eval(0.0), 0.0);
        assert_eq!(log_of_zero.eval(-3.0), 0.0);
        assert_eq!(log_of_zero.eval(100.0), 2.0);
    }

    #[test]
    fn test_simplify() {
        // 2 + 3 → 5
        assert_eq!(*Expr::Add(c(2.0), c(3.0)).simplify(), Expr::Const(5.0));
        // t + 0 → t
        assert_eq!(*Expr::Add(t(), c(0.0)).simplify(), Expr::Progress);
        // t * 1 → t
        assert_eq!(*Expr::Mul(t(), c(1.0)).simplify(), Expr::Progress);
        // t * 0 → 0
        assert_eq!(*Expr::Mul(t(), c(0.0)).simplify(), Expr::Const(0.0));
        // t / 1 → t
        assert_eq!(*Expr::Div(t(), c(1.0)).simplify(), Expr::Progress);
        // t^0 → 1, t^1 → t
        assert_eq!(*Expr::Pow(t(), 0).simplify(), Expr::Const(1.0));
        assert_eq!(*Expr::Pow(t(), 1).simplify(), Expr::Progress);
        // -(-t) → t
        assert_eq!(*Expr::Neg(Box::new(Expr::Neg(t()))).simplify(), Expr::Progress);
        // ||t|| → |t|
        assert_eq!(
            *Expr::Abs(Box::new(Expr::Abs(t()))).simplify(),
            Expr::Abs(t())
        );
    }

    #[test]
    fn test_simplify_keeps_degenerate_values_for_fallback() {
        // ln(0) must not fold into -inf
        assert_eq!(*Expr::Ln(c(0.0)).simplify(), Expr::Ln(c(0.0)));
        // but a constant fallback folds to its fallback value
        assert_eq!(
            *Expr::Fallback(Box::new(Expr::Ln(c(0.0))), 0.5).simplify(),
            Expr::Const(0.5)
        );
        // 1 / 0 stays unevaluated
        assert_eq!(*Expr::Div(c(1.0), c(0.0)).simplify(), Expr::Div(c(1.0), c(0.0)));
    }

    #[test]
    fn test_simplify_switch() {
        let same = Expr::Switch(1.0, Box::new(Expr::Add(c(1.0), c(1.0))), c(2.0));
        assert_eq!(*same.simplify(), Expr::Const(2.0));

        let different = Expr::Switch(1.0, c(1.0), t());
        assert_eq!(*different.simplify(), different);
    }

    #[test]
    fn test_derivative() {
        assert_eq!(*Expr::Const(5.0).derivative(), Expr::Const(0.0));
        assert_eq!(*Expr::Progress.derivative(), Expr::Const(1.0));

        // (t^3)' = 3 t^2
        let power = Expr::Pow(t(), 3);
        assert_eq!(power.derivative().simplify().eval(2.0), 12.0);

        // (t * t)' = 2t
        let product = Expr::Mul(t(), t());
        assert_eq!(product.derivative().eval(3.0), 6.0);

        // (1 / t)' = -1 / t^2
        let quotient = Expr::Div(c(1.0), t());
        assert_eq!(quotient.derivative().eval(2.0), -0.25);

        // log10(t)' = 1 / (t ln 10)
        let log = Expr::Log10(t());
        let expected = 1.0 / (4.0 * LN_10);
        assert!((log.derivative().eval(4.0) - expected).abs() < 1e-12);

        // sqrt(t)' = 1 / (2 sqrt t)
        assert_eq!(Expr::Sqrt(t()).derivative().eval(4.0), 0.25);
    }

    #[test]
    fn test_derivative_of_switch_and_round() {
        // slope 2 before t = 1, slope -1 after
        let piecewise = Expr::Switch(
            1.0,
            Box::new(Expr::Mul(c(2.0), t())),
            Box::new(Expr::Sub(c(3.0), t())),
        );
        let slope = piecewise.derivative();
        assert_eq!(slope.eval(0.5), 2.0);
        assert_eq!(slope.eval(1.5), -1.0);

        assert_eq!(*Expr::Round(t()).derivative(), Expr::Const(0.0));
    }

    #[test]
    fn test_try_evaluate_constant() {
        assert_eq!(Expr::Add(c(1.0), c(2.0)).try_evaluate_constant(), Some(3.0));
        assert_eq!(Expr::Add(c(1.0), t()).try_evaluate_constant(), None);
        assert_eq!(
            Expr::Switch(0.0, c(1.0), c(2.0)).try_evaluate_constant(),
            None
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Expr::Const(5.0)), "5");
        assert_eq!(format!("{}", Expr::Progress), "t");
        assert_eq!(format!("{}", Expr::Add(t(), c(1.0))), "(t + 1)");
        assert_eq!(format!("{}", Expr::Log10(t())), "log10(t)");
        assert_eq!(
            format!("{}", Expr::Switch(2.0, c(0.0), t())),
            "(t < 2 ? 0 : t)"
        );
        assert_eq!(
            format!("{}", Expr::Fallback(Box::new(Expr::Div(c(1.0), t())), 0.0)),
            "or((1 / t), 0)"
        );
    }
}
