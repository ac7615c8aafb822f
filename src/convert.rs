//! Conversion module for transforming evalexpr AST nodes into progress equation trees.
//!
//! Textual equations (for example custom reveal curves in a configuration file) are parsed
//! by the evalexpr crate. This module maps the parsed operator tree onto [`Expr`], accepting
//! exactly one identifier, the progress variable.
//!
//! The main entry point is the `build_ast` function which recursively traverses the
//! evalexpr AST and builds up our expression tree.

use evalexpr::{Node, Operator};

use crate::{errors::ConvertError, expr::Expr};

/// Converts an evalexpr AST node into a progress expression.
///
/// # Arguments
/// * `node` - The evalexpr AST node to convert
/// * `variable` - Name of the identifier that stands for progress
///
/// # Returns
/// * `Result<Expr, ConvertError>` - The converted expression or an error if conversion fails
///
/// # Supported operations
/// * Basic arithmetic: +, -, *, /
/// * The progress variable and numeric constants
/// * Functions: abs, ln, log (natural), log10, sqrt, exp, round
/// * Exponentiation: x^n where n is an integer constant
///
/// Division, logarithms, square roots and negative powers are wrapped in
/// [`Expr::Fallback`] with a fallback of 0, matching the `Equation` builders.
pub fn build_ast(node: &Node, variable: &str) -> Result<Expr, ConvertError> {
    match node.operator() {
        // Addition operator - folds multiple children into a series of binary Add expressions
        Operator::Add => fold_children(node, variable, Expr::Add),
        // Multiplication operator - folds multiple children into a series of binary Mul expressions
        Operator::Mul => fold_children(node, variable, Expr::Mul),
        Operator::Div => {
            let (left, right) = binary(node, variable)?;
            Ok(guarded(Expr::Div(Box::new(left), Box::new(right))))
        }
        Operator::Sub => {
            let (left, right) = binary(node, variable)?;
            Ok(Expr::Sub(Box::new(left), Box::new(right)))
        }
        Operator::Const { value } => match value {
            evalexpr::Value::Float(f) => Ok(Expr::Const(*f)),
            evalexpr::Value::Int(i) => Ok(Expr::Const(*i as f64)),
            _ => Err(ConvertError::ConstOperator(format!("{value:?}"))),
        },
        Operator::VariableIdentifierRead { identifier } => {
            if identifier.as_str() == variable {
                Ok(Expr::Progress)
            } else {
                Err(ConvertError::VariableNotFound(identifier.to_string()))
            }
        }
        Operator::Neg => Ok(Expr::Neg(Box::new(unary(node, variable)?))),
        Operator::FunctionIdentifier { identifier } => {
            let argument = Box::new(unary(node, variable)?);
            match identifier.as_str() {
                "abs" => Ok(Expr::Abs(argument)),
                "ln" | "log" => Ok(guarded(Expr::Ln(argument))),
                "log10" => Ok(guarded(Expr::Log10(argument))),
                "sqrt" => Ok(guarded(Expr::Sqrt(argument))),
                "exp" => Ok(Expr::Exp(argument)),
                "round" => Ok(Expr::Round(argument)),
                _ => Err(ConvertError::UnsupportedFunction(identifier.to_string())),
            }
        }
        // Root node - should have exactly one child
        Operator::RootNode => {
            let children = node.children();
            if children.len() == 1 {
                build_ast(&children[0], variable)
            } else {
                Err(ConvertError::RootNode(format!("{} children", children.len())))
            }
        }
        // Exponentiation - base can be any expression but exponent must be an integer constant
        Operator::Exp => {
            let children = node.children();
            if children.len() != 2 {
                return Err(ConvertError::Arity {
                    expected: 2,
                    got: children.len(),
                });
            }
            let exp = integer_exponent(&children[1])?;
            let exp = i32::try_from(exp)
                .map_err(|_| ConvertError::ExpOperator(format!("{exp} out of range")))?;
            let power = Expr::Pow(Box::new(build_ast(&children[0], variable)?), exp);
            Ok(if exp < 0 { guarded(power) } else { power })
        }
        _ => Err(ConvertError::UnsupportedOperator(format!(
            "{:?}",
            node.operator()
        ))),
    }
}

/// Reads an integer literal exponent, allowing a leading minus and parentheses.
fn integer_exponent(node: &Node) -> Result<i64, ConvertError> {
    match (node.operator(), node.children()) {
        (Operator::Const { value: evalexpr::Value::Int(exp) }, _) => Ok(*exp),
        (Operator::Neg, [child]) => integer_exponent(child)?
            .checked_neg()
            .ok_or_else(|| ConvertError::ExpOperator("exponent out of range".to_string())),
        (Operator::RootNode, [child]) => integer_exponent(child),
        (other, _) => Err(ConvertError::ExpOperator(format!("{other:?}"))),
    }
}

fn guarded(expr: Expr) -> Expr {
    Expr::Fallback(Box::new(expr), 0.0)
}

fn fold_children(
    node: &Node,
    variable: &str,
    combine: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Result<Expr, ConvertError> {
    let children = node.children();
    let (first, rest) = children.split_first().ok_or(ConvertError::Arity {
        expected: 2,
        got: 0,
    })?;
    rest.iter()
        .try_fold(
            build_ast(first, variable)?,
            |acc, child| -> Result<Expr, ConvertError> {
                Ok(combine(Box::new(acc), Box::new(build_ast(child, variable)?)))
            },
        )
}

fn binary(node: &Node, variable: &str) -> Result<(Expr, Expr), ConvertError> {
    match node.children() {
        [left, right] => Ok((build_ast(left, variable)?, build_ast(right, variable)?)),
        children => Err(ConvertError::Arity {
            expected: 2,
            got: children.len(),
        }),
    }
}

fn unary(node: &Node, variable: &str) -> Result<Expr, ConvertError> {
    match node.children() {
        [child] => build_ast(child, variable),
        children => Err(ConvertError::Arity {
            expected: 1,
            got: children.len(),
        }),
    }
}
